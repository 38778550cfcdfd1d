use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use shared::auth::{require_internal_secret, Identity, InternalSecret};
use shared::dates::StayRange;
use shared::db::DbPool;
use shared::error::{ServiceError, ServiceResult};
use shared::pagination::{PageParams, PagedResponse};
use uuid::Uuid;

use crate::cache::{self, DetailKey, QueryCache};
use crate::catalog::{self, HotelRef, HotelView, RoomView};
use crate::inventory::{self, CapacitySnapshot};
use crate::ratings::RatingSource;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub cache: Arc<QueryCache>,
    pub ratings: Arc<dyn RatingSource>,
    pub secret: InternalSecret,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub location: String,
    pub guest_count: i32,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RoomsQuery {
    pub guest_count: Option<i32>,
    pub check_in: Option<NaiveDate>,
    pub check_out: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guest_count: i32,
}

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityChange {
    pub date: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub available: bool,
}

pub fn create_router(state: AppState) -> Router {
    let internal = Router::new()
        .route(
            "/rooms/:room_id/availability/decrement",
            post(decrement_availability),
        )
        .route(
            "/rooms/:room_id/availability/restore",
            post(restore_availability),
        )
        .route("/hotels", get(list_hotel_refs))
        .route("/hotels/:hotel_id/capacity", get(hotel_capacity))
        .route("/cache/evict_all", post(evict_all))
        .route("/cache/evict/:hotel_id", post(evict_hotel))
        .route_layer(middleware::from_fn_with_state(
            state.secret.clone(),
            require_internal_secret,
        ));

    Router::new()
        .route("/api/v1/hotels", get(list_hotels))
        .route("/api/v1/hotels/search", get(search_hotels))
        .route("/api/v1/hotels/:hotel_id", get(hotel_detail))
        .route("/api/v1/hotels/:hotel_id/rooms", get(hotel_rooms))
        .route(
            "/api/v1/hotels/:hotel_id/rooms/:room_id/availability",
            get(check_availability),
        )
        .nest("/internal", internal)
        .route("/health", get(health_check))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

pub async fn list_hotels(
    State(state): State<AppState>,
    identity: Option<Identity>,
    Query(page): Query<PageParams>,
) -> ServiceResult<Json<PagedResponse<HotelView>>> {
    let discounted = identity.is_some();
    let page = page.normalized();
    let signature = cache::listing_signature(page, discounted);

    if let Some(cached) = state.cache.listing(&signature).await {
        return Ok(Json(cached.as_ref().clone()));
    }

    let mut conn = state.pool.get().await?;
    let (hotels, total) = catalog::hotel_page(&mut conn, page).await?;
    drop(conn);

    let content = catalog::hotel_views(&hotels, state.ratings.as_ref(), discounted).await;
    let response = Arc::new(PagedResponse::new(content, page, total));
    state.cache.store_listing(signature, response.clone()).await;

    Ok(Json(response.as_ref().clone()))
}

pub async fn search_hotels(
    State(state): State<AppState>,
    identity: Option<Identity>,
    Query(query): Query<SearchQuery>,
) -> ServiceResult<Json<PagedResponse<HotelView>>> {
    if query.guest_count < 1 {
        return Err(ServiceError::validation("guest count must be at least 1"));
    }
    let range = StayRange::new(query.check_in, query.check_out)?;
    let discounted = identity.is_some();
    let page = page_params(query.page, query.per_page);
    let signature =
        cache::search_signature(&query.location, query.guest_count, &range, page, discounted);

    if let Some(cached) = state.cache.listing(&signature).await {
        return Ok(Json(cached.as_ref().clone()));
    }

    let mut conn = state.pool.get().await?;
    let candidates = catalog::hotels_by_location(&mut conn, &query.location).await?;
    let mut matching = Vec::new();
    for hotel in candidates {
        if catalog::hotel_has_room_for(&mut conn, hotel.id, query.guest_count, &range).await? {
            matching.push(hotel);
        }
    }
    drop(conn);

    let views = catalog::hotel_views(&matching, state.ratings.as_ref(), discounted).await;
    let response = Arc::new(PagedResponse::slice(views, page));
    if cache::search_is_cacheable(&response) {
        state.cache.store_listing(signature, response.clone()).await;
    }

    Ok(Json(response.as_ref().clone()))
}

pub async fn hotel_detail(
    State(state): State<AppState>,
    identity: Option<Identity>,
    Path(hotel_id): Path<i64>,
) -> ServiceResult<Json<HotelView>> {
    let discounted = identity.is_some();
    let key = DetailKey {
        hotel_id,
        discounted,
    };

    if let Some(cached) = state.cache.detail(&key).await {
        return Ok(Json(cached.as_ref().clone()));
    }

    let mut conn = state.pool.get().await?;
    let hotel = catalog::hotel_by_id(&mut conn, hotel_id)
        .await?
        .ok_or(ServiceError::NotFound { resource: "hotel" })?;
    drop(conn);

    let view = Arc::new(catalog::hotel_view(&hotel, state.ratings.as_ref(), discounted).await);
    state.cache.store_detail(key, view.clone()).await;

    Ok(Json(view.as_ref().clone()))
}

/// Room listing is never cached: its availability numbers are exactly
/// what reservation decisions are made from.
pub async fn hotel_rooms(
    State(state): State<AppState>,
    Path(hotel_id): Path<i64>,
    Query(query): Query<RoomsQuery>,
) -> ServiceResult<Json<Vec<RoomView>>> {
    let guest_count = query.guest_count.unwrap_or(1);
    let range = match (query.check_in, query.check_out) {
        (Some(check_in), Some(check_out)) => Some(StayRange::new(check_in, check_out)?),
        (None, None) => None,
        _ => {
            return Err(ServiceError::validation(
                "check_in and check_out must be provided together",
            ))
        }
    };

    let mut conn = state.pool.get().await?;
    if catalog::hotel_by_id(&mut conn, hotel_id).await?.is_none() {
        return Err(ServiceError::NotFound { resource: "hotel" });
    }
    let views = catalog::room_views(&mut conn, hotel_id, range.as_ref(), guest_count).await?;

    Ok(Json(views))
}

pub async fn check_availability(
    State(state): State<AppState>,
    Path((hotel_id, room_id)): Path<(i64, Uuid)>,
    Query(query): Query<AvailabilityQuery>,
) -> ServiceResult<Json<AvailabilityResponse>> {
    if query.guest_count < 1 {
        return Err(ServiceError::validation("guest count must be at least 1"));
    }
    let range = StayRange::new(query.check_in, query.check_out)?;

    let mut conn = state.pool.get().await?;
    if catalog::hotel_by_id(&mut conn, hotel_id).await?.is_none() {
        return Err(ServiceError::NotFound { resource: "hotel" });
    }
    let room = catalog::room_by_id(&mut conn, room_id)
        .await?
        .ok_or(ServiceError::NotFound { resource: "room" })?;
    if room.hotel_id != hotel_id {
        // A room filed under another hotel is not found here, never a
        // silent false.
        return Err(ServiceError::NotFound { resource: "room" });
    }

    let available = inventory::is_room_available(&mut conn, &room, &range, query.guest_count).await?;
    Ok(Json(AvailabilityResponse { available }))
}

pub async fn decrement_availability(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Json(change): Json<AvailabilityChange>,
) -> ServiceResult<StatusCode> {
    let mut conn = state.pool.get().await?;
    let room = catalog::room_by_id(&mut conn, room_id).await?;
    let Some(room) = room else {
        return Err(ServiceError::conflict("no availability for that room"));
    };

    let applied = inventory::decrement(&mut conn, room_id, change.date).await?;
    drop(conn);
    if !applied {
        return Err(ServiceError::conflict(format!(
            "no remaining availability on {}",
            change.date
        )));
    }

    state.cache.invalidate_hotel(room.hotel_id).await;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn restore_availability(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Json(change): Json<AvailabilityChange>,
) -> ServiceResult<StatusCode> {
    let mut conn = state.pool.get().await?;
    let room = catalog::room_by_id(&mut conn, room_id)
        .await?
        .ok_or(ServiceError::NotFound { resource: "room" })?;

    let applied = inventory::restore(&mut conn, room_id, change.date).await?;
    drop(conn);
    if !applied {
        return Err(ServiceError::NotFound {
            resource: "availability",
        });
    }

    state.cache.invalidate_hotel(room.hotel_id).await;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_hotel_refs(
    State(state): State<AppState>,
) -> ServiceResult<Json<Vec<HotelRef>>> {
    let mut conn = state.pool.get().await?;
    let refs = catalog::hotel_refs(&mut conn).await?;
    Ok(Json(refs))
}

pub async fn hotel_capacity(
    State(state): State<AppState>,
    Path(hotel_id): Path<i64>,
    Query(query): Query<DateQuery>,
) -> ServiceResult<Json<CapacitySnapshot>> {
    let mut conn = state.pool.get().await?;
    let hotel = catalog::hotel_by_id(&mut conn, hotel_id)
        .await?
        .ok_or(ServiceError::NotFound { resource: "hotel" })?;
    let snapshot = inventory::capacity_for_date(&mut conn, &hotel, query.date).await?;
    Ok(Json(snapshot))
}

pub async fn evict_all(State(state): State<AppState>) -> StatusCode {
    state.cache.invalidate_all();
    tracing::info!("evicted every cached hotel query");
    StatusCode::NO_CONTENT
}

pub async fn evict_hotel(
    State(state): State<AppState>,
    Path(hotel_id): Path<i64>,
) -> StatusCode {
    state.cache.invalidate_hotel(hotel_id).await;
    tracing::info!(hotel_id, "evicted cached queries for hotel");
    StatusCode::NO_CONTENT
}

pub async fn health_check() -> &'static str {
    "OK"
}

fn page_params(page: Option<i64>, per_page: Option<i64>) -> PageParams {
    let defaults = PageParams::default();
    PageParams {
        page: page.unwrap_or(defaults.page),
        per_page: per_page.unwrap_or(defaults.per_page),
    }
    .normalized()
}

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use shared::auth::Identity;
use shared::dates::StayRange;
use shared::pagination::{PageParams, PagedResponse};
use shared::{ServiceError, ServiceResult};
use uuid::Uuid;

use crate::hotel_client::HotelApi;
use crate::ledger;
use crate::models::Booking;
use crate::saga::{ReservationOutcome, ReservationRequest, ReservationSaga};
use shared::db::DbPool;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub saga: Arc<ReservationSaga>,
    pub hotel: Arc<dyn HotelApi>,
}

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub hotel_id: i64,
    pub room_id: Uuid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guest_count: i32,
}

#[derive(Debug, Serialize)]
pub struct BookingView {
    pub id: i64,
    pub hotel_id: i64,
    pub hotel_name: String,
    pub room_id: Uuid,
    pub user_id: i64,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guest_count: i32,
    pub status: String,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/bookings", post(create_booking))
        .route("/api/v1/bookings/my", get(my_bookings))
        .route("/api/v1/bookings/:booking_id", get(show_booking))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

pub async fn create_booking(
    State(state): State<AppState>,
    identity: Identity,
    Json(request): Json<CreateBookingRequest>,
) -> ServiceResult<(StatusCode, Json<BookingView>)> {
    let range = StayRange::new(request.check_in, request.check_out)?;
    let reservation = ReservationRequest {
        hotel_id: request.hotel_id,
        room_id: request.room_id,
        user_id: identity.user_id,
        range,
        guest_count: request.guest_count,
    };

    // Once inventory work begins the saga must run to completion even if
    // the client disconnects, so it runs detached from this request.
    let saga = state.saga.clone();
    let outcome = tokio::spawn(async move { saga.reserve(reservation).await })
        .await
        .map_err(ServiceError::internal)??;

    match outcome {
        ReservationOutcome::Confirmed(booking) => Ok((
            StatusCode::CREATED,
            Json(booking_view(booking, state.hotel.as_ref()).await),
        )),
        ReservationOutcome::AlreadyRequested(booking) => Ok((
            StatusCode::OK,
            Json(booking_view(booking, state.hotel.as_ref()).await),
        )),
    }
}

pub async fn my_bookings(
    State(state): State<AppState>,
    identity: Identity,
    Query(page): Query<PageParams>,
) -> ServiceResult<Json<PagedResponse<BookingView>>> {
    let page = page.normalized();
    let (bookings, total) = ledger::bookings_for_user(&state.pool, identity.user_id, page).await?;

    let mut content = Vec::with_capacity(bookings.len());
    for booking in bookings {
        content.push(booking_view(booking, state.hotel.as_ref()).await);
    }
    Ok(Json(PagedResponse::new(content, page, total)))
}

pub async fn show_booking(
    State(state): State<AppState>,
    identity: Identity,
    Path(booking_id): Path<i64>,
) -> ServiceResult<Json<BookingView>> {
    let booking = ledger::booking_by_id(&state.pool, booking_id)
        .await?
        .ok_or(ServiceError::NotFound {
            resource: "booking",
        })?;
    // Whether a booking exists at all is the owner's information.
    if booking.user_id != identity.user_id {
        return Err(ServiceError::NotFound {
            resource: "booking",
        });
    }
    Ok(Json(booking_view(booking, state.hotel.as_ref()).await))
}

async fn booking_view(booking: Booking, hotel: &dyn HotelApi) -> BookingView {
    let hotel_name = hotel
        .hotel_name(booking.hotel_id)
        .await
        .unwrap_or_else(|| "Hotel not found".to_string());
    BookingView {
        id: booking.id,
        hotel_id: booking.hotel_id,
        hotel_name,
        room_id: booking.room_id,
        user_id: booking.user_id,
        check_in: booking.check_in,
        check_out: booking.check_out,
        guest_count: booking.guest_count,
        status: booking.status,
    }
}

pub async fn health_check() -> &'static str {
    "OK"
}

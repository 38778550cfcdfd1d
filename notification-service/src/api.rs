use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use shared::auth::{Identity, InternalSecret};
use shared::db::DbPool;
use shared::pagination::{PageParams, PagedResponse};
use shared::{ServiceError, ServiceResult};

use crate::models::Notification;
use crate::push::{ws_handler, LiveSessions};
use crate::store;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub sessions: Arc<LiveSessions>,
    pub secret: InternalSecret,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/notifications", get(list_notifications))
        .route("/api/v1/notifications/unseen-count", get(unseen_count))
        .route("/api/v1/notifications/seen-all", put(mark_all_seen))
        .route(
            "/api/v1/notifications/:notification_id/seen",
            put(mark_seen),
        )
        .route("/ws", get(ws_handler))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

pub async fn list_notifications(
    State(state): State<AppState>,
    identity: Identity,
    Query(page): Query<PageParams>,
) -> ServiceResult<Json<PagedResponse<Notification>>> {
    let page = page.normalized();
    let (content, total) =
        store::notifications_for_user(&state.pool, identity.user_id, page).await?;
    Ok(Json(PagedResponse::new(content, page, total)))
}

pub async fn unseen_count(
    State(state): State<AppState>,
    identity: Identity,
) -> ServiceResult<Json<i64>> {
    let count = store::unseen_count(&state.pool, identity.user_id).await?;
    Ok(Json(count))
}

pub async fn mark_seen(
    State(state): State<AppState>,
    identity: Identity,
    Path(notification_id): Path<i64>,
) -> ServiceResult<StatusCode> {
    let updated = store::mark_seen(&state.pool, identity.user_id, notification_id).await?;
    if !updated {
        return Err(ServiceError::NotFound {
            resource: "notification",
        });
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_all_seen(
    State(state): State<AppState>,
    identity: Identity,
) -> ServiceResult<StatusCode> {
    store::mark_all_seen(&state.pool, identity.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn health_check() -> &'static str {
    "OK"
}

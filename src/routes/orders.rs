//! Order lifecycle routes. Every committed write refreshes the dashboard.

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::db::postgres::PgStore;
use crate::errors::{ApiResponse, AppError};
use crate::middleware::rbac::RequireAdmin;
use crate::models::order::UpdateOrderStatus;
use crate::services::aggregation::StatsEngine;
use crate::services::dashboard;
use crate::services::orders::{self, TransitionResult};
use crate::AppState;

/// PATCH /admin/orders/{id}/status: move an order along the lifecycle.
pub async fn update_status(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateOrderStatus>,
) -> Result<Json<ApiResponse<TransitionResult>>, AppError> {
    body.validate()?;

    let result =
        orders::transition(&state.db, id, body.status, admin.id, body.note.as_deref()).await?;
    refresh(&state).await;
    Ok(ApiResponse::success(result))
}

/// POST /admin/orders/{id}/deliver: mark an approved order delivered.
pub async fn deliver(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<TransitionResult>>, AppError> {
    let result = orders::deliver(&state.db, id, admin.id).await?;
    refresh(&state).await;
    Ok(ApiResponse::success(result))
}

async fn refresh(state: &AppState) {
    let store = PgStore::new(state.db.clone());
    let engine = StatsEngine::new(&store, &state.config.stats, &state.sanitizer);
    dashboard::refresh_after_write(&engine, &state.cache, &state.events).await;
}

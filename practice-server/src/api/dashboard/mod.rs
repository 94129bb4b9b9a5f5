//! Dashboard API

use axum::{Json, Router, extract::State, routing::get};

use crate::core::ServerState;
use crate::db::repository::dashboard;
use crate::utils::AppResult;
use shared::models::DashboardSummary;

pub fn router() -> Router<ServerState> {
    Router::new().route("/api/dashboard/summary", get(summary))
}

/// GET /api/dashboard/summary
pub async fn summary(State(state): State<ServerState>) -> AppResult<Json<DashboardSummary>> {
    Ok(Json(dashboard::summary(&state.pool).await?))
}

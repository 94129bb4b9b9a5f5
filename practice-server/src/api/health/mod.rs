//! Health check
//!
//! | Path | Method | Auth |
//! |------|--------|------|
//! | /api/health | GET | none |
//!
//! ```json
//! { "status": "ok", "version": "0.1.0", "database": true }
//! ```

use axum::{Json, Router, extract::State, routing::get};

use crate::core::ServerState;
use crate::db::DbService;
use shared::client::HealthResponse;

pub fn router() -> Router<ServerState> {
    Router::new().route("/api/health", get(health))
}

/// `degraded` when the database does not answer
pub async fn health(State(state): State<ServerState>) -> Json<HealthResponse> {
    let database = DbService::ping(&state.pool).await;
    if !database {
        tracing::warn!("Health check: database unreachable");
    }
    Json(HealthResponse {
        status: if database { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database,
    })
}

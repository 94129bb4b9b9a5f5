//! Authentication Routes

mod handler;

use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::auth::login_rate_limit;
use crate::core::ServerState;

/// - /api/auth/login: public, rate limited per client IP
/// - /api/auth/me, /api/auth/change-password: token required (global `require_auth`)
pub fn router(state: &ServerState) -> Router<ServerState> {
    let login = Router::new()
        .route("/api/auth/login", post(handler::login))
        .route_layer(middleware::from_fn_with_state(state.clone(), login_rate_limit));

    Router::new()
        .route("/api/auth/me", get(handler::me))
        .route("/api/auth/change-password", post(handler::change_password))
        .merge(login)
}

//! Staff User API (admin only)

mod handler;

use axum::{
    Router, middleware,
    routing::{get, put},
};

use crate::auth::{permissions::USERS_MANAGE, require_permission};
use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/staff-users", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/", get(handler::list).post(handler::create))
        .route(
            "/{id}",
            put(handler::update)
                .get(handler::get_by_id)
                .delete(handler::deactivate),
        )
        .route_layer(middleware::from_fn(require_permission(USERS_MANAGE)))
}

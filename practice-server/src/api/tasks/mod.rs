//! Task API
//!
//! Reads are open to every signed-in user; writes need `tasks:write`.

mod handler;

use axum::{
    Router, middleware,
    routing::{get, post, put},
};

use crate::auth::permissions::TASKS_WRITE;
use crate::auth::require_permission;
use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/tasks", routes())
}

fn routes() -> Router<ServerState> {
    let read_routes = Router::new()
        .route("/", get(handler::list))
        .route("/{id}", get(handler::get_by_id));

    let write_routes = Router::new()
        .route("/", post(handler::create))
        .route("/{id}", put(handler::update).delete(handler::delete))
        .route("/{id}/status", put(handler::set_status))
        .route("/bulk-delete", post(handler::bulk_delete))
        .route_layer(middleware::from_fn(require_permission(TASKS_WRITE)));

    read_routes.merge(write_routes)
}

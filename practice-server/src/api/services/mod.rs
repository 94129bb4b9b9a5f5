//! Catalog Service API

mod handler;

use axum::{
    Router, middleware,
    routing::{get, post, put},
};

use crate::auth::{permissions::CATALOG_WRITE, require_permission};
use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/services", routes())
}

fn routes() -> Router<ServerState> {
    let read_routes = Router::new()
        .route("/", get(handler::list))
        .route("/{id}", get(handler::get_by_id));

    let write_routes = Router::new()
        .route("/", post(handler::create))
        .route("/{id}", put(handler::update).delete(handler::delete))
        .route_layer(middleware::from_fn(require_permission(CATALOG_WRITE)));

    read_routes.merge(write_routes)
}

//! Consultation API

mod handler;

use axum::{
    Router, middleware,
    routing::{get, post, put},
};

use crate::auth::permissions::{CLINICAL_READ, CLINICAL_WRITE};
use crate::auth::require_permission;
use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/consultations", routes())
}

fn routes() -> Router<ServerState> {
    let read_routes = Router::new()
        .route("/", get(handler::list))
        .route("/{id}", get(handler::get_by_id))
        .route_layer(middleware::from_fn(require_permission(CLINICAL_READ)));

    let write_routes = Router::new()
        .route("/", post(handler::create))
        .route("/{id}", put(handler::update).delete(handler::delete))
        .route("/{id}/sign", post(handler::sign))
        .route_layer(middleware::from_fn(require_permission(CLINICAL_WRITE)));

    read_routes.merge(write_routes)
}

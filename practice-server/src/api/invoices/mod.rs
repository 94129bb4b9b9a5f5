//! Invoice API
//!
//! Drafts are editable and deletable. Issuing fixes the amounts; payments
//! and voiding only apply to issued invoices.

mod handler;

use axum::{
    Router, middleware,
    routing::{get, post, put},
};

use crate::auth::permissions::{BILLING_READ, BILLING_WRITE};
use crate::auth::require_permission;
use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/invoices", routes())
}

fn routes() -> Router<ServerState> {
    let read_routes = Router::new()
        .route("/", get(handler::list))
        .route("/{id}", get(handler::get_by_id))
        .route_layer(middleware::from_fn(require_permission(BILLING_READ)));

    let write_routes = Router::new()
        .route("/", post(handler::create))
        .route("/from-order", post(handler::create_from_order))
        .route("/{id}", put(handler::update).delete(handler::delete))
        .route("/{id}/issue", post(handler::issue))
        .route("/{id}/payments", post(handler::record_payment))
        .route("/{id}/void", post(handler::void))
        .route_layer(middleware::from_fn(require_permission(BILLING_WRITE)));

    read_routes.merge(write_routes)
}

//! Form Builder API
//!
//! | Path | Permission |
//! |------|------------|
//! | GET /api/forms, /api/forms/{id} | signed in |
//! | template and field writes | `forms:write` |
//! | POST /api/forms/{id}/submissions | `patients:write` |
//! | submission reads | `patients:read` |

mod handler;

use axum::{
    Router, middleware,
    routing::{get, post, put},
};

use crate::auth::permissions::{FORMS_WRITE, PATIENTS_READ, PATIENTS_WRITE};
use crate::auth::require_permission;
use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new()
        .nest("/api/forms", template_routes())
        .nest("/api/form-submissions", submission_routes())
}

fn template_routes() -> Router<ServerState> {
    let read_routes = Router::new()
        .route("/", get(handler::list))
        .route("/{id}", get(handler::get_by_id));

    let write_routes = Router::new()
        .route("/", post(handler::create))
        .route("/{id}", put(handler::update).delete(handler::delete))
        .route("/{id}/duplicate", post(handler::duplicate))
        .route("/{id}/fields", post(handler::add_field))
        .route("/{id}/fields/move", post(handler::move_field))
        .route(
            "/{id}/fields/{field_id}",
            put(handler::update_field).delete(handler::remove_field),
        )
        .route_layer(middleware::from_fn(require_permission(FORMS_WRITE)));

    let submit_routes = Router::new()
        .route("/{id}/submissions", post(handler::submit))
        .route_layer(middleware::from_fn(require_permission(PATIENTS_WRITE)));

    let submission_reads = Router::new()
        .route("/{id}/submissions", get(handler::template_submissions))
        .route_layer(middleware::from_fn(require_permission(PATIENTS_READ)));

    read_routes
        .merge(write_routes)
        .merge(submit_routes)
        .merge(submission_reads)
}

fn submission_routes() -> Router<ServerState> {
    Router::new()
        .route("/", get(handler::list_submissions))
        .route("/{id}", get(handler::get_submission))
        .route_layer(middleware::from_fn(require_permission(PATIENTS_READ)))
}

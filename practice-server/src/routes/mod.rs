//! Router assembly
//!
//! Every API module contributes its own `router()`; [`build_app`] merges
//! them and wraps the result in the tower stack.

use std::time::Duration;

use axum::Router;
use axum::middleware as axum_middleware;
use http::{HeaderName, HeaderValue, StatusCode};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::api;
use crate::auth::require_auth;
use crate::core::ServerState;
use crate::middleware;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// UUID v4 request IDs
#[derive(Clone)]
struct XRequestId;

impl MakeRequestId for XRequestId {
    fn make_request_id<B>(&mut self, _request: &http::Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// All routes, no middleware and no state
pub fn build_router(state: &ServerState) -> Router<ServerState> {
    Router::new()
        // Public
        .merge(api::health::router())
        .merge(api::auth::router(state))
        // Administration
        .merge(api::staff_users::router())
        .merge(api::audit_log::router())
        // Patients
        .merge(api::patients::router())
        .merge(api::insurance::router())
        .merge(api::tags::router())
        // Clinical
        .merge(api::consultations::router())
        .merge(api::sessions::router())
        .merge(api::forms::router())
        // Catalog
        .merge(api::providers::router())
        .merge(api::services::router())
        .merge(api::pharmacies::router())
        .merge(api::discounts::router())
        // Orders and billing
        .merge(api::orders::router())
        .merge(api::invoices::router())
        // Collaboration
        .merge(api::tasks::router())
        .merge(api::tickets::router())
        .merge(api::dashboard::router())
}

/// Fully configured application, used by the HTTP server and by tests
pub fn build_app(state: &ServerState) -> Router {
    let cors = if state.config.cors_permissive {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    };

    build_router(state)
        // ========== Tower HTTP Middleware ==========
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_millis(state.config.request_timeout_ms),
        ))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(axum_middleware::from_fn(middleware::logging_middleware))
        .layer(TraceLayer::new_for_http())
        // ========== Application Middleware ==========
        .layer(SetRequestIdLayer::new(
            HeaderName::from_static(REQUEST_ID_HEADER),
            XRequestId,
        ))
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
            REQUEST_ID_HEADER,
        )))
        // Outermost: resolves CurrentUser before anything below runs
        .layer(axum_middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone())
}

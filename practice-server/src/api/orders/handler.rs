//! Order API Handlers

use axum::{
    Json,
    extract::{Extension, Path, Query, State},
};
use serde_json::json;

use crate::audit::{AuditAction, create_diff, create_snapshot};
use crate::auth::CurrentUser;
use crate::core::ServerState;
use crate::db::repository::order;
use crate::utils::validation::validate_dto;
use crate::utils::{AppError, AppResult, ErrorCode};
use shared::models::{Order, OrderCreate, OrderFilter, OrderStatusUpdate, OrderUpdate};
use shared::query::{ListQuery, Page};

const RESOURCE: &str = "order";

async fn require(state: &ServerState, id: i64) -> AppResult<Order> {
    order::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::with_message(ErrorCode::OrderNotFound, format!("Order {id} not found")))
}

/// GET /api/orders?status=&patient_id=
pub async fn list(
    State(state): State<ServerState>,
    Query(query): Query<ListQuery>,
    Query(filter): Query<OrderFilter>,
) -> AppResult<Json<Page<Order>>> {
    Ok(Json(order::list(&state.pool, &query, &filter).await?))
}

/// GET /api/orders/:id - with items
pub async fn get_by_id(State(state): State<ServerState>, Path(id): Path<i64>) -> AppResult<Json<Order>> {
    Ok(Json(require(&state, id).await?))
}

/// POST /api/orders
pub async fn create(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(payload): Json<OrderCreate>,
) -> AppResult<Json<Order>> {
    validate_dto(&payload)?;
    let o = order::create(&state.pool, payload, current_user.id)
        .await
        .map_err(|e| e.or_code(ErrorCode::PatientNotFound))?;

    tracing::info!(order_number = %o.order_number, total = o.total, "Order created");
    state
        .audit
        .log(
            AuditAction::Created,
            RESOURCE,
            o.id,
            Some(&current_user),
            create_snapshot(&o, RESOURCE),
        )
        .await;
    Ok(Json(o))
}

/// PUT /api/orders/:id - items and discount only while pending
pub async fn update(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(payload): Json<OrderUpdate>,
) -> AppResult<Json<Order>> {
    validate_dto(&payload)?;
    let old = require(&state, id).await?;
    let o = order::update(&state.pool, id, payload)
        .await
        .map_err(|e| e.or_code(ErrorCode::OrderNotFound))?;
    state
        .audit
        .log(
            AuditAction::Updated,
            RESOURCE,
            id,
            Some(&current_user),
            create_diff(&old, &o, RESOURCE),
        )
        .await;
    Ok(Json(o))
}

/// PUT /api/orders/:id/status
pub async fn set_status(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(payload): Json<OrderStatusUpdate>,
) -> AppResult<Json<Order>> {
    let (from, o) = order::set_status(&state.pool, id, payload.status)
        .await
        .map_err(|e| e.or_code(ErrorCode::OrderNotFound))?;
    state
        .audit
        .log(
            AuditAction::StatusChanged,
            RESOURCE,
            id,
            Some(&current_user),
            json!({ "order_number": o.order_number, "from": from, "to": o.status }),
        )
        .await;
    Ok(Json(o))
}

/// DELETE /api/orders/:id - pending or cancelled orders only
pub async fn delete(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<Order>> {
    let o = order::delete(&state.pool, id)
        .await
        .map_err(|e| e.or_code(ErrorCode::OrderNotFound))?;
    state
        .audit
        .log(
            AuditAction::Deleted,
            RESOURCE,
            id,
            Some(&current_user),
            json!({ "order_number": o.order_number, "total": o.total }),
        )
        .await;
    Ok(Json(o))
}

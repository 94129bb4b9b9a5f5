//! Discount API Handlers

use axum::{
    Json,
    extract::{Extension, Path, Query, State},
};

use crate::audit::{AuditAction, create_delete_details, create_diff, create_snapshot};
use crate::auth::CurrentUser;
use crate::core::ServerState;
use crate::db::repository::discount;
use crate::utils::validation::{
    check_rule, validate_dto, validate_optional_required_text, validate_required_text,
};
use crate::utils::{AppError, AppResult, ErrorCode};
use shared::models::{Discount, DiscountCreate, DiscountUpdate, check_discount_rules};
use shared::query::{ListQuery, Page};

const RESOURCE: &str = "discount";

async fn require(state: &ServerState, id: i64) -> AppResult<Discount> {
    discount::find_by_id(&state.pool, id).await?.ok_or_else(|| {
        AppError::with_message(ErrorCode::DiscountNotFound, format!("Discount {id} not found"))
    })
}

/// GET /api/discounts
pub async fn list(
    State(state): State<ServerState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Page<Discount>>> {
    Ok(Json(discount::list(&state.pool, &query).await?))
}

/// GET /api/discounts/:id
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Discount>> {
    Ok(Json(require(&state, id).await?))
}

/// GET /api/discounts/code/:code - case-insensitive
pub async fn get_by_code(
    State(state): State<ServerState>,
    Path(code): Path<String>,
) -> AppResult<Json<Discount>> {
    let d = discount::find_by_code(&state.pool, &code).await?.ok_or_else(|| {
        AppError::with_message(ErrorCode::DiscountNotFound, format!("Discount code '{code}' not found"))
    })?;
    Ok(Json(d))
}

/// POST /api/discounts
pub async fn create(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(payload): Json<DiscountCreate>,
) -> AppResult<Json<Discount>> {
    validate_dto(&payload)?;
    validate_required_text(&payload.name, "name")?;
    validate_required_text(&payload.code, "code")?;
    check_rule(
        check_discount_rules(
            payload.kind,
            payload.value,
            payload.valid_from.as_deref(),
            payload.valid_until.as_deref(),
        ),
        ErrorCode::ValidationFailed,
    )?;

    let d = discount::create(&state.pool, payload)
        .await
        .map_err(|e| e.on_duplicate(ErrorCode::DiscountCodeExists, "Discount code already exists"))?;
    state
        .audit
        .log(
            AuditAction::Created,
            RESOURCE,
            d.id,
            Some(&current_user),
            create_snapshot(&d, RESOURCE),
        )
        .await;
    Ok(Json(d))
}

/// PUT /api/discounts/:id - rules are checked on the merged result
pub async fn update(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(payload): Json<DiscountUpdate>,
) -> AppResult<Json<Discount>> {
    validate_dto(&payload)?;
    validate_optional_required_text(&payload.name, "name")?;
    validate_optional_required_text(&payload.code, "code")?;
    let old = require(&state, id).await?;
    check_rule(
        check_discount_rules(
            payload.kind.unwrap_or(old.kind),
            payload.value.unwrap_or(old.value),
            payload.valid_from.as_deref().or(old.valid_from.as_deref()),
            payload.valid_until.as_deref().or(old.valid_until.as_deref()),
        ),
        ErrorCode::ValidationFailed,
    )?;

    let d = discount::update(&state.pool, id, payload)
        .await
        .map_err(|e| e.on_duplicate(ErrorCode::DiscountCodeExists, "Discount code already exists"))?;
    state
        .audit
        .log(
            AuditAction::Updated,
            RESOURCE,
            id,
            Some(&current_user),
            create_diff(&old, &d, RESOURCE),
        )
        .await;
    Ok(Json(d))
}

/// DELETE /api/discounts/:id - orders and invoices keep their amounts
pub async fn delete(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<bool>> {
    let old = require(&state, id).await?;
    let deleted = discount::delete(&state.pool, id).await?;
    if deleted {
        state
            .audit
            .log(
                AuditAction::Deleted,
                RESOURCE,
                id,
                Some(&current_user),
                create_delete_details(&old.code),
            )
            .await;
    }
    Ok(Json(deleted))
}

//! Pharmacy API Handlers

use axum::{
    Json,
    extract::{Extension, Path, Query, State},
};
use serde_json::json;

use crate::audit::{AuditAction, create_delete_details, create_diff, create_snapshot};
use crate::auth::CurrentUser;
use crate::core::ServerState;
use crate::db::repository::pharmacy;
use crate::utils::validation::{validate_dto, validate_optional_required_text, validate_required_text};
use crate::utils::{AppError, AppResult, ErrorCode};
use shared::models::{Pharmacy, PharmacyCreate, PharmacyUpdate};
use shared::query::{BulkDeleteRequest, BulkDeleteResult, ListQuery, Page};

const RESOURCE: &str = "pharmacy";

async fn require(state: &ServerState, id: i64) -> AppResult<Pharmacy> {
    pharmacy::find_by_id(&state.pool, id).await?.ok_or_else(|| {
        AppError::with_message(ErrorCode::PharmacyNotFound, format!("Pharmacy {id} not found"))
    })
}

/// GET /api/pharmacies
pub async fn list(
    State(state): State<ServerState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Page<Pharmacy>>> {
    Ok(Json(pharmacy::list(&state.pool, &query).await?))
}

/// GET /api/pharmacies/:id
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Pharmacy>> {
    Ok(Json(require(&state, id).await?))
}

/// POST /api/pharmacies
pub async fn create(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(payload): Json<PharmacyCreate>,
) -> AppResult<Json<Pharmacy>> {
    validate_dto(&payload)?;
    validate_required_text(&payload.name, "name")?;
    let name = payload.name.trim().to_string();

    let p = pharmacy::create(&state.pool, payload).await.map_err(|e| {
        e.on_duplicate(ErrorCode::AlreadyExists, format!("Pharmacy '{name}' already exists"))
    })?;
    state
        .audit
        .log(
            AuditAction::Created,
            RESOURCE,
            p.id,
            Some(&current_user),
            create_snapshot(&p, RESOURCE),
        )
        .await;
    Ok(Json(p))
}

/// PUT /api/pharmacies/:id
pub async fn update(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(payload): Json<PharmacyUpdate>,
) -> AppResult<Json<Pharmacy>> {
    validate_dto(&payload)?;
    validate_optional_required_text(&payload.name, "name")?;

    let old = require(&state, id).await?;
    let p = pharmacy::update(&state.pool, id, payload)
        .await
        .map_err(|e| e.on_duplicate(ErrorCode::AlreadyExists, "Pharmacy name already exists"))?;
    state
        .audit
        .log(
            AuditAction::Updated,
            RESOURCE,
            id,
            Some(&current_user),
            create_diff(&old, &p, RESOURCE),
        )
        .await;
    Ok(Json(p))
}

/// DELETE /api/pharmacies/:id
pub async fn delete(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<bool>> {
    let old = require(&state, id).await?;
    let deleted = pharmacy::delete(&state.pool, id).await?;
    if deleted {
        state
            .audit
            .log(
                AuditAction::Deleted,
                RESOURCE,
                id,
                Some(&current_user),
                create_delete_details(&old.name),
            )
            .await;
    }
    Ok(Json(deleted))
}

/// POST /api/pharmacies/bulk-delete - pharmacies used by orders are skipped
pub async fn bulk_delete(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(payload): Json<BulkDeleteRequest>,
) -> AppResult<Json<BulkDeleteResult>> {
    let deleted = pharmacy::delete_many(&state.pool, &payload.ids).await?;
    if deleted > 0 {
        state
            .audit
            .log(
                AuditAction::Deleted,
                RESOURCE,
                "bulk",
                Some(&current_user),
                json!({ "ids": payload.ids, "deleted": deleted }),
            )
            .await;
    }
    Ok(Json(BulkDeleteResult { deleted }))
}

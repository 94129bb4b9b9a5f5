//! Catalog Service API Handlers

use axum::{
    Json,
    extract::{Extension, Path, Query, State},
};

use crate::audit::{AuditAction, create_delete_details, create_diff, create_snapshot};
use crate::auth::CurrentUser;
use crate::core::ServerState;
use crate::db::repository::service;
use crate::utils::validation::{validate_dto, validate_optional_required_text, validate_required_text};
use crate::utils::{AppError, AppResult, ErrorCode};
use shared::models::{CatalogService, CatalogServiceCreate, CatalogServiceUpdate};
use shared::query::{ListQuery, Page};

const RESOURCE: &str = "service";

async fn require(state: &ServerState, id: i64) -> AppResult<CatalogService> {
    service::find_by_id(&state.pool, id).await?.ok_or_else(|| {
        AppError::with_message(ErrorCode::ServiceNotFound, format!("Service {id} not found"))
    })
}

/// GET /api/services
pub async fn list(
    State(state): State<ServerState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Page<CatalogService>>> {
    Ok(Json(service::list(&state.pool, &query).await?))
}

/// GET /api/services/:id
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<CatalogService>> {
    Ok(Json(require(&state, id).await?))
}

/// POST /api/services
pub async fn create(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(payload): Json<CatalogServiceCreate>,
) -> AppResult<Json<CatalogService>> {
    validate_dto(&payload)?;
    validate_required_text(&payload.name, "name")?;
    validate_required_text(&payload.code, "code")?;
    let code = payload.code.trim().to_string();

    let s = service::create(&state.pool, payload).await.map_err(|e| {
        e.on_duplicate(ErrorCode::ServiceCodeExists, format!("Service code '{code}' already exists"))
    })?;
    state
        .audit
        .log(
            AuditAction::Created,
            RESOURCE,
            s.id,
            Some(&current_user),
            create_snapshot(&s, RESOURCE),
        )
        .await;
    Ok(Json(s))
}

/// PUT /api/services/:id
pub async fn update(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(payload): Json<CatalogServiceUpdate>,
) -> AppResult<Json<CatalogService>> {
    validate_dto(&payload)?;
    validate_optional_required_text(&payload.name, "name")?;
    validate_optional_required_text(&payload.code, "code")?;

    let old = require(&state, id).await?;
    let s = service::update(&state.pool, id, payload)
        .await
        .map_err(|e| e.on_duplicate(ErrorCode::ServiceCodeExists, "Service code already exists"))?;
    state
        .audit
        .log(
            AuditAction::Updated,
            RESOURCE,
            id,
            Some(&current_user),
            create_diff(&old, &s, RESOURCE),
        )
        .await;
    Ok(Json(s))
}

/// DELETE /api/services/:id - refused while orders or sessions use it
pub async fn delete(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<bool>> {
    let old = require(&state, id).await?;
    let deleted = service::delete(&state.pool, id).await?;
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

//! Provider API Handlers

use axum::{
    Json,
    extract::{Extension, Path, Query, State},
};

use crate::audit::{AuditAction, create_delete_details, create_diff, create_snapshot};
use crate::auth::CurrentUser;
use crate::core::ServerState;
use crate::db::repository::provider;
use crate::utils::validation::{normalize_optional, validate_dto};
use crate::utils::{AppError, AppResult, ErrorCode};
use shared::models::{Provider, ProviderCreate, ProviderUpdate, is_valid_npi};
use shared::query::{ListQuery, Page};

const RESOURCE: &str = "provider";

fn not_found(id: i64) -> AppError {
    AppError::with_message(ErrorCode::ProviderNotFound, format!("Provider {id} not found"))
}

fn check_npi(npi: Option<&str>) -> AppResult<()> {
    if let Some(npi) = npi
        && !is_valid_npi(npi)
    {
        return Err(AppError::validation("npi must be exactly 10 digits").with_detail("field", "npi"));
    }
    Ok(())
}

/// GET /api/providers
pub async fn list(
    State(state): State<ServerState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Page<Provider>>> {
    Ok(Json(provider::list(&state.pool, &query).await?))
}

/// GET /api/providers/:id
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Provider>> {
    let p = provider::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| not_found(id))?;
    Ok(Json(p))
}

/// POST /api/providers
pub async fn create(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(mut payload): Json<ProviderCreate>,
) -> AppResult<Json<Provider>> {
    validate_dto(&payload)?;
    payload.npi = normalize_optional(payload.npi);
    check_npi(payload.npi.as_deref())?;

    let p = provider::create(&state.pool, payload)
        .await
        .map_err(|e| e.on_duplicate(ErrorCode::AlreadyExists, "NPI is already registered"))?;
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

/// PUT /api/providers/:id
pub async fn update(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(payload): Json<ProviderUpdate>,
) -> AppResult<Json<Provider>> {
    validate_dto(&payload)?;
    check_npi(payload.npi.as_deref())?;

    let old = provider::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| not_found(id))?;
    let p = provider::update(&state.pool, id, payload)
        .await
        .map_err(|e| match e {
            crate::db::repository::RepoError::Duplicate(_) => {
                AppError::with_message(ErrorCode::AlreadyExists, "NPI is already registered")
            }
            other => other.or_code(ErrorCode::ProviderNotFound),
        })?;

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

/// DELETE /api/providers/:id - refused once referenced
pub async fn delete(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<bool>> {
    let old = provider::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| not_found(id))?;
    let deleted = provider::delete(&state.pool, id).await?;
    if deleted {
        state
            .audit
            .log(
                AuditAction::Deleted,
                RESOURCE,
                id,
                Some(&current_user),
                create_delete_details(&format!("{} {}", old.first_name, old.last_name)),
            )
            .await;
    }
    Ok(Json(deleted))
}

//! Insurance Record API Handlers

use axum::{
    Json,
    extract::{Extension, Path, Query, State},
};
use serde_json::json;

use crate::audit::{AuditAction, create_diff, create_snapshot};
use crate::auth::CurrentUser;
use crate::core::ServerState;
use crate::db::repository::{insurance, patient};
use crate::utils::validation::{validate_date, validate_dto};
use crate::utils::{AppError, AppResult, ErrorCode};
use shared::models::{InsuranceCreate, InsuranceFilter, InsuranceRecord, InsuranceUpdate};
use shared::query::{ListQuery, Page};
use shared::util::parse_date;

const RESOURCE: &str = "insurance_record";

async fn require(state: &ServerState, id: i64) -> AppResult<InsuranceRecord> {
    insurance::find_by_id(&state.pool, id).await?.ok_or_else(|| {
        AppError::with_message(ErrorCode::InsuranceNotFound, format!("Insurance record {id} not found"))
    })
}

/// Both dates well-formed and in order
fn check_window(valid_from: Option<&str>, valid_until: Option<&str>) -> AppResult<()> {
    validate_date(valid_from, "valid_from")?;
    validate_date(valid_until, "valid_until")?;
    if let (Some(from), Some(until)) = (valid_from.and_then(parse_date), valid_until.and_then(parse_date))
        && from > until
    {
        return Err(AppError::validation("valid_from must not be after valid_until"));
    }
    Ok(())
}

/// GET /api/insurance?patient_id=
pub async fn list(
    State(state): State<ServerState>,
    Query(query): Query<ListQuery>,
    Query(filter): Query<InsuranceFilter>,
) -> AppResult<Json<Page<InsuranceRecord>>> {
    Ok(Json(insurance::list(&state.pool, &query, &filter).await?))
}

/// GET /api/insurance/:id
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<InsuranceRecord>> {
    Ok(Json(require(&state, id).await?))
}

/// POST /api/insurance - `is_primary` demotes the patient's other records
pub async fn create(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(payload): Json<InsuranceCreate>,
) -> AppResult<Json<InsuranceRecord>> {
    validate_dto(&payload)?;
    check_window(payload.valid_from.as_deref(), payload.valid_until.as_deref())?;
    patient::find_active(&state.pool, payload.patient_id)
        .await
        .map_err(|e| e.or_code(ErrorCode::PatientNotFound))?;

    let record = insurance::create(&state.pool, payload).await?;
    state
        .audit
        .log(
            AuditAction::Created,
            RESOURCE,
            record.id,
            Some(&current_user),
            create_snapshot(&record, RESOURCE),
        )
        .await;
    Ok(Json(record))
}

/// PUT /api/insurance/:id
pub async fn update(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(payload): Json<InsuranceUpdate>,
) -> AppResult<Json<InsuranceRecord>> {
    validate_dto(&payload)?;
    let old = require(&state, id).await?;
    check_window(
        payload.valid_from.as_deref().or(old.valid_from.as_deref()),
        payload.valid_until.as_deref().or(old.valid_until.as_deref()),
    )?;

    let record = insurance::update(&state.pool, id, payload)
        .await
        .map_err(|e| e.or_code(ErrorCode::InsuranceNotFound))?;
    state
        .audit
        .log(
            AuditAction::Updated,
            RESOURCE,
            id,
            Some(&current_user),
            create_diff(&old, &record, RESOURCE),
        )
        .await;
    Ok(Json(record))
}

/// DELETE /api/insurance/:id - invoices keep their computed amounts
pub async fn delete(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<bool>> {
    let old = require(&state, id).await?;
    let deleted = insurance::delete(&state.pool, id).await?;
    if deleted {
        state
            .audit
            .log(
                AuditAction::Deleted,
                RESOURCE,
                id,
                Some(&current_user),
                json!({ "patient_id": old.patient_id, "carrier": old.carrier, "policy_number": old.policy_number }),
            )
            .await;
    }
    Ok(Json(deleted))
}

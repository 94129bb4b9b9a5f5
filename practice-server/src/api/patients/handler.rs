//! Patient API Handlers

use axum::{
    Json,
    extract::{Extension, Path, Query, State},
};
use serde_json::json;

use crate::audit::{AuditAction, create_diff, create_snapshot};
use crate::auth::CurrentUser;
use crate::core::ServerState;
use crate::db::repository::{insurance, patient};
use crate::utils::validation::{
    normalize_optional, validate_dto, validate_optional_required_text, validate_past_date,
    validate_required_text,
};
use crate::utils::{AppError, AppResult, ErrorCode};
use shared::models::{Patient, PatientCreate, PatientDetail, PatientFilter, PatientUpdate, SetTags};
use shared::query::{BulkDeleteRequest, BulkDeleteResult, ListQuery, Page};
use shared::util::today;

const RESOURCE: &str = "patient";

async fn require(state: &ServerState, id: i64) -> AppResult<Patient> {
    patient::find_by_id(&state.pool, id).await?.ok_or_else(|| {
        AppError::with_message(ErrorCode::PatientNotFound, format!("Patient {id} not found"))
    })
}

/// GET /api/patients?q=&is_active=&tag_id=
pub async fn list(
    State(state): State<ServerState>,
    Query(query): Query<ListQuery>,
    Query(filter): Query<PatientFilter>,
) -> AppResult<Json<Page<Patient>>> {
    Ok(Json(patient::list(&state.pool, &query, &filter).await?))
}

/// GET /api/patients/:id - with insurance records
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<PatientDetail>> {
    let patient = require(&state, id).await?;
    let insurance = insurance::for_patient(&state.pool, id).await?;
    Ok(Json(PatientDetail { patient, insurance }))
}

/// POST /api/patients
pub async fn create(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(mut payload): Json<PatientCreate>,
) -> AppResult<Json<Patient>> {
    validate_dto(&payload)?;
    validate_required_text(&payload.first_name, "first_name")?;
    validate_required_text(&payload.last_name, "last_name")?;
    validate_past_date(payload.date_of_birth.as_deref(), "date_of_birth", today())?;
    payload.email = normalize_optional(payload.email);

    let p = patient::create(&state.pool, payload).await?;
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

/// PUT /api/patients/:id
pub async fn update(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(payload): Json<PatientUpdate>,
) -> AppResult<Json<Patient>> {
    validate_dto(&payload)?;
    validate_optional_required_text(&payload.first_name, "first_name")?;
    validate_optional_required_text(&payload.last_name, "last_name")?;
    validate_past_date(payload.date_of_birth.as_deref(), "date_of_birth", today())?;

    let old = require(&state, id).await?;
    let p = patient::update(&state.pool, id, payload)
        .await
        .map_err(|e| e.or_code(ErrorCode::PatientNotFound))?;

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

/// DELETE /api/patients/:id - archive (records are kept)
pub async fn archive(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<Patient>> {
    let p = patient::archive(&state.pool, id)
        .await
        .map_err(|e| e.or_code(ErrorCode::PatientNotFound))?;
    state
        .audit
        .log(
            AuditAction::Archived,
            RESOURCE,
            id,
            Some(&current_user),
            json!({ "name": p.full_name() }),
        )
        .await;
    Ok(Json(p))
}

/// POST /api/patients/bulk-archive
pub async fn bulk_archive(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(payload): Json<BulkDeleteRequest>,
) -> AppResult<Json<BulkDeleteResult>> {
    let deleted = patient::archive_many(&state.pool, &payload.ids).await?;
    if deleted > 0 {
        state
            .audit
            .log(
                AuditAction::Archived,
                RESOURCE,
                "bulk",
                Some(&current_user),
                json!({ "ids": payload.ids, "archived": deleted }),
            )
            .await;
    }
    Ok(Json(BulkDeleteResult { deleted }))
}

/// PUT /api/patients/:id/tags - replace the tag set
pub async fn set_tags(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(payload): Json<SetTags>,
) -> AppResult<Json<Patient>> {
    let old = require(&state, id).await?;
    let p = patient::set_tags(&state.pool, id, &payload.tag_ids)
        .await
        .map_err(|e| e.or_code(ErrorCode::PatientNotFound))?;

    let names = |p: &Patient| p.tags.iter().map(|t| t.name.clone()).collect::<Vec<_>>();
    state
        .audit
        .log(
            AuditAction::TagsChanged,
            RESOURCE,
            id,
            Some(&current_user),
            json!({ "from": names(&old), "to": names(&p) }),
        )
        .await;
    Ok(Json(p))
}

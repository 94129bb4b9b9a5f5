//! Consultation API Handlers
//!
//! A signed consultation is frozen: update, sign and delete all answer
//! `ConsultationSigned`.

use axum::{
    Json,
    extract::{Extension, Path, Query, State},
};
use serde_json::json;

use crate::audit::{AuditAction, create_diff, create_snapshot};
use crate::auth::CurrentUser;
use crate::core::ServerState;
use crate::db::repository::consultation;
use crate::utils::validation::{validate_dto, validate_optional_required_text, validate_required_text};
use crate::utils::{AppError, AppResult, ErrorCode};
use shared::models::{Consultation, ConsultationCreate, ConsultationFilter, ConsultationUpdate};
use shared::query::{ListQuery, Page};

const RESOURCE: &str = "consultation";

async fn require(state: &ServerState, id: i64) -> AppResult<Consultation> {
    consultation::find_by_id(&state.pool, id).await?.ok_or_else(|| {
        AppError::with_message(ErrorCode::ConsultationNotFound, format!("Consultation {id} not found"))
    })
}

/// GET /api/consultations?patient_id=&provider_id=&status=
pub async fn list(
    State(state): State<ServerState>,
    Query(query): Query<ListQuery>,
    Query(filter): Query<ConsultationFilter>,
) -> AppResult<Json<Page<Consultation>>> {
    Ok(Json(consultation::list(&state.pool, &query, &filter).await?))
}

/// GET /api/consultations/:id
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Consultation>> {
    Ok(Json(require(&state, id).await?))
}

/// POST /api/consultations
pub async fn create(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(payload): Json<ConsultationCreate>,
) -> AppResult<Json<Consultation>> {
    validate_dto(&payload)?;
    validate_required_text(&payload.chief_complaint, "chief_complaint")?;
    let c = consultation::create(&state.pool, payload, current_user.id)
        .await
        .map_err(|e| e.or_code(ErrorCode::PatientNotFound))?;
    state
        .audit
        .log(
            AuditAction::Created,
            RESOURCE,
            c.id,
            Some(&current_user),
            create_snapshot(&c, RESOURCE),
        )
        .await;
    Ok(Json(c))
}

/// PUT /api/consultations/:id - drafts only
pub async fn update(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(payload): Json<ConsultationUpdate>,
) -> AppResult<Json<Consultation>> {
    validate_dto(&payload)?;
    validate_optional_required_text(&payload.chief_complaint, "chief_complaint")?;
    let old = require(&state, id).await?;
    let c = consultation::update(&state.pool, id, payload)
        .await
        .map_err(|e| e.or_code(ErrorCode::ConsultationNotFound))?;
    state
        .audit
        .log(
            AuditAction::Updated,
            RESOURCE,
            id,
            Some(&current_user),
            create_diff(&old, &c, RESOURCE),
        )
        .await;
    Ok(Json(c))
}

/// POST /api/consultations/:id/sign
pub async fn sign(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<Consultation>> {
    let c = consultation::sign(&state.pool, id, current_user.id)
        .await
        .map_err(|e| e.or_code(ErrorCode::ConsultationNotFound))?;

    tracing::info!(consultation_id = id, signed_by = current_user.id, "Consultation signed");
    state
        .audit
        .log(
            AuditAction::Signed,
            RESOURCE,
            id,
            Some(&current_user),
            json!({ "patient_id": c.patient_id, "signed_at": c.signed_at }),
        )
        .await;
    Ok(Json(c))
}

/// DELETE /api/consultations/:id - drafts only
pub async fn delete(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<Consultation>> {
    let c = consultation::delete(&state.pool, id)
        .await
        .map_err(|e| e.or_code(ErrorCode::ConsultationNotFound))?;
    state
        .audit
        .log(
            AuditAction::Deleted,
            RESOURCE,
            id,
            Some(&current_user),
            json!({ "patient_id": c.patient_id, "chief_complaint": c.chief_complaint }),
        )
        .await;
    Ok(Json(c))
}

//! Scheduled Session API Handlers

use axum::{
    Json,
    extract::{Extension, Path, Query, State},
};
use serde_json::json;

use crate::audit::{AuditAction, create_diff, create_snapshot};
use crate::auth::CurrentUser;
use crate::core::ServerState;
use crate::db::repository::session;
use crate::utils::validation::validate_dto;
use crate::utils::{AppError, AppResult, ErrorCode};
use shared::models::{Session, SessionCreate, SessionFilter, SessionStatusUpdate, SessionUpdate};
use shared::query::{ListQuery, Page};

const RESOURCE: &str = "session";

async fn require(state: &ServerState, id: i64) -> AppResult<Session> {
    session::find_by_id(&state.pool, id).await?.ok_or_else(|| {
        AppError::with_message(ErrorCode::SessionNotFound, format!("Session {id} not found"))
    })
}

/// GET /api/sessions?provider_id=&patient_id=&status=&from=&to=
pub async fn list(
    State(state): State<ServerState>,
    Query(query): Query<ListQuery>,
    Query(filter): Query<SessionFilter>,
) -> AppResult<Json<Page<Session>>> {
    if let (Some(from), Some(to)) = (filter.from, filter.to)
        && from > to
    {
        return Err(AppError::validation("from must not be after to"));
    }
    Ok(Json(session::list(&state.pool, &query, &filter).await?))
}

/// GET /api/sessions/:id
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Session>> {
    Ok(Json(require(&state, id).await?))
}

/// POST /api/sessions - refused when provider or patient is already booked
pub async fn create(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(payload): Json<SessionCreate>,
) -> AppResult<Json<Session>> {
    validate_dto(&payload)?;
    let s = session::create(&state.pool, payload, current_user.id)
        .await
        .map_err(|e| e.or_code(ErrorCode::PatientNotFound))?;

    tracing::info!(session_id = s.id, provider_id = s.provider_id, starts_at = s.starts_at, "Session booked");
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

/// PUT /api/sessions/:id - scheduled sessions only
pub async fn update(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(payload): Json<SessionUpdate>,
) -> AppResult<Json<Session>> {
    validate_dto(&payload)?;
    let old = require(&state, id).await?;
    let s = session::update(&state.pool, id, payload)
        .await
        .map_err(|e| e.or_code(ErrorCode::SessionNotFound))?;
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

/// PUT /api/sessions/:id/status
pub async fn set_status(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(payload): Json<SessionStatusUpdate>,
) -> AppResult<Json<Session>> {
    let (prev, s) = session::set_status(&state.pool, id, payload.status)
        .await
        .map_err(|e| e.or_code(ErrorCode::SessionNotFound))?;
    state
        .audit
        .log(
            AuditAction::StatusChanged,
            RESOURCE,
            id,
            Some(&current_user),
            json!({ "from": prev, "to": s.status }),
        )
        .await;
    Ok(Json(s))
}

/// DELETE /api/sessions/:id
pub async fn delete(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<Session>> {
    let s = session::delete(&state.pool, id)
        .await
        .map_err(|e| e.or_code(ErrorCode::SessionNotFound))?;
    state
        .audit
        .log(
            AuditAction::Deleted,
            RESOURCE,
            id,
            Some(&current_user),
            json!({ "patient_id": s.patient_id, "provider_id": s.provider_id, "starts_at": s.starts_at }),
        )
        .await;
    Ok(Json(s))
}

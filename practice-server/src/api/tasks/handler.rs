//! Task API Handlers

use axum::{
    Json,
    extract::{Extension, Path, Query, State},
};
use serde_json::json;

use crate::audit::{AuditAction, create_diff, create_snapshot};
use crate::auth::CurrentUser;
use crate::core::ServerState;
use crate::db::repository::task;
use crate::utils::validation::{validate_dto, validate_optional_required_text, validate_required_text};
use crate::utils::{AppError, AppResult, ErrorCode};
use shared::models::{Task, TaskCreate, TaskFilter, TaskStatusUpdate, TaskUpdate};
use shared::query::{BulkDeleteRequest, BulkDeleteResult, ListQuery, Page};

const RESOURCE: &str = "task";

async fn require(state: &ServerState, id: i64) -> AppResult<Task> {
    task::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::with_message(ErrorCode::TaskNotFound, format!("Task {id} not found")))
}

/// GET /api/tasks?status=&assignee_id=&patient_id=&overdue=&mine=
pub async fn list(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<ListQuery>,
    Query(filter): Query<TaskFilter>,
) -> AppResult<Json<Page<Task>>> {
    Ok(Json(task::list(&state.pool, &query, &filter, current_user.id).await?))
}

/// GET /api/tasks/:id
pub async fn get_by_id(State(state): State<ServerState>, Path(id): Path<i64>) -> AppResult<Json<Task>> {
    Ok(Json(require(&state, id).await?))
}

/// POST /api/tasks
pub async fn create(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(payload): Json<TaskCreate>,
) -> AppResult<Json<Task>> {
    validate_dto(&payload)?;
    validate_required_text(&payload.title, "title")?;
    let t = task::create(&state.pool, payload, current_user.id).await?;
    state
        .audit
        .log(
            AuditAction::Created,
            RESOURCE,
            t.id,
            Some(&current_user),
            create_snapshot(&t, RESOURCE),
        )
        .await;
    Ok(Json(t))
}

/// PUT /api/tasks/:id
pub async fn update(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(payload): Json<TaskUpdate>,
) -> AppResult<Json<Task>> {
    validate_dto(&payload)?;
    validate_optional_required_text(&payload.title, "title")?;
    let old = require(&state, id).await?;
    let t = task::update(&state.pool, id, payload)
        .await
        .map_err(|e| e.or_code(ErrorCode::TaskNotFound))?;
    state
        .audit
        .log(
            AuditAction::Updated,
            RESOURCE,
            id,
            Some(&current_user),
            create_diff(&old, &t, RESOURCE),
        )
        .await;
    Ok(Json(t))
}

/// PUT /api/tasks/:id/status
pub async fn set_status(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(payload): Json<TaskStatusUpdate>,
) -> AppResult<Json<Task>> {
    let (prev, t) = task::set_status(&state.pool, id, payload.status)
        .await
        .map_err(|e| e.or_code(ErrorCode::TaskNotFound))?;
    if prev != t.status {
        state
            .audit
            .log(
                AuditAction::StatusChanged,
                RESOURCE,
                id,
                Some(&current_user),
                json!({ "from": prev, "to": t.status }),
            )
            .await;
    }
    Ok(Json(t))
}

/// DELETE /api/tasks/:id
pub async fn delete(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<bool>> {
    let old = require(&state, id).await?;
    let deleted = task::delete(&state.pool, id).await?;
    if deleted {
        state
            .audit
            .log(
                AuditAction::Deleted,
                RESOURCE,
                id,
                Some(&current_user),
                json!({ "title": old.title }),
            )
            .await;
    }
    Ok(Json(deleted))
}

/// POST /api/tasks/bulk-delete
pub async fn bulk_delete(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(payload): Json<BulkDeleteRequest>,
) -> AppResult<Json<BulkDeleteResult>> {
    let deleted = task::delete_many(&state.pool, &payload.ids).await?;
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

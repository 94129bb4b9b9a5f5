//! Tag API Handlers

use axum::{
    Json,
    extract::{Extension, Path, Query, State},
};

use crate::audit::{AuditAction, create_delete_details, create_diff, create_snapshot};
use crate::auth::CurrentUser;
use crate::core::ServerState;
use crate::db::repository::tag;
use crate::utils::validation::{validate_dto, validate_optional_required_text, validate_required_text};
use crate::utils::{AppError, AppResult, ErrorCode};
use shared::models::{Tag, TagCreate, TagUpdate, is_hex_color};
use shared::query::{ListQuery, Page};

const RESOURCE: &str = "tag";

fn check_color(color: Option<&str>) -> AppResult<()> {
    if let Some(c) = color
        && !is_hex_color(c)
    {
        return Err(AppError::with_message(
            ErrorCode::InvalidFormat,
            format!("color must be #RRGGBB, got '{c}'"),
        )
        .with_detail("field", "color"));
    }
    Ok(())
}

async fn require(state: &ServerState, id: i64) -> AppResult<Tag> {
    tag::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::with_message(ErrorCode::TagNotFound, format!("Tag {id} not found")))
}

/// GET /api/tags
pub async fn list(
    State(state): State<ServerState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Page<Tag>>> {
    Ok(Json(tag::list(&state.pool, &query).await?))
}

/// GET /api/tags/:id
pub async fn get_by_id(State(state): State<ServerState>, Path(id): Path<i64>) -> AppResult<Json<Tag>> {
    Ok(Json(require(&state, id).await?))
}

/// POST /api/tags
pub async fn create(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(payload): Json<TagCreate>,
) -> AppResult<Json<Tag>> {
    validate_dto(&payload)?;
    validate_required_text(&payload.name, "name")?;
    check_color(payload.color.as_deref())?;
    let name = payload.name.trim().to_string();

    let t = tag::create(&state.pool, payload)
        .await
        .map_err(|e| e.on_duplicate(ErrorCode::TagNameExists, format!("Tag '{name}' already exists")))?;
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

/// PUT /api/tags/:id
pub async fn update(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(payload): Json<TagUpdate>,
) -> AppResult<Json<Tag>> {
    validate_dto(&payload)?;
    validate_optional_required_text(&payload.name, "name")?;
    check_color(payload.color.as_deref())?;

    let old = require(&state, id).await?;
    let t = tag::update(&state.pool, id, payload)
        .await
        .map_err(|e| e.on_duplicate(ErrorCode::TagNameExists, "Tag name already exists"))?;
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

/// DELETE /api/tags/:id - detaches the tag from every patient
pub async fn delete(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<bool>> {
    let old = require(&state, id).await?;
    let deleted = tag::delete(&state.pool, id).await?;
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

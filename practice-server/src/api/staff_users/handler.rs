//! Staff User API Handlers

use axum::{
    Json,
    extract::{Extension, Path, Query, State},
};

use crate::audit::{AuditAction, create_diff, create_snapshot};
use crate::auth::{CurrentUser, hash_password};
use crate::core::ServerState;
use crate::db::repository::staff_user;
use crate::utils::validation::{validate_dto, validate_optional_required_text};
use crate::utils::{AppError, AppResult, ErrorCode};
use shared::models::{Role, StaffUser, StaffUserCreate, StaffUserUpdate, is_valid_username};
use shared::query::{ListQuery, Page};

const RESOURCE: &str = "staff_user";

/// GET /api/staff-users
pub async fn list(
    State(state): State<ServerState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Page<StaffUser>>> {
    Ok(Json(staff_user::list(&state.pool, &query).await?))
}

/// GET /api/staff-users/:id
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<StaffUser>> {
    let user = staff_user::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::with_message(ErrorCode::UserNotFound, format!("User {id} not found")))?;
    Ok(Json(user))
}

/// POST /api/staff-users
pub async fn create(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(payload): Json<StaffUserCreate>,
) -> AppResult<Json<StaffUser>> {
    validate_dto(&payload)?;
    let username = payload.username.trim().to_lowercase();
    if !is_valid_username(&username) {
        return Err(AppError::validation(
            "username must be 3-64 characters of a-z, 0-9, '.', '_' or '-'",
        )
        .with_detail("field", "username"));
    }

    let hash = hash_password(&payload.password)?;
    let user = staff_user::create(
        &state.pool,
        &username,
        payload.display_name.trim(),
        &hash,
        payload.role,
    )
    .await
    .map_err(|e| e.on_duplicate(ErrorCode::UsernameExists, format!("Username '{username}' is taken")))?;

    state
        .audit
        .log(
            AuditAction::Created,
            RESOURCE,
            user.id,
            Some(&current_user),
            create_snapshot(&user, RESOURCE),
        )
        .await;
    Ok(Json(user))
}

/// Refuse changes that would lock the practice out of administration
async fn guard_admin_change(
    state: &ServerState,
    current_user: &CurrentUser,
    target: &StaffUser,
    next_role: Option<Role>,
    next_active: Option<bool>,
) -> AppResult<()> {
    let deactivating = next_active == Some(false) && target.is_active;
    if deactivating && target.id == current_user.id {
        return Err(AppError::with_message(
            ErrorCode::CannotModifySelf,
            "You cannot deactivate your own account",
        ));
    }
    let demoting = next_role.is_some_and(|r| r != Role::Admin);
    if target.role == Role::Admin
        && target.is_active
        && (deactivating || demoting)
        && staff_user::count_active_admins(&state.pool).await? <= 1
    {
        return Err(AppError::new(ErrorCode::LastAdminRequired));
    }
    Ok(())
}

/// PUT /api/staff-users/:id
pub async fn update(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(payload): Json<StaffUserUpdate>,
) -> AppResult<Json<StaffUser>> {
    validate_dto(&payload)?;
    validate_optional_required_text(&payload.display_name, "display_name")?;

    let old = staff_user::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::with_message(ErrorCode::UserNotFound, format!("User {id} not found")))?;
    guard_admin_change(&state, &current_user, &old, payload.role, payload.is_active).await?;

    let hash = payload.password.as_deref().map(hash_password).transpose()?;
    let user = staff_user::update(
        &state.pool,
        id,
        payload.display_name.as_deref().map(str::trim),
        payload.role,
        payload.is_active,
        hash.as_deref(),
    )
    .await
    .map_err(|e| e.or_code(ErrorCode::UserNotFound))?;

    let mut details = create_diff(&old, &user, RESOURCE);
    if hash.is_some()
        && let Some(obj) = details.as_object_mut()
    {
        obj.insert("password_reset".into(), serde_json::Value::Bool(true));
    }
    state
        .audit
        .log(AuditAction::Updated, RESOURCE, id, Some(&current_user), details)
        .await;
    Ok(Json(user))
}

/// DELETE /api/staff-users/:id - deactivate; accounts are never removed
pub async fn deactivate(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<StaffUser>> {
    let old = staff_user::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::with_message(ErrorCode::UserNotFound, format!("User {id} not found")))?;
    guard_admin_change(&state, &current_user, &old, None, Some(false)).await?;

    let user = staff_user::update(&state.pool, id, None, None, Some(false), None).await?;
    state
        .audit
        .log(
            AuditAction::Archived,
            RESOURCE,
            id,
            Some(&current_user),
            serde_json::json!({ "username": user.username }),
        )
        .await;
    Ok(Json(user))
}

//! Authentication Handlers
//!
//! Login, current user and password change.

use std::time::Duration;

use axum::{Extension, Json, extract::State};
use serde_json::json;

use crate::audit::AuditAction;
use crate::auth::{CurrentUser, hash_password, permissions_for, verify_password};
use crate::core::ServerState;
use crate::db::repository::staff_user;
use crate::utils::validation::validate_dto;
use crate::utils::{AppError, AppResult, ErrorCode};
use shared::client::{ChangePasswordRequest, LoginRequest, LoginResponse, UserInfo};

/// Fixed delay applied to every login attempt before the outcome is known
const AUTH_FIXED_DELAY_MS: u64 = 300;

/// POST /api/auth/login
///
/// Unknown user, wrong password and disabled account all answer with the
/// same `InvalidCredentials` error.
pub async fn login(
    State(state): State<ServerState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let username = req.username.trim().to_lowercase();
    let user = staff_user::find_by_username(&state.pool, &username).await?;

    tokio::time::sleep(Duration::from_millis(AUTH_FIXED_DELAY_MS)).await;

    let reason = match &user {
        None => Some("user_not_found"),
        Some(u) if !u.is_active => Some("account_disabled"),
        Some(u) if !verify_password(&req.password, &u.hash_pass) => Some("invalid_password"),
        Some(_) => None,
    };
    let user = match (user, reason) {
        (Some(user), None) => user,
        (_, reason) => {
            state
                .audit
                .log_as(
                    AuditAction::LoginFailed,
                    "auth",
                    &username,
                    None,
                    None,
                    json!({ "reason": reason }),
                )
                .await;
            tracing::warn!(username = %username, reason = ?reason, "Login failed");
            return Err(AppError::invalid_credentials());
        }
    };

    let permissions = permissions_for(user.role);
    let jwt = state.get_jwt_service();
    let token = jwt
        .generate_token(
            user.id,
            &user.username,
            &user.display_name,
            user.role,
            &permissions,
        )
        .map_err(|e| AppError::internal(format!("Failed to generate token: {e}")))?;

    state
        .audit
        .log_as(
            AuditAction::LoginSuccess,
            "auth",
            user.id,
            Some(user.id),
            Some(&user.display_name),
            json!({ "username": user.username }),
        )
        .await;
    tracing::info!(user_id = user.id, username = %user.username, role = %user.role.as_str(), "User logged in");

    Ok(Json(LoginResponse {
        token,
        expires_in: jwt.expires_in_seconds(),
        user: UserInfo {
            id: user.id,
            username: user.username,
            display_name: user.display_name,
            role: user.role,
            permissions,
        },
    }))
}

/// GET /api/auth/me
pub async fn me(Extension(user): Extension<CurrentUser>) -> Json<UserInfo> {
    Json(UserInfo {
        id: user.id,
        username: user.username,
        display_name: user.display_name,
        role: user.role,
        permissions: user.permissions,
    })
}

/// POST /api/auth/change-password
pub async fn change_password(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<ChangePasswordRequest>,
) -> AppResult<Json<bool>> {
    validate_dto(&req)?;
    let user = staff_user::find_by_id(&state.pool, current_user.id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound))?;
    if !verify_password(&req.current_password, &user.hash_pass) {
        return Err(AppError::invalid_credentials());
    }

    let hash = hash_password(&req.new_password)?;
    staff_user::update(&state.pool, user.id, None, None, None, Some(&hash)).await?;

    state
        .audit
        .log(
            AuditAction::PasswordChanged,
            "staff_user",
            user.id,
            Some(&current_user),
            json!({ "username": user.username }),
        )
        .await;
    Ok(Json(true))
}

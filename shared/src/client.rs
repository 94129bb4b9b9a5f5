//! Client-related types shared between server and client
//!
//! Common request/response types used in API communication.

use crate::models::Role;
use serde::{Deserialize, Serialize};
use validator::Validate;

// =============================================================================
// Auth API DTOs
// =============================================================================

/// Login request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Login response data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    /// Token lifetime in seconds
    pub expires_in: i64,
    pub user: UserInfo,
}

/// User information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub role: Role,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Change own password
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    #[validate(length(min = 8, max = 128, message = "password must be at least 8 characters"))]
    pub new_password: String,
}

// =============================================================================
// Health
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "ok" or "degraded"
    pub status: String,
    pub version: String,
    pub database: bool,
}

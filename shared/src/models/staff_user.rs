//! Staff User Model

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Staff role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "snake_case"))]
pub enum Role {
    Admin,
    Clinician,
    FrontDesk,
    Billing,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Clinician => "clinician",
            Self::FrontDesk => "front_desk",
            Self::Billing => "billing",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "clinician" => Ok(Self::Clinician),
            "front_desk" => Ok(Self::FrontDesk),
            "billing" => Ok(Self::Billing),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Staff user (password hash is never serialized)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct StaffUser {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub role: Role,
    pub is_active: bool,
    #[serde(skip_serializing, default)]
    pub hash_pass: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Create staff user payload
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StaffUserCreate {
    #[validate(length(min = 3, max = 64))]
    pub username: String,
    #[validate(length(min = 1, max = 200))]
    pub display_name: String,
    #[validate(length(min = 8, max = 128, message = "password must be at least 8 characters"))]
    pub password: String,
    pub role: Role,
}

/// Update staff user payload
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct StaffUserUpdate {
    #[validate(length(min = 1, max = 200))]
    pub display_name: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
    /// Administrative password reset
    #[validate(length(min = 8, max = 128, message = "password must be at least 8 characters"))]
    pub password: Option<String>,
}

/// Usernames: lowercase letters, digits, `.`, `_`, `-`
pub fn is_valid_username(username: &str) -> bool {
    (3..=64).contains(&username.len())
        && username
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_rules() {
        assert!(is_valid_username("dr.smith"));
        assert!(is_valid_username("front_desk-2"));
        assert!(!is_valid_username("ab"));
        assert!(!is_valid_username("Dr.Smith"));
        assert!(!is_valid_username("john doe"));
    }

    #[test]
    fn hash_is_not_serialized() {
        let user = StaffUser {
            id: 1,
            username: "admin".into(),
            display_name: "Admin".into(),
            role: Role::Admin,
            is_active: true,
            hash_pass: "$argon2id$secret".into(),
            created_at: 0,
            updated_at: 0,
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("hash_pass"));
        assert!(!json.contains("argon2"));
        assert!(json.contains("\"role\":\"admin\""));
    }

    #[test]
    fn role_serde() {
        let role: Role = serde_json::from_str("\"front_desk\"").unwrap();
        assert_eq!(role, Role::FrontDesk);
        assert_eq!(role.to_string(), "front_desk");
        assert_eq!("billing".parse::<Role>(), Ok(Role::Billing));
        assert!("manager".parse::<Role>().is_err());
    }
}

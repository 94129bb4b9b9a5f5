//! Provider Model

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Care provider (clinician on the schedule)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Provider {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub credentials: Option<String>,
    pub specialty: Option<String>,
    pub npi: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ProviderCreate {
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    #[validate(length(max = 100))]
    pub credentials: Option<String>,
    #[validate(length(max = 200))]
    pub specialty: Option<String>,
    pub npi: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 100))]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ProviderUpdate {
    #[validate(length(min = 1, max = 100))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub last_name: Option<String>,
    #[validate(length(max = 100))]
    pub credentials: Option<String>,
    #[validate(length(max = 200))]
    pub specialty: Option<String>,
    pub npi: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 100))]
    pub phone: Option<String>,
    pub is_active: Option<bool>,
}

/// National Provider Identifier: exactly 10 digits
pub fn is_valid_npi(npi: &str) -> bool {
    npi.len() == 10 && npi.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn npi_format() {
        assert!(is_valid_npi("1234567890"));
        assert!(!is_valid_npi("123456789"));
        assert!(!is_valid_npi("12345678901"));
        assert!(!is_valid_npi("12345abcde"));
    }
}

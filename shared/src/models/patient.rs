//! Patient Model

use super::insurance::InsuranceRecord;
use super::tag::Tag;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "snake_case"))]
pub enum Gender {
    Female,
    Male,
    Other,
    #[default]
    Unknown,
}

/// Patient entity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Patient {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    /// YYYY-MM-DD
    pub date_of_birth: Option<String>,
    pub gender: Gender,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub notes: Option<String>,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
    #[cfg_attr(feature = "db", sqlx(skip))]
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl Patient {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Patient with insurance records (detail view)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientDetail {
    #[serde(flatten)]
    pub patient: Patient,
    pub insurance: Vec<InsuranceRecord>,
}

/// Create patient payload
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PatientCreate {
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    pub date_of_birth: Option<String>,
    pub gender: Option<Gender>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 100))]
    pub phone: Option<String>,
    #[validate(length(max = 500))]
    pub address: Option<String>,
    #[validate(length(max = 100))]
    pub city: Option<String>,
    #[validate(length(max = 100))]
    pub state: Option<String>,
    #[validate(length(max = 20))]
    pub postal_code: Option<String>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    #[serde(default)]
    pub tag_ids: Vec<i64>,
}

/// Update patient payload
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct PatientUpdate {
    #[validate(length(min = 1, max = 100))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub last_name: Option<String>,
    pub date_of_birth: Option<String>,
    pub gender: Option<Gender>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 100))]
    pub phone: Option<String>,
    #[validate(length(max = 500))]
    pub address: Option<String>,
    #[validate(length(max = 100))]
    pub city: Option<String>,
    #[validate(length(max = 100))]
    pub state: Option<String>,
    #[validate(length(max = 20))]
    pub postal_code: Option<String>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    pub is_active: Option<bool>,
}

/// Patient list filters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientFilter {
    pub is_active: Option<bool>,
    pub tag_id: Option<i64>,
}

/// Replace a patient's tags
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetTags {
    pub tag_ids: Vec<i64>,
}

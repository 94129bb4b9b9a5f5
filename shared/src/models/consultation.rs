//! Consultation Model (SOAP note)

use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "snake_case"))]
pub enum ConsultationStatus {
    Draft,
    /// Immutable
    Signed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Consultation {
    pub id: i64,
    pub patient_id: i64,
    pub provider_id: i64,
    pub session_id: Option<i64>,
    pub consulted_at: i64,
    pub chief_complaint: String,
    pub subjective: Option<String>,
    pub objective: Option<String>,
    pub assessment: Option<String>,
    pub plan: Option<String>,
    pub status: ConsultationStatus,
    pub signed_at: Option<i64>,
    pub signed_by: Option<i64>,
    pub created_by: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ConsultationCreate {
    pub patient_id: i64,
    pub provider_id: i64,
    pub session_id: Option<i64>,
    /// Defaults to now
    pub consulted_at: Option<i64>,
    #[validate(length(min = 1, max = 500))]
    pub chief_complaint: String,
    #[validate(length(max = 10000))]
    pub subjective: Option<String>,
    #[validate(length(max = 10000))]
    pub objective: Option<String>,
    #[validate(length(max = 10000))]
    pub assessment: Option<String>,
    #[validate(length(max = 10000))]
    pub plan: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ConsultationUpdate {
    pub consulted_at: Option<i64>,
    #[validate(length(min = 1, max = 500))]
    pub chief_complaint: Option<String>,
    #[validate(length(max = 10000))]
    pub subjective: Option<String>,
    #[validate(length(max = 10000))]
    pub objective: Option<String>,
    #[validate(length(max = 10000))]
    pub assessment: Option<String>,
    #[validate(length(max = 10000))]
    pub plan: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsultationFilter {
    pub patient_id: Option<i64>,
    pub provider_id: Option<i64>,
    pub status: Option<ConsultationStatus>,
}

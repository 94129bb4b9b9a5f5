//! Insurance Record Model

use crate::util::parse_date;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Policy holder's relationship to the patient
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "snake_case"))]
pub enum HolderRelationship {
    /// The patient holds the policy
    #[default]
    #[serde(rename = "self")]
    #[cfg_attr(feature = "db", sqlx(rename = "self"))]
    Holder,
    Spouse,
    Child,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct InsuranceRecord {
    pub id: i64,
    pub patient_id: i64,
    pub carrier: String,
    pub plan_name: Option<String>,
    pub policy_number: String,
    pub group_number: Option<String>,
    pub holder_name: Option<String>,
    pub holder_relationship: HolderRelationship,
    /// Share of the (discounted) bill covered, 0-100
    pub coverage_percent: f64,
    pub valid_from: Option<String>,
    pub valid_until: Option<String>,
    pub is_primary: bool,
    pub is_active: bool,
    pub notes: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl InsuranceRecord {
    /// Active and within the validity window (bounds inclusive)
    pub fn covers(&self, date: NaiveDate) -> bool {
        if !self.is_active {
            return false;
        }
        let from = self.valid_from.as_deref().and_then(parse_date);
        let until = self.valid_until.as_deref().and_then(parse_date);
        from.is_none_or(|d| date >= d) && until.is_none_or(|d| date <= d)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct InsuranceCreate {
    pub patient_id: i64,
    #[validate(length(min = 1, max = 200))]
    pub carrier: String,
    #[validate(length(max = 200))]
    pub plan_name: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub policy_number: String,
    #[validate(length(max = 100))]
    pub group_number: Option<String>,
    #[validate(length(max = 200))]
    pub holder_name: Option<String>,
    pub holder_relationship: Option<HolderRelationship>,
    #[validate(range(min = 0.0, max = 100.0))]
    pub coverage_percent: f64,
    pub valid_from: Option<String>,
    pub valid_until: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct InsuranceUpdate {
    #[validate(length(min = 1, max = 200))]
    pub carrier: Option<String>,
    #[validate(length(max = 200))]
    pub plan_name: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub policy_number: Option<String>,
    #[validate(length(max = 100))]
    pub group_number: Option<String>,
    #[validate(length(max = 200))]
    pub holder_name: Option<String>,
    pub holder_relationship: Option<HolderRelationship>,
    #[validate(range(min = 0.0, max = 100.0))]
    pub coverage_percent: Option<f64>,
    pub valid_from: Option<String>,
    pub valid_until: Option<String>,
    pub is_primary: Option<bool>,
    pub is_active: Option<bool>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InsuranceFilter {
    pub patient_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> InsuranceRecord {
        InsuranceRecord {
            id: 1,
            patient_id: 1,
            carrier: "Acme Health".into(),
            plan_name: None,
            policy_number: "P-1".into(),
            group_number: None,
            holder_name: None,
            holder_relationship: HolderRelationship::Holder,
            coverage_percent: 80.0,
            valid_from: Some("2024-01-01".into()),
            valid_until: Some("2024-12-31".into()),
            is_primary: true,
            is_active: true,
            notes: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn covers_window() {
        let r = record();
        assert!(r.covers(parse_date("2024-01-01").unwrap()));
        assert!(r.covers(parse_date("2024-12-31").unwrap()));
        assert!(!r.covers(parse_date("2025-01-01").unwrap()));
        assert!(!r.covers(parse_date("2023-12-31").unwrap()));
    }

    #[test]
    fn inactive_covers_nothing() {
        let mut r = record();
        r.is_active = false;
        assert!(!r.covers(parse_date("2024-06-01").unwrap()));
    }

    #[test]
    fn relationship_serde() {
        let json = serde_json::to_string(&HolderRelationship::Holder).unwrap();
        assert_eq!(json, "\"self\"");
        let rel: HolderRelationship = serde_json::from_str("\"spouse\"").unwrap();
        assert_eq!(rel, HolderRelationship::Spouse);
    }
}

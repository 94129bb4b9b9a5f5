//! Catalog Service Model

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Billable catalog service (consultation, procedure, test...)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct CatalogService {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub description: Option<String>,
    pub price: f64,
    pub duration_minutes: i64,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CatalogServiceCreate {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, max = 32))]
    pub code: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(range(min = 0.0, max = 1_000_000.0))]
    pub price: f64,
    #[validate(range(min = 5, max = 480))]
    pub duration_minutes: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CatalogServiceUpdate {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 32))]
    pub code: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(range(min = 0.0, max = 1_000_000.0))]
    pub price: Option<f64>,
    #[validate(range(min = 5, max = 480))]
    pub duration_minutes: Option<i64>,
    pub is_active: Option<bool>,
}

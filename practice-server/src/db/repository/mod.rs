//! Repository Module
//!
//! Free async functions over a `SqlitePool`, one module per table group.
//! Listing goes through [`list::fetch_page`].

// Staff
pub mod staff_user;

// Patients
pub mod insurance;
pub mod patient;
pub mod tag;

// Catalog
pub mod discount;
pub mod pharmacy;
pub mod provider;
pub mod service;

// Orders & billing
pub mod invoice;
pub mod order;

// Scheduling & clinical
pub mod consultation;
pub mod session;

// Work
pub mod task;
pub mod ticket;

// Forms
pub mod form;

// Reporting
pub mod dashboard;

// Shared helpers
pub mod list;
pub mod sequence;

use shared::error::{AppError, ErrorCode};
use thiserror::Error;

/// Repository error types
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Domain rule violation with a specific error code
    #[error("{1}")]
    Business(ErrorCode, String),
}

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RepoError::Duplicate(db.message().to_string())
            }
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                RepoError::Validation("referenced record does not exist".to_string())
            }
            sqlx::Error::RowNotFound => RepoError::NotFound("row not found".to_string()),
            _ => RepoError::Database(err.to_string()),
        }
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(msg) => AppError::with_message(ErrorCode::NotFound, msg),
            RepoError::Duplicate(msg) => AppError::with_message(ErrorCode::AlreadyExists, msg),
            RepoError::Validation(msg) => AppError::validation(msg),
            RepoError::Conflict(msg) => AppError::conflict(msg),
            RepoError::Business(code, msg) => AppError::with_message(code, msg),
            RepoError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                AppError::database("Database operation failed")
            }
        }
    }
}

/// Result type for repository operations
pub type RepoResult<T> = Result<T, RepoError>;

impl RepoError {
    /// Map `NotFound` to a resource-specific code
    pub fn or_code(self, not_found: ErrorCode) -> AppError {
        match self {
            RepoError::NotFound(msg) => AppError::with_message(not_found, msg),
            other => other.into(),
        }
    }

    /// Map `Duplicate` to a resource-specific code and message
    pub fn on_duplicate(self, code: ErrorCode, message: impl Into<String>) -> AppError {
        match self {
            RepoError::Duplicate(_) => AppError::with_message(code, message),
            other => other.into(),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! In-memory database and seed rows for repository tests

    use crate::db::DbService;
    use shared::models::*;
    use sqlx::SqlitePool;

    pub async fn pool() -> SqlitePool {
        DbService::in_memory()
            .await
            .expect("in-memory database")
            .pool
    }

    pub async fn patient(pool: &SqlitePool, first: &str, last: &str) -> Patient {
        super::patient::create(
            pool,
            PatientCreate {
                first_name: first.into(),
                last_name: last.into(),
                date_of_birth: Some("1980-04-12".into()),
                gender: Some(Gender::Female),
                email: None,
                phone: None,
                address: None,
                city: None,
                state: None,
                postal_code: None,
                notes: None,
                tag_ids: vec![],
            },
        )
        .await
        .expect("seed patient")
    }

    pub async fn provider(pool: &SqlitePool, last: &str) -> Provider {
        super::provider::create(
            pool,
            ProviderCreate {
                first_name: "Dana".into(),
                last_name: last.into(),
                credentials: Some("MD".into()),
                specialty: None,
                npi: None,
                email: None,
                phone: None,
            },
        )
        .await
        .expect("seed provider")
    }

    pub async fn service(pool: &SqlitePool, code: &str, price: f64) -> CatalogService {
        super::service::create(
            pool,
            CatalogServiceCreate {
                name: format!("Service {code}"),
                code: code.into(),
                description: None,
                price,
                duration_minutes: 30,
            },
        )
        .await
        .expect("seed service")
    }

    pub async fn staff(pool: &SqlitePool, username: &str, role: Role) -> StaffUser {
        super::staff_user::create(pool, username, username, "$argon2id$test", role)
            .await
            .expect("seed staff user")
    }
}

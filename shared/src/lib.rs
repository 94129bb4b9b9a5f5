//! Shared types for the practice server
//!
//! Models and DTOs, error codes, list/page types, money arithmetic and
//! small utilities used by the server and its API clients.

pub mod client;
pub mod error;
pub mod models;
pub mod money;
pub mod query;
pub mod util;

// Re-exports
pub use axum::Json;
pub use error::{ApiResponse, AppError, AppResult, ErrorCode};
pub use http;
pub use query::{BulkDeleteRequest, BulkDeleteResult, ListQuery, Page, SortOrder};
pub use serde::{Deserialize, Serialize};

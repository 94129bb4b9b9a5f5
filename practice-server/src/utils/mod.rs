//! Utilities - shared error types, logging and input validation
//!
//! - [`AppError`] - application error (from shared::error)
//! - [`ApiResponse`] - API error body (from shared::error)

pub mod logger;
pub mod validation;

pub use shared::error::{ApiResponse, AppError, AppResult, ErrorCategory, ErrorCode};

//! Input validation helpers
//!
//! DTOs carry `validator` derives for per-field limits; these helpers cover
//! what derives cannot express: blank strings, calendar dates and cross-field
//! rules that return a plain message.

use crate::utils::{AppError, AppResult, ErrorCode};
use shared::util::parse_date;
use validator::Validate;

/// Passwords (before hashing)
pub const MIN_PASSWORD_LEN: usize = 8;

/// Run `validator` derives and convert failures to a field-listing error
pub fn validate_dto<T: Validate>(dto: &T) -> AppResult<()> {
    dto.validate().map_err(AppError::from)
}

/// Validate that a required string is non-empty after trimming.
pub fn validate_required_text(value: &str, field: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::validation(format!("{field} must not be empty")).with_detail("field", field));
    }
    Ok(())
}

/// Same as [`validate_required_text`] for optional update fields.
pub fn validate_optional_required_text(value: &Option<String>, field: &str) -> AppResult<()> {
    match value {
        Some(v) => validate_required_text(v, field),
        None => Ok(()),
    }
}

/// Validate an optional `YYYY-MM-DD` date.
pub fn validate_date(value: Option<&str>, field: &str) -> AppResult<()> {
    if let Some(v) = value
        && parse_date(v).is_none()
    {
        return Err(AppError::with_message(
            ErrorCode::InvalidFormat,
            format!("{field} must be a date (YYYY-MM-DD), got '{v}'"),
        )
        .with_detail("field", field));
    }
    Ok(())
}

/// Validate an optional date that must not lie after `today`.
pub fn validate_past_date(value: Option<&str>, field: &str, today: chrono::NaiveDate) -> AppResult<()> {
    validate_date(value, field)?;
    if let Some(date) = value.and_then(parse_date)
        && date > today
    {
        return Err(AppError::with_message(
            ErrorCode::ValueOutOfRange,
            format!("{field} cannot be in the future"),
        )
        .with_detail("field", field));
    }
    Ok(())
}

/// Map a cross-field rule failure to an error with the given code.
pub fn check_rule(result: Result<(), String>, code: ErrorCode) -> AppResult<()> {
    result.map_err(|msg| AppError::with_message(code, msg))
}

/// Normalize optional text: trim, and treat blank as absent.
pub fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

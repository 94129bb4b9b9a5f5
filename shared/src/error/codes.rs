//! Unified error codes for the practice server
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 1xxx: Authentication errors
//! - 2xxx: Permission errors
//! - 3xxx: Patient & clinical errors
//! - 4xxx: Order errors
//! - 5xxx: Billing errors
//! - 6xxx: Catalog errors
//! - 7xxx: Scheduling errors
//! - 8xxx: Staff, task and ticket errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values for efficient serialization
/// and cross-language compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Resource already exists
    AlreadyExists = 4,
    /// Invalid request
    InvalidRequest = 5,
    /// Invalid format
    InvalidFormat = 6,
    /// Required field missing
    RequiredField = 7,
    /// Value out of range
    ValueOutOfRange = 8,

    // ==================== 1xxx: Auth ====================
    /// User is not authenticated
    NotAuthenticated = 1001,
    /// Invalid credentials (username/password)
    InvalidCredentials = 1002,
    /// Token has expired
    TokenExpired = 1003,
    /// Token is invalid
    TokenInvalid = 1004,
    /// Account is disabled
    AccountDisabled = 1005,
    /// Too many login attempts
    TooManyAttempts = 1006,
    /// Password too short
    PasswordTooShort = 1007,

    // ==================== 2xxx: Permission ====================
    /// Permission denied
    PermissionDenied = 2001,
    /// Admin role required
    AdminRequired = 2002,
    /// Cannot deactivate or demote own account
    CannotModifySelf = 2003,
    /// Operation would leave no active administrator
    LastAdminRequired = 2004,

    // ==================== 3xxx: Patient & clinical ====================
    /// Patient not found
    PatientNotFound = 3001,
    /// Patient is archived
    PatientArchived = 3002,
    /// Insurance record not found
    InsuranceNotFound = 3101,
    /// Insurance record does not cover the date
    InsuranceNotValid = 3102,
    /// Consultation not found
    ConsultationNotFound = 3201,
    /// Consultation is signed and can no longer change
    ConsultationSigned = 3202,
    /// Form template not found
    FormTemplateNotFound = 3301,
    /// Form field not found
    FormFieldNotFound = 3302,
    /// Form field key already used in template
    FormFieldKeyExists = 3303,
    /// Form template has submissions
    FormHasSubmissions = 3304,
    /// Form submission failed validation
    FormSubmissionInvalid = 3305,
    /// Form template is inactive
    FormTemplateInactive = 3306,
    /// Form submission not found
    FormSubmissionNotFound = 3307,

    // ==================== 4xxx: Order ====================
    /// Order not found
    OrderNotFound = 4001,
    /// Order status transition not allowed
    OrderInvalidTransition = 4002,
    /// Order can no longer be edited
    OrderNotEditable = 4003,
    /// Order has no items
    OrderEmpty = 4004,
    /// Order is cancelled
    OrderCancelled = 4005,

    // ==================== 5xxx: Billing ====================
    /// Invoice not found
    InvoiceNotFound = 5001,
    /// Invoice status transition not allowed
    InvoiceInvalidTransition = 5002,
    /// Invoice can no longer be edited
    InvoiceNotEditable = 5003,
    /// Payment exceeds invoice balance
    PaymentExceedsBalance = 5004,
    /// Invalid monetary amount
    InvalidAmount = 5005,
    /// Discount not found
    DiscountNotFound = 5101,
    /// Discount definition is invalid
    DiscountInvalid = 5102,
    /// Discount code already exists
    DiscountCodeExists = 5103,

    // ==================== 6xxx: Catalog ====================
    /// Service not found
    ServiceNotFound = 6001,
    /// Service is referenced by orders
    ServiceInUse = 6002,
    /// Service code already exists
    ServiceCodeExists = 6003,
    /// Provider not found
    ProviderNotFound = 6101,
    /// Provider has scheduled sessions
    ProviderInUse = 6102,
    /// Pharmacy not found
    PharmacyNotFound = 6201,
    /// Pharmacy is referenced by orders
    PharmacyInUse = 6202,
    /// Tag not found
    TagNotFound = 6301,
    /// Tag name already exists
    TagNameExists = 6302,

    // ==================== 7xxx: Scheduling ====================
    /// Session not found
    SessionNotFound = 7001,
    /// Session overlaps another session
    SessionConflict = 7002,
    /// Session time range is invalid
    SessionInvalidTime = 7003,
    /// Session status transition not allowed
    SessionInvalidTransition = 7004,

    // ==================== 8xxx: Staff ====================
    /// User not found
    UserNotFound = 8001,
    /// Username already exists
    UsernameExists = 8002,
    /// Task not found
    TaskNotFound = 8101,
    /// Ticket not found
    TicketNotFound = 8201,
    /// Ticket is closed
    TicketClosed = 8202,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Database error
    DatabaseError = 9002,
    /// Configuration error
    ConfigError = 9003,
    /// Operation timeout
    TimeoutError = 9004,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Get the developer-facing English message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::Unknown => "An unknown error occurred",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::AlreadyExists => "Resource already exists",
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::InvalidFormat => "Invalid format",
            ErrorCode::RequiredField => "Required field is missing",
            ErrorCode::ValueOutOfRange => "Value is out of range",

            // Auth
            ErrorCode::NotAuthenticated => "User is not authenticated",
            ErrorCode::InvalidCredentials => "Invalid username or password",
            ErrorCode::TokenExpired => "Authentication token has expired",
            ErrorCode::TokenInvalid => "Authentication token is invalid",
            ErrorCode::AccountDisabled => "Account is disabled",
            ErrorCode::TooManyAttempts => "Too many attempts, try again later",
            ErrorCode::PasswordTooShort => "Password must be at least 8 characters",

            // Permission
            ErrorCode::PermissionDenied => "Permission denied",
            ErrorCode::AdminRequired => "Administrator role is required",
            ErrorCode::CannotModifySelf => "Cannot deactivate or demote own account",
            ErrorCode::LastAdminRequired => "At least one active administrator is required",

            // Patient & clinical
            ErrorCode::PatientNotFound => "Patient not found",
            ErrorCode::PatientArchived => "Patient is archived",
            ErrorCode::InsuranceNotFound => "Insurance record not found",
            ErrorCode::InsuranceNotValid => "Insurance record does not cover this date",
            ErrorCode::ConsultationNotFound => "Consultation not found",
            ErrorCode::ConsultationSigned => "Consultation is signed and cannot be changed",
            ErrorCode::FormTemplateNotFound => "Form template not found",
            ErrorCode::FormFieldNotFound => "Form field not found",
            ErrorCode::FormFieldKeyExists => "Form field key already exists in template",
            ErrorCode::FormHasSubmissions => "Form template has submissions",
            ErrorCode::FormSubmissionInvalid => "Form submission is invalid",
            ErrorCode::FormTemplateInactive => "Form template is inactive",
            ErrorCode::FormSubmissionNotFound => "Form submission not found",

            // Order
            ErrorCode::OrderNotFound => "Order not found",
            ErrorCode::OrderInvalidTransition => "Order status transition is not allowed",
            ErrorCode::OrderNotEditable => "Order can no longer be edited",
            ErrorCode::OrderEmpty => "Order has no items",
            ErrorCode::OrderCancelled => "Order is cancelled",

            // Billing
            ErrorCode::InvoiceNotFound => "Invoice not found",
            ErrorCode::InvoiceInvalidTransition => "Invoice status transition is not allowed",
            ErrorCode::InvoiceNotEditable => "Invoice can no longer be edited",
            ErrorCode::PaymentExceedsBalance => "Payment exceeds invoice balance",
            ErrorCode::InvalidAmount => "Invalid amount",
            ErrorCode::DiscountNotFound => "Discount not found",
            ErrorCode::DiscountInvalid => "Discount definition is invalid",
            ErrorCode::DiscountCodeExists => "Discount code already exists",

            // Catalog
            ErrorCode::ServiceNotFound => "Service not found",
            ErrorCode::ServiceInUse => "Service is referenced by orders",
            ErrorCode::ServiceCodeExists => "Service code already exists",
            ErrorCode::ProviderNotFound => "Provider not found",
            ErrorCode::ProviderInUse => "Provider has scheduled sessions",
            ErrorCode::PharmacyNotFound => "Pharmacy not found",
            ErrorCode::PharmacyInUse => "Pharmacy is referenced by orders",
            ErrorCode::TagNotFound => "Tag not found",
            ErrorCode::TagNameExists => "Tag name already exists",

            // Scheduling
            ErrorCode::SessionNotFound => "Session not found",
            ErrorCode::SessionConflict => "Session overlaps an existing session",
            ErrorCode::SessionInvalidTime => "Session time range is invalid",
            ErrorCode::SessionInvalidTransition => "Session status transition is not allowed",

            // Staff
            ErrorCode::UserNotFound => "User not found",
            ErrorCode::UsernameExists => "Username already exists",
            ErrorCode::TaskNotFound => "Task not found",
            ErrorCode::TicketNotFound => "Ticket not found",
            ErrorCode::TicketClosed => "Ticket is closed",

            // System
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database error",
            ErrorCode::ConfigError => "Configuration error",
            ErrorCode::TimeoutError => "Operation timed out",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            1 => Ok(ErrorCode::Unknown),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),
            4 => Ok(ErrorCode::AlreadyExists),
            5 => Ok(ErrorCode::InvalidRequest),
            6 => Ok(ErrorCode::InvalidFormat),
            7 => Ok(ErrorCode::RequiredField),
            8 => Ok(ErrorCode::ValueOutOfRange),

            // Auth
            1001 => Ok(ErrorCode::NotAuthenticated),
            1002 => Ok(ErrorCode::InvalidCredentials),
            1003 => Ok(ErrorCode::TokenExpired),
            1004 => Ok(ErrorCode::TokenInvalid),
            1005 => Ok(ErrorCode::AccountDisabled),
            1006 => Ok(ErrorCode::TooManyAttempts),
            1007 => Ok(ErrorCode::PasswordTooShort),

            // Permission
            2001 => Ok(ErrorCode::PermissionDenied),
            2002 => Ok(ErrorCode::AdminRequired),
            2003 => Ok(ErrorCode::CannotModifySelf),
            2004 => Ok(ErrorCode::LastAdminRequired),

            // Patient & clinical
            3001 => Ok(ErrorCode::PatientNotFound),
            3002 => Ok(ErrorCode::PatientArchived),
            3101 => Ok(ErrorCode::InsuranceNotFound),
            3102 => Ok(ErrorCode::InsuranceNotValid),
            3201 => Ok(ErrorCode::ConsultationNotFound),
            3202 => Ok(ErrorCode::ConsultationSigned),
            3301 => Ok(ErrorCode::FormTemplateNotFound),
            3302 => Ok(ErrorCode::FormFieldNotFound),
            3303 => Ok(ErrorCode::FormFieldKeyExists),
            3304 => Ok(ErrorCode::FormHasSubmissions),
            3305 => Ok(ErrorCode::FormSubmissionInvalid),
            3306 => Ok(ErrorCode::FormTemplateInactive),
            3307 => Ok(ErrorCode::FormSubmissionNotFound),

            // Order
            4001 => Ok(ErrorCode::OrderNotFound),
            4002 => Ok(ErrorCode::OrderInvalidTransition),
            4003 => Ok(ErrorCode::OrderNotEditable),
            4004 => Ok(ErrorCode::OrderEmpty),
            4005 => Ok(ErrorCode::OrderCancelled),

            // Billing
            5001 => Ok(ErrorCode::InvoiceNotFound),
            5002 => Ok(ErrorCode::InvoiceInvalidTransition),
            5003 => Ok(ErrorCode::InvoiceNotEditable),
            5004 => Ok(ErrorCode::PaymentExceedsBalance),
            5005 => Ok(ErrorCode::InvalidAmount),
            5101 => Ok(ErrorCode::DiscountNotFound),
            5102 => Ok(ErrorCode::DiscountInvalid),
            5103 => Ok(ErrorCode::DiscountCodeExists),

            // Catalog
            6001 => Ok(ErrorCode::ServiceNotFound),
            6002 => Ok(ErrorCode::ServiceInUse),
            6003 => Ok(ErrorCode::ServiceCodeExists),
            6101 => Ok(ErrorCode::ProviderNotFound),
            6102 => Ok(ErrorCode::ProviderInUse),
            6201 => Ok(ErrorCode::PharmacyNotFound),
            6202 => Ok(ErrorCode::PharmacyInUse),
            6301 => Ok(ErrorCode::TagNotFound),
            6302 => Ok(ErrorCode::TagNameExists),

            // Scheduling
            7001 => Ok(ErrorCode::SessionNotFound),
            7002 => Ok(ErrorCode::SessionConflict),
            7003 => Ok(ErrorCode::SessionInvalidTime),
            7004 => Ok(ErrorCode::SessionInvalidTransition),

            // Staff
            8001 => Ok(ErrorCode::UserNotFound),
            8002 => Ok(ErrorCode::UsernameExists),
            8101 => Ok(ErrorCode::TaskNotFound),
            8201 => Ok(ErrorCode::TicketNotFound),
            8202 => Ok(ErrorCode::TicketClosed),

            // System
            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::DatabaseError),
            9003 => Ok(ErrorCode::ConfigError),
            9004 => Ok(ErrorCode::TimeoutError),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{:04}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_values() {
        assert_eq!(ErrorCode::Success.code(), 0);
        assert_eq!(ErrorCode::NotAuthenticated.code(), 1001);
        assert_eq!(ErrorCode::PatientNotFound.code(), 3001);
        assert_eq!(ErrorCode::SessionConflict.code(), 7002);
        assert_eq!(ErrorCode::InternalError.code(), 9001);
    }

    #[test]
    fn test_try_from_roundtrips_known_codes() {
        for code in [
            ErrorCode::ValidationFailed,
            ErrorCode::TokenExpired,
            ErrorCode::LastAdminRequired,
            ErrorCode::FormSubmissionNotFound,
            ErrorCode::OrderCancelled,
            ErrorCode::DiscountCodeExists,
            ErrorCode::TagNameExists,
            ErrorCode::SessionInvalidTransition,
            ErrorCode::TicketClosed,
            ErrorCode::TimeoutError,
        ] {
            assert_eq!(ErrorCode::try_from(code.code()), Ok(code));
        }
    }

    #[test]
    fn test_try_from_unknown_code() {
        assert_eq!(ErrorCode::try_from(4242), Err(InvalidErrorCode(4242)));
    }

    #[test]
    fn test_display() {
        assert_eq!(ErrorCode::NotFound.to_string(), "E0003");
        assert_eq!(ErrorCode::InvoiceNotFound.to_string(), "E5001");
    }

    #[test]
    fn test_serde_as_number() {
        let json = serde_json::to_string(&ErrorCode::OrderNotFound).unwrap();
        assert_eq!(json, "4001");
        let code: ErrorCode = serde_json::from_str("7002").unwrap();
        assert_eq!(code, ErrorCode::SessionConflict);
        assert!(serde_json::from_str::<ErrorCode>("12345").is_err());
    }
}

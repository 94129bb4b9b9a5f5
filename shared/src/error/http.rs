//! HTTP status code mapping for error codes

use super::codes::ErrorCode;
use http::StatusCode;

impl ErrorCode {
    /// Get the appropriate HTTP status code for this error code
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::Success => StatusCode::OK,

            // 404 Not Found
            Self::NotFound
            | Self::PatientNotFound
            | Self::InsuranceNotFound
            | Self::ConsultationNotFound
            | Self::FormTemplateNotFound
            | Self::FormFieldNotFound
            | Self::FormSubmissionNotFound
            | Self::OrderNotFound
            | Self::InvoiceNotFound
            | Self::DiscountNotFound
            | Self::ServiceNotFound
            | Self::ProviderNotFound
            | Self::PharmacyNotFound
            | Self::TagNotFound
            | Self::SessionNotFound
            | Self::UserNotFound
            | Self::TaskNotFound
            | Self::TicketNotFound => StatusCode::NOT_FOUND,

            // 409 Conflict
            Self::AlreadyExists
            | Self::FormFieldKeyExists
            | Self::FormHasSubmissions
            | Self::ConsultationSigned
            | Self::OrderInvalidTransition
            | Self::OrderNotEditable
            | Self::OrderCancelled
            | Self::InvoiceInvalidTransition
            | Self::InvoiceNotEditable
            | Self::DiscountCodeExists
            | Self::ServiceInUse
            | Self::ServiceCodeExists
            | Self::ProviderInUse
            | Self::PharmacyInUse
            | Self::TagNameExists
            | Self::SessionConflict
            | Self::SessionInvalidTransition
            | Self::UsernameExists
            | Self::TicketClosed => StatusCode::CONFLICT,

            // 401 Unauthorized
            Self::NotAuthenticated
            | Self::InvalidCredentials
            | Self::TokenExpired
            | Self::TokenInvalid
            | Self::AccountDisabled => StatusCode::UNAUTHORIZED,

            // 403 Forbidden
            Self::PermissionDenied
            | Self::AdminRequired
            | Self::CannotModifySelf
            | Self::LastAdminRequired => StatusCode::FORBIDDEN,

            // 429 Too Many Requests
            Self::TooManyAttempts => StatusCode::TOO_MANY_REQUESTS,

            // 503 Service Unavailable (transient errors, client can retry)
            Self::TimeoutError => StatusCode::SERVICE_UNAVAILABLE,

            // 500 Internal Server Error
            Self::Unknown | Self::InternalError | Self::DatabaseError | Self::ConfigError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }

            // 400 Bad Request (default for validation/business errors)
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_status() {
        assert_eq!(ErrorCode::NotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ErrorCode::PatientNotFound.http_status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ErrorCode::TicketNotFound.http_status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_conflict_status() {
        assert_eq!(
            ErrorCode::SessionConflict.http_status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ErrorCode::ConsultationSigned.http_status(),
            StatusCode::CONFLICT
        );
        assert_eq!(ErrorCode::TagNameExists.http_status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_auth_and_permission_status() {
        assert_eq!(
            ErrorCode::TokenExpired.http_status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ErrorCode::PermissionDenied.http_status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ErrorCode::TooManyAttempts.http_status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn test_bad_request_default() {
        assert_eq!(
            ErrorCode::ValidationFailed.http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ErrorCode::FormSubmissionInvalid.http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ErrorCode::PaymentExceedsBalance.http_status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_system_status() {
        assert_eq!(
            ErrorCode::DatabaseError.http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ErrorCode::TimeoutError.http_status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}

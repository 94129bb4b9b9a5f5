//! Error category classification

use super::codes::ErrorCode;
use serde::{Deserialize, Serialize};

/// Error category classification based on error code ranges
///
/// Categories are determined by the leading digit of the error code:
/// - 0xxx: General errors
/// - 1xxx: Authentication errors
/// - 2xxx: Permission errors
/// - 3xxx: Patient & clinical errors
/// - 4xxx: Order errors
/// - 5xxx: Billing errors
/// - 6xxx: Catalog errors
/// - 7xxx: Scheduling errors
/// - 8xxx: Staff errors
/// - 9xxx: System errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    General,
    Auth,
    Permission,
    Clinical,
    Order,
    Billing,
    Catalog,
    Scheduling,
    Staff,
    System,
}

impl ErrorCategory {
    /// Determine category from error code value
    pub fn from_code(code: u16) -> Self {
        match code {
            0..1000 => Self::General,
            1000..2000 => Self::Auth,
            2000..3000 => Self::Permission,
            3000..4000 => Self::Clinical,
            4000..5000 => Self::Order,
            5000..6000 => Self::Billing,
            6000..7000 => Self::Catalog,
            7000..8000 => Self::Scheduling,
            8000..9000 => Self::Staff,
            _ => Self::System,
        }
    }

    /// Get the string name for this category
    pub fn name(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Auth => "auth",
            Self::Permission => "permission",
            Self::Clinical => "clinical",
            Self::Order => "order",
            Self::Billing => "billing",
            Self::Catalog => "catalog",
            Self::Scheduling => "scheduling",
            Self::Staff => "staff",
            Self::System => "system",
        }
    }
}

impl ErrorCode {
    /// Get the category for this error code
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::from_code(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_from_code() {
        assert_eq!(ErrorCategory::from_code(0), ErrorCategory::General);
        assert_eq!(ErrorCategory::from_code(999), ErrorCategory::General);
        assert_eq!(ErrorCategory::from_code(1001), ErrorCategory::Auth);
        assert_eq!(ErrorCategory::from_code(2001), ErrorCategory::Permission);
        assert_eq!(ErrorCategory::from_code(3301), ErrorCategory::Clinical);
        assert_eq!(ErrorCategory::from_code(4001), ErrorCategory::Order);
        assert_eq!(ErrorCategory::from_code(5101), ErrorCategory::Billing);
        assert_eq!(ErrorCategory::from_code(6201), ErrorCategory::Catalog);
        assert_eq!(ErrorCategory::from_code(7002), ErrorCategory::Scheduling);
        assert_eq!(ErrorCategory::from_code(8202), ErrorCategory::Staff);
        assert_eq!(ErrorCategory::from_code(9001), ErrorCategory::System);
        assert_eq!(ErrorCategory::from_code(10000), ErrorCategory::System);
    }

    #[test]
    fn test_error_code_category() {
        assert_eq!(ErrorCode::Success.category(), ErrorCategory::General);
        assert_eq!(ErrorCode::TokenExpired.category(), ErrorCategory::Auth);
        assert_eq!(
            ErrorCode::ConsultationSigned.category(),
            ErrorCategory::Clinical
        );
        assert_eq!(
            ErrorCode::PaymentExceedsBalance.category(),
            ErrorCategory::Billing
        );
        assert_eq!(ErrorCode::TicketClosed.category(), ErrorCategory::Staff);
        assert_eq!(ErrorCode::DatabaseError.category(), ErrorCategory::System);
    }

    #[test]
    fn test_category_serialize() {
        let json = serde_json::to_string(&ErrorCategory::Scheduling).unwrap();
        assert_eq!(json, "\"scheduling\"");
        let category: ErrorCategory = serde_json::from_str("\"billing\"").unwrap();
        assert_eq!(category, ErrorCategory::Billing);
    }
}

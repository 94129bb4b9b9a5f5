//! Order Model

use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "snake_case"))]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Cancelled)
                | (Processing, Shipped)
                | (Processing, Completed)
                | (Processing, Cancelled)
                | (Shipped, Completed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Items may be replaced
    pub fn is_editable(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Order may be deleted
    pub fn is_deletable(&self) -> bool {
        matches!(self, Self::Pending | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Order entity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Order {
    pub id: i64,
    /// ORD-YYYYMMDD-NNNN
    pub order_number: String,
    pub patient_id: i64,
    pub provider_id: Option<i64>,
    pub pharmacy_id: Option<i64>,
    pub discount_id: Option<i64>,
    pub status: OrderStatus,
    pub subtotal: f64,
    pub discount_amount: f64,
    pub total: f64,
    pub notes: Option<String>,
    pub created_by: i64,
    pub created_at: i64,
    pub updated_at: i64,
    #[cfg_attr(feature = "db", sqlx(skip))]
    #[serde(default)]
    pub items: Vec<OrderItem>,
}

/// Order line item
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub service_id: Option<i64>,
    pub name: String,
    pub quantity: i64,
    pub unit_price: f64,
    pub line_total: f64,
}

/// Line item input: either a catalog service (name/price default from it)
/// or a free-form line with name and price
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OrderItemInput {
    pub service_id: Option<i64>,
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(range(min = 1, max = 9999))]
    pub quantity: i64,
    pub unit_price: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OrderCreate {
    pub patient_id: i64,
    pub provider_id: Option<i64>,
    pub pharmacy_id: Option<i64>,
    /// Discount code (looked up case-insensitively)
    pub discount_code: Option<String>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    #[validate(length(min = 1, message = "order must have at least one item"), nested)]
    pub items: Vec<OrderItemInput>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct OrderUpdate {
    pub provider_id: Option<i64>,
    pub pharmacy_id: Option<i64>,
    /// Empty string removes the discount
    pub discount_code: Option<String>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    /// Replace all items (pending orders only)
    #[validate(nested)]
    pub items: Option<Vec<OrderItemInput>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusUpdate {
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub patient_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrderStatus::*;

    #[test]
    fn transitions() {
        assert!(Pending.can_transition_to(Processing));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Shipped));
        assert!(!Pending.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Shipped));
        assert!(Processing.can_transition_to(Completed));
        assert!(Shipped.can_transition_to(Completed));
        assert!(!Shipped.can_transition_to(Cancelled));
    }

    #[test]
    fn terminal_states_go_nowhere() {
        for next in [Pending, Processing, Shipped, Completed, Cancelled] {
            assert!(!Completed.can_transition_to(next));
            assert!(!Cancelled.can_transition_to(next));
        }
        assert!(Completed.is_terminal());
    }

    #[test]
    fn editing_and_deleting() {
        assert!(Pending.is_editable());
        assert!(!Processing.is_editable());
        assert!(Pending.is_deletable());
        assert!(Cancelled.is_deletable());
        assert!(!Shipped.is_deletable());
    }

    #[test]
    fn create_requires_items() {
        let create = OrderCreate {
            patient_id: 1,
            provider_id: None,
            pharmacy_id: None,
            discount_code: None,
            notes: None,
            items: vec![],
        };
        assert!(create.validate().is_err());
    }
}

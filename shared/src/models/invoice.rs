//! Invoice Model

use super::discount::Discount;
use super::insurance::InsuranceRecord;
use crate::money;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Days between issue and due date when none is given
pub const DEFAULT_PAYMENT_TERMS_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "snake_case"))]
pub enum InvoiceStatus {
    Draft,
    Issued,
    Paid,
    Void,
}

impl InvoiceStatus {
    pub fn can_transition_to(&self, next: InvoiceStatus) -> bool {
        use InvoiceStatus::*;
        matches!(
            (self, next),
            (Draft, Issued) | (Draft, Void) | (Issued, Paid) | (Issued, Void)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Issued => "issued",
            Self::Paid => "paid",
            Self::Void => "void",
        }
    }
}

/// Invoice entity; `balance` is derived (`total - amount_paid`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Invoice {
    pub id: i64,
    /// INV-YYYYMM-NNNN
    pub invoice_number: String,
    pub patient_id: i64,
    pub order_id: Option<i64>,
    pub insurance_record_id: Option<i64>,
    pub discount_id: Option<i64>,
    pub status: InvoiceStatus,
    pub issue_date: Option<String>,
    pub due_date: Option<String>,
    pub subtotal: f64,
    pub discount_amount: f64,
    pub insurance_amount: f64,
    pub total: f64,
    pub amount_paid: f64,
    pub balance: f64,
    pub notes: Option<String>,
    pub created_by: i64,
    pub created_at: i64,
    pub updated_at: i64,
    #[cfg_attr(feature = "db", sqlx(skip))]
    #[serde(default)]
    pub items: Vec<InvoiceItem>,
    #[cfg_attr(feature = "db", sqlx(skip))]
    #[serde(default)]
    pub payments: Vec<Payment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct InvoiceItem {
    pub id: i64,
    pub invoice_id: i64,
    pub description: String,
    pub quantity: i64,
    pub unit_price: f64,
    pub line_total: f64,
}

/// Recorded payment against an invoice
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Payment {
    pub id: i64,
    pub invoice_id: i64,
    pub amount: f64,
    pub method: Option<String>,
    pub reference: Option<String>,
    pub recorded_by: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct InvoiceItemInput {
    #[validate(length(min = 1, max = 500))]
    pub description: String,
    #[validate(range(min = 1, max = 9999))]
    pub quantity: i64,
    #[validate(range(min = 0.0, max = 1_000_000.0))]
    pub unit_price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct InvoiceCreate {
    pub patient_id: i64,
    pub insurance_record_id: Option<i64>,
    pub discount_code: Option<String>,
    pub due_date: Option<String>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    #[validate(length(min = 1, message = "invoice must have at least one item"), nested)]
    pub items: Vec<InvoiceItemInput>,
}

/// Create a draft invoice from an order (items and discount are copied)
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct InvoiceFromOrder {
    pub order_id: i64,
    pub insurance_record_id: Option<i64>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

/// Draft-only update
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct InvoiceUpdate {
    /// 0 removes the insurance record
    pub insurance_record_id: Option<i64>,
    /// Empty string removes the discount
    pub discount_code: Option<String>,
    pub due_date: Option<String>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    #[validate(nested)]
    pub items: Option<Vec<InvoiceItemInput>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvoiceIssue {
    /// Defaults to today
    pub issue_date: Option<String>,
    /// Defaults to issue date + 30 days
    pub due_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PaymentCreate {
    pub amount: f64,
    #[validate(length(max = 50))]
    pub method: Option<String>,
    #[validate(length(max = 200))]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvoiceFilter {
    pub status: Option<InvoiceStatus>,
    pub patient_id: Option<i64>,
    pub overdue: Option<bool>,
}

/// Computed invoice amounts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceTotals {
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub insurance_amount: Decimal,
    pub total: Decimal,
}

impl InvoiceTotals {
    /// subtotal -> discount -> insurance share of the discounted amount
    pub fn compute(
        line_totals: impl IntoIterator<Item = Decimal>,
        discount: Option<&Discount>,
        insurance: Option<&InsuranceRecord>,
        on: NaiveDate,
    ) -> Self {
        let subtotal = money::sum(line_totals);
        let discount_amount = discount
            .map(|d| d.apply(subtotal, on))
            .unwrap_or(Decimal::ZERO);
        let after_discount = subtotal - discount_amount;
        let insurance_amount = insurance
            .filter(|r| r.covers(on))
            .map(|r| money::percent_of(after_discount, r.coverage_percent))
            .unwrap_or(Decimal::ZERO)
            .min(after_discount);
        Self {
            subtotal,
            discount_amount,
            insurance_amount,
            total: money::round(after_discount - insurance_amount),
        }
    }
}

/// Issued, still owing, due date in the past
pub fn is_overdue(invoice: &Invoice, today: NaiveDate) -> bool {
    invoice.status == InvoiceStatus::Issued
        && invoice.balance > 0.0
        && invoice
            .due_date
            .as_deref()
            .and_then(crate::util::parse_date)
            .is_some_and(|due| due < today)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::discount::DiscountKind;
    use crate::models::insurance::HolderRelationship;
    use crate::util::parse_date;

    fn day(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    fn discount() -> Discount {
        Discount {
            id: 1,
            name: "Ten".into(),
            code: "TEN".into(),
            kind: DiscountKind::Percentage,
            value: 10.0,
            valid_from: None,
            valid_until: None,
            is_active: true,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn insurance(percent: f64) -> InsuranceRecord {
        InsuranceRecord {
            id: 1,
            patient_id: 1,
            carrier: "Acme".into(),
            plan_name: None,
            policy_number: "X".into(),
            group_number: None,
            holder_name: None,
            holder_relationship: HolderRelationship::Holder,
            coverage_percent: percent,
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
    fn totals_apply_discount_then_insurance() {
        let lines = [money::line_total(100.0, 1), money::line_total(25.0, 2)];
        let totals = InvoiceTotals::compute(
            lines,
            Some(&discount()),
            Some(&insurance(80.0)),
            day("2024-06-01"),
        );
        assert_eq!(totals.subtotal, Decimal::new(150, 0));
        assert_eq!(totals.discount_amount, Decimal::new(15, 0));
        assert_eq!(totals.insurance_amount, Decimal::new(108, 0));
        assert_eq!(totals.total, Decimal::new(27, 0));
    }

    #[test]
    fn insurance_outside_window_is_ignored() {
        let totals = InvoiceTotals::compute(
            [money::line_total(100.0, 1)],
            None,
            Some(&insurance(80.0)),
            day("2025-02-01"),
        );
        assert_eq!(totals.insurance_amount, Decimal::ZERO);
        assert_eq!(totals.total, Decimal::new(100, 0));
    }

    #[test]
    fn transitions() {
        use InvoiceStatus::*;
        assert!(Draft.can_transition_to(Issued));
        assert!(Issued.can_transition_to(Paid));
        assert!(Issued.can_transition_to(Void));
        assert!(!Paid.can_transition_to(Void));
        assert!(!Void.can_transition_to(Issued));
        assert!(!Draft.can_transition_to(Paid));
    }
}

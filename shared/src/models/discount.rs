//! Discount Model

use crate::money;
use crate::util::parse_date;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "snake_case"))]
pub enum DiscountKind {
    /// `value` is a percentage in (0, 100]
    Percentage,
    /// `value` is an amount
    Fixed,
}

/// Discount code
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Discount {
    pub id: i64,
    pub name: String,
    /// Stored upper-case
    pub code: String,
    pub kind: DiscountKind,
    pub value: f64,
    pub valid_from: Option<String>,
    pub valid_until: Option<String>,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Discount {
    /// Active and inside its validity window (bounds inclusive)
    pub fn is_applicable(&self, today: NaiveDate) -> bool {
        if !self.is_active {
            return false;
        }
        let from = self.valid_from.as_deref().and_then(parse_date);
        let until = self.valid_until.as_deref().and_then(parse_date);
        from.is_none_or(|d| today >= d) && until.is_none_or(|d| today <= d)
    }

    /// Discount amount for `subtotal`; never exceeds the subtotal
    pub fn apply(&self, subtotal: Decimal, today: NaiveDate) -> Decimal {
        if !self.is_applicable(today) || subtotal <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let amount = match self.kind {
            DiscountKind::Percentage => money::percent_of(subtotal, self.value),
            DiscountKind::Fixed => money::round(money::to_decimal(self.value)),
        };
        amount.min(subtotal)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DiscountCreate {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, max = 32))]
    pub code: String,
    pub kind: DiscountKind,
    pub value: f64,
    pub valid_from: Option<String>,
    pub valid_until: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct DiscountUpdate {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 32))]
    pub code: Option<String>,
    pub kind: Option<DiscountKind>,
    pub value: Option<f64>,
    pub valid_from: Option<String>,
    pub valid_until: Option<String>,
    pub is_active: Option<bool>,
}

/// Check kind/value and the validity window
pub fn check_discount_rules(
    kind: DiscountKind,
    value: f64,
    valid_from: Option<&str>,
    valid_until: Option<&str>,
) -> Result<(), String> {
    if !value.is_finite() {
        return Err("value must be a finite number".into());
    }
    match kind {
        DiscountKind::Percentage if !(value > 0.0 && value <= 100.0) => {
            return Err(format!("percentage must be in (0, 100], got {value}"));
        }
        DiscountKind::Fixed if value <= 0.0 => {
            return Err(format!("fixed amount must be positive, got {value}"));
        }
        DiscountKind::Fixed if value > money::MAX_AMOUNT => {
            return Err(format!("fixed amount exceeds maximum allowed ({})", money::MAX_AMOUNT));
        }
        _ => {}
    }
    let from = match valid_from {
        Some(s) => Some(parse_date(s).ok_or_else(|| format!("valid_from is not a date: {s}"))?),
        None => None,
    };
    let until = match valid_until {
        Some(s) => Some(parse_date(s).ok_or_else(|| format!("valid_until is not a date: {s}"))?),
        None => None,
    };
    if let (Some(from), Some(until)) = (from, until)
        && from > until
    {
        return Err("valid_from must not be after valid_until".into());
    }
    Ok(())
}

/// Normalize a discount code for storage and lookup
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

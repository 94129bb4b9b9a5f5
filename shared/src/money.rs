//! Money arithmetic
//!
//! Amounts travel and are stored as `f64`; every calculation goes through
//! `Decimal` and is rounded half-up to 2 decimal places on the way out.

use rust_decimal::prelude::*;

const DECIMAL_PLACES: u32 = 2;

/// Tolerance for monetary comparisons (0.01)
pub const MONEY_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Maximum allowed unit price / payment (1,000,000)
pub const MAX_AMOUNT: f64 = 1_000_000.0;

/// Maximum quantity per line item
pub const MAX_QUANTITY: i64 = 9999;

#[inline]
pub fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_else(|| {
        tracing::error!(value = ?value, "Non-finite f64 in monetary calculation, defaulting to zero");
        Decimal::ZERO
    })
}

/// Round to cents
#[inline]
pub fn round(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// Convert back to f64 for storage, rounded to 2 decimal places
#[inline]
pub fn to_f64(value: Decimal) -> f64 {
    round(value).to_f64().unwrap_or_default()
}

/// `unit_price * quantity`, rounded
pub fn line_total(unit_price: f64, quantity: i64) -> Decimal {
    round(to_decimal(unit_price) * Decimal::from(quantity))
}

/// Sum of line totals
pub fn sum(values: impl IntoIterator<Item = Decimal>) -> Decimal {
    round(values.into_iter().fold(Decimal::ZERO, |acc, v| acc + v))
}

/// `amount * percent / 100`, rounded
pub fn percent_of(amount: Decimal, percent: f64) -> Decimal {
    round(amount * to_decimal(percent) / Decimal::ONE_HUNDRED)
}

/// Validate a monetary input: finite, non-negative, bounded
pub fn check_amount(value: f64, field: &str) -> Result<(), String> {
    if !value.is_finite() {
        return Err(format!("{field} must be a finite number"));
    }
    if value < 0.0 {
        return Err(format!("{field} must be non-negative, got {value}"));
    }
    if value > MAX_AMOUNT {
        return Err(format!("{field} exceeds maximum allowed ({MAX_AMOUNT})"));
    }
    Ok(())
}

/// Equal within one cent
pub fn money_eq(a: f64, b: f64) -> bool {
    (to_decimal(a) - to_decimal(b)).abs() < MONEY_TOLERANCE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_half_up() {
        assert_eq!(to_f64(Decimal::new(1005, 3)), 1.01);
        assert_eq!(to_f64(Decimal::new(1004, 3)), 1.0);
    }

    #[test]
    fn avoids_float_drift() {
        // 0.1 * 3 in f64 is 0.30000000000000004
        assert_eq!(to_f64(line_total(0.1, 3)), 0.3);
        let total = sum([line_total(19.99, 3), line_total(0.01, 1)]);
        assert_eq!(to_f64(total), 59.98);
    }

    #[test]
    fn percentage() {
        assert_eq!(to_f64(percent_of(Decimal::new(8000, 2), 80.0)), 64.0);
        assert_eq!(to_f64(percent_of(Decimal::new(3333, 2), 33.333)), 11.11);
    }

    #[test]
    fn amount_checks() {
        assert!(check_amount(10.0, "price").is_ok());
        assert!(check_amount(-0.01, "price").is_err());
        assert!(check_amount(f64::NAN, "price").is_err());
        assert!(check_amount(MAX_AMOUNT + 1.0, "price").is_err());
    }

    #[test]
    fn tolerance() {
        assert!(money_eq(10.001, 10.0));
        assert!(!money_eq(10.02, 10.0));
    }
}

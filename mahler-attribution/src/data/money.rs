//! Conversions between model floats and money decimals.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

/// Decimal places kept on Greek-derived money amounts.
pub const MONEY_SCALE: u32 = 6;

/// Convert a model output into a money amount. Non-finite input maps to zero.
pub fn money(value: f64) -> Decimal {
    Decimal::from_f64(value)
        .map(|d| d.round_dp(MONEY_SCALE))
        .unwrap_or(Decimal::ZERO)
}

/// Convert a raw input price without rounding beyond float precision.
pub fn price(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or(Decimal::ZERO)
}

pub fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// `part / |total| × 100`, or 0 when the total is zero.
pub fn pct_of(part: Decimal, total: Decimal) -> f64 {
    if total.is_zero() {
        return 0.0;
    }
    to_f64(part) / to_f64(total.abs()) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_money_rounding() {
        assert_eq!(money(-4.0), dec!(-4));
        assert_eq!(money(1.23456789), dec!(1.234568));
        assert_eq!(money(f64::NAN), Decimal::ZERO);
    }

    #[test]
    fn test_pct_of_zero_total() {
        assert_eq!(pct_of(dec!(10), Decimal::ZERO), 0.0);
        assert_eq!(pct_of(dec!(-25), dec!(-50)), -50.0);
        assert_eq!(pct_of(dec!(25), dec!(50)), 50.0);
    }
}

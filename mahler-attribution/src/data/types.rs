//! Core data types for PnL attribution.
//!
//! Snapshots are produced once per simulated day by the backtest loop and
//! treated as immutable inputs. Money fields are `Decimal`, sensitivities
//! are `f64`.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Option type (call or put).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "C" | "CALL" => Some(Self::Call),
            "P" | "PUT" => Some(Self::Put),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "C",
            Self::Put => "P",
        }
    }

    /// Upper-case label used in slice keys.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Call => "CALL",
            Self::Put => "PUT",
        }
    }

    /// Undiscounted intrinsic value per share.
    pub fn intrinsic(&self, spot: f64, strike: f64) -> f64 {
        match self {
            Self::Call => (spot - strike).max(0.0),
            Self::Put => (strike - spot).max(0.0),
        }
    }
}

/// Side of a position, derived from the sign of its quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    pub fn from_quantity(quantity: i32) -> Self {
        if quantity < 0 {
            Self::Short
        } else {
            Self::Long
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Long => "LONG",
            Self::Short => "SHORT",
        }
    }
}

/// Greeks for an option contract or a position.
///
/// Per-share values come straight out of the pricing model. Position-level
/// values are scaled by held quantity: delta, theta and rho by the signed
/// quantity, gamma and vega by its absolute value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Greeks {
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    pub rho: f64,
}

impl Greeks {
    /// Rescale per-share Greeks to position level.
    pub fn to_position(&self, quantity: i32) -> Self {
        let signed = quantity as f64;
        let magnitude = quantity.unsigned_abs() as f64;
        Self {
            delta: self.delta * signed,
            gamma: self.gamma * magnitude,
            theta: self.theta * signed,
            vega: self.vega * magnitude,
            rho: self.rho * signed,
        }
    }

    /// Invert [`Greeks::to_position`]. Returns `None` for a flat position.
    pub fn to_per_share(&self, quantity: i32) -> Option<Self> {
        if quantity == 0 {
            return None;
        }
        let signed = quantity as f64;
        let magnitude = quantity.unsigned_abs() as f64;
        Some(Self {
            delta: self.delta / signed,
            gamma: self.gamma / magnitude,
            theta: self.theta / signed,
            vega: self.vega / magnitude,
            rho: self.rho / signed,
        })
    }
}

/// A derived value that may be unknown, computed, or not applicable.
///
/// Keeps "we could not find the data" apart from "this does not apply to
/// the trade", neither of which should read as zero.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Estimate<T> {
    #[default]
    Unknown,
    Computed(T),
    NotApplicable,
}

impl<T> Estimate<T> {
    pub fn from_option(value: Option<T>) -> Self {
        match value {
            Some(v) => Self::Computed(v),
            None => Self::Unknown,
        }
    }

    pub fn computed(self) -> Option<T> {
        match self {
            Self::Computed(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_ref(&self) -> Estimate<&T> {
        match self {
            Self::Unknown => Estimate::Unknown,
            Self::Computed(v) => Estimate::Computed(v),
            Self::NotApplicable => Estimate::NotApplicable,
        }
    }

    pub fn is_computed(&self) -> bool {
        matches!(self, Self::Computed(_))
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Estimate<U> {
        match self {
            Self::Unknown => Estimate::Unknown,
            Self::Computed(v) => Estimate::Computed(f(v)),
            Self::NotApplicable => Estimate::NotApplicable,
        }
    }

    /// Chain a computation that can itself come back unknown or not applicable.
    pub fn and_then<U, F: FnOnce(T) -> Estimate<U>>(self, f: F) -> Estimate<U> {
        match self {
            Self::Unknown => Estimate::Unknown,
            Self::Computed(v) => f(v),
            Self::NotApplicable => Estimate::NotApplicable,
        }
    }
}

/// One option position on one trading day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSnapshot {
    /// Snapshot (trade) date.
    pub date: NaiveDate,

    /// Stable position identifier across days.
    pub position_id: String,

    /// Underlying symbol (e.g., "SPY").
    pub underlying: String,

    /// Contract symbol.
    pub symbol: String,

    /// Option type (call or put).
    pub option_type: OptionType,

    /// Strike price.
    pub strike: Decimal,

    /// Option expiration date.
    pub expiration: NaiveDate,

    /// Signed contract count (negative = short).
    pub quantity: i32,

    /// Contract multiplier.
    pub lot_size: u32,

    /// Underlying price at snapshot time.
    pub underlying_price: Decimal,

    /// Option mid price.
    pub option_price: Decimal,

    /// Implied volatility as a decimal fraction.
    pub iv: Option<f64>,

    /// Historical volatility of the underlying.
    pub hv: Option<f64>,

    /// IV / HV.
    pub iv_hv_ratio: Option<f64>,

    /// IV rank on a 0-100 scale.
    pub iv_rank: Option<f64>,

    /// IV percentile on a 0-100 scale.
    pub iv_percentile: Option<f64>,

    /// Position-level Greeks.
    pub greeks: Option<Greeks>,

    /// Signed market value (price × quantity × lot).
    pub market_value: Decimal,

    /// Unrealized PnL reported by the simulation.
    pub unrealized_pnl: Decimal,

    /// Moneyness in percent, positive when in the money.
    pub moneyness_pct: f64,

    /// Calendar days to expiration.
    pub dte: i32,

    /// Entry price per share.
    pub entry_price: Decimal,

    /// Date the position was opened.
    pub entry_date: Option<NaiveDate>,
}

impl PositionSnapshot {
    pub fn side(&self) -> PositionSide {
        PositionSide::from_quantity(self.quantity)
    }

    /// Entry premium scaled like `market_value`.
    pub fn entry_notional(&self) -> Decimal {
        self.entry_price * Decimal::from(self.quantity) * Decimal::from(self.lot_size)
    }
}

/// Portfolio-level state for one day, produced by the portfolio metrics
/// collaborator and consumed read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub date: NaiveDate,
    pub net_liquidation: Decimal,
    pub cash: Decimal,
    pub margin_used: Decimal,
    pub position_count: usize,
    pub daily_pnl: Decimal,
    pub greeks: Greeks,
    pub beta_weighted_delta: Option<f64>,
    pub theta_gamma_ratio: Option<f64>,
    pub concentration_index: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_type_parsing() {
        assert_eq!(OptionType::from_str("C"), Some(OptionType::Call));
        assert_eq!(OptionType::from_str("P"), Some(OptionType::Put));
        assert_eq!(OptionType::from_str("call"), Some(OptionType::Call));
        assert_eq!(OptionType::from_str(" PUT "), Some(OptionType::Put));
        assert_eq!(OptionType::from_str("X"), None);
    }

    #[test]
    fn test_intrinsic() {
        assert_eq!(OptionType::Call.intrinsic(105.0, 100.0), 5.0);
        assert_eq!(OptionType::Call.intrinsic(95.0, 100.0), 0.0);
        assert_eq!(OptionType::Put.intrinsic(95.0, 100.0), 5.0);
        assert_eq!(OptionType::Put.intrinsic(105.0, 100.0), 0.0);
    }

    #[test]
    fn test_position_scaling_sign_convention() {
        let per_share = Greeks {
            delta: -0.30,
            gamma: 0.02,
            theta: -0.05,
            vega: 0.10,
            rho: -0.01,
        };
        let position = per_share.to_position(-3);

        // Delta/theta/rho follow the signed quantity.
        assert!((position.delta - 0.90).abs() < 1e-12);
        assert!((position.theta - 0.15).abs() < 1e-12);
        assert!((position.rho - 0.03).abs() < 1e-12);
        // Gamma/vega keep magnitude only.
        assert!((position.gamma - 0.06).abs() < 1e-12);
        assert!((position.vega - 0.30).abs() < 1e-12);

        let back = position.to_per_share(-3).unwrap();
        assert!((back.delta - per_share.delta).abs() < 1e-12);
        assert!((back.vega - per_share.vega).abs() < 1e-12);
        assert!(position.to_per_share(0).is_none());
    }

    #[test]
    fn test_estimate_states() {
        let known: Estimate<f64> = Estimate::from_option(Some(1.5));
        let unknown: Estimate<f64> = Estimate::from_option(None);

        assert_eq!(known.computed(), Some(1.5));
        assert_eq!(unknown, Estimate::Unknown);
        assert_eq!(known.map(|v| v * 2.0), Estimate::Computed(3.0));
        assert_eq!(
            Estimate::<f64>::NotApplicable.map(|v| v * 2.0),
            Estimate::NotApplicable
        );
        assert_eq!(
            known.and_then(|_| Estimate::<f64>::NotApplicable),
            Estimate::NotApplicable
        );
    }

    #[test]
    fn test_side_from_quantity() {
        assert_eq!(PositionSide::from_quantity(-2), PositionSide::Short);
        assert_eq!(PositionSide::from_quantity(3), PositionSide::Long);
    }
}

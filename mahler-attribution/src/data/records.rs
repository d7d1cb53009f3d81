//! Raw records emitted by the simulation loop.
//!
//! Position records become [`PositionSnapshot`](super::PositionSnapshot)s
//! through the snapshot builder. Trade records describe the open, close and
//! expire events for each position.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::types::{Greeks, OptionType};

/// One position as recorded by the simulation on one day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPositionRecord {
    pub date: NaiveDate,
    /// Missing identifiers are rejected by the snapshot builder.
    pub position_id: Option<String>,
    pub underlying: String,
    pub symbol: String,
    pub option_type: OptionType,
    pub strike: Decimal,
    pub expiration: NaiveDate,
    pub quantity: i32,
    pub lot_size: u32,
    pub underlying_price: Decimal,
    pub option_price: Decimal,
    pub iv: Option<f64>,
    /// Position-level Greeks, trusted when `iv` is present.
    pub greeks: Option<Greeks>,
    pub market_value: Option<Decimal>,
    pub unrealized_pnl: Option<Decimal>,
    pub hv: Option<f64>,
    pub iv_rank: Option<f64>,
    pub iv_percentile: Option<f64>,
    pub dte: Option<i32>,
    pub entry_price: Decimal,
    pub entry_date: Option<NaiveDate>,
}

/// Lifecycle action of a trade record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Open,
    Close,
    Expire,
}

impl TradeAction {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "open" | "buy_to_open" | "sell_to_open" => Some(Self::Open),
            "close" | "buy_to_close" | "sell_to_close" => Some(Self::Close),
            "expire" | "expired" | "expiration" => Some(Self::Expire),
            _ => None,
        }
    }

    /// Whether this action ends the position.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Close | Self::Expire)
    }
}

/// Structured reason for exiting a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExitReasonType {
    /// Hit profit target.
    ProfitTarget,
    /// Hit stop loss.
    StopLoss,
    /// Time-based exit (e.g., 21 DTE).
    TimeExit,
    /// Held to expiration.
    Expired,
    /// Forced out by a risk or margin limit.
    RiskLimit,
    /// Rolled into another contract.
    Rolled,
    /// Manual/forced exit.
    Manual,
    /// End of backtest period.
    EndOfPeriod,
    /// Recorded but not recognised.
    Other,
}

impl ExitReasonType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "PROFIT_TARGET" | "TAKE_PROFIT" => Some(Self::ProfitTarget),
            "STOP_LOSS" => Some(Self::StopLoss),
            "TIME_EXIT" | "DTE_EXIT" => Some(Self::TimeExit),
            "EXPIRED" | "EXPIRATION" => Some(Self::Expired),
            "RISK_LIMIT" => Some(Self::RiskLimit),
            "ROLLED" | "ROLL" => Some(Self::Rolled),
            "MANUAL" => Some(Self::Manual),
            "END_OF_PERIOD" | "END_OF_BACKTEST" => Some(Self::EndOfPeriod),
            "OTHER" => Some(Self::Other),
            _ => None,
        }
    }

    /// Normalized token used as a slice label.
    pub fn token(&self) -> &'static str {
        match self {
            Self::ProfitTarget => "PROFIT_TARGET",
            Self::StopLoss => "STOP_LOSS",
            Self::TimeExit => "TIME_EXIT",
            Self::Expired => "EXPIRED",
            Self::RiskLimit => "RISK_LIMIT",
            Self::Rolled => "ROLLED",
            Self::Manual => "MANUAL",
            Self::EndOfPeriod => "END_OF_PERIOD",
            Self::Other => "OTHER",
        }
    }
}

/// One trade event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Missing identifiers are rejected by the attribution engine.
    pub position_id: Option<String>,
    pub action: TradeAction,
    pub trade_date: NaiveDate,
    pub underlying: String,
    pub symbol: String,
    pub option_type: OptionType,
    pub strike: Decimal,
    pub expiration: NaiveDate,
    /// Signed contract count of the position this trade opens or closes.
    pub quantity: i32,
    pub lot_size: u32,
    pub fill_price: Decimal,
    /// Underlying price at trade time.
    pub underlying_price: Option<Decimal>,
    /// Realized PnL, present on close/expire.
    pub realized_pnl: Option<Decimal>,
    /// Free-text reason, present on close/expire.
    pub reason: Option<String>,
    pub reason_type: Option<ExitReasonType>,
    /// IV rank at entry (0-100), present on open.
    pub iv_rank: Option<f64>,
}

impl TradeRecord {
    pub fn position_id(&self) -> Option<&str> {
        self.position_id.as_deref().filter(|id| !id.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trade_action_parsing() {
        assert_eq!(TradeAction::from_str("OPEN"), Some(TradeAction::Open));
        assert_eq!(TradeAction::from_str("sell_to_close"), Some(TradeAction::Close));
        assert_eq!(TradeAction::from_str("expired"), Some(TradeAction::Expire));
        assert_eq!(TradeAction::from_str("hold"), None);
        assert!(TradeAction::Expire.is_terminal());
        assert!(!TradeAction::Open.is_terminal());
    }

    #[test]
    fn test_exit_reason_type_round_trip_tokens() {
        for reason in [
            ExitReasonType::ProfitTarget,
            ExitReasonType::StopLoss,
            ExitReasonType::TimeExit,
            ExitReasonType::Expired,
            ExitReasonType::RiskLimit,
            ExitReasonType::Rolled,
            ExitReasonType::Manual,
            ExitReasonType::EndOfPeriod,
            ExitReasonType::Other,
        ] {
            assert_eq!(ExitReasonType::from_str(reason.token()), Some(reason));
        }
        assert_eq!(ExitReasonType::from_str("stop_loss"), Some(ExitReasonType::StopLoss));
    }
}

//! Entry quality: implied vol paid versus volatility realized over the hold.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::attribution::TradeAttribution;
use crate::data::money::money;
use crate::data::{Estimate, MarketDataProvider};
use crate::metrics::MetricsCalculator;

use super::DiagnosisConfig;

/// Volatility risk premium for one trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryQuality {
    pub position_id: String,
    pub underlying: String,
    pub entry_iv: Option<f64>,
    /// Annualized realized vol over the holding period.
    pub realized_vol: Estimate<f64>,
    /// Entry IV minus realized vol.
    pub vrp_spread: Estimate<f64>,
    /// Spread × entry vega × lot.
    pub vrp_captured: Estimate<Decimal>,
}

/// Aggregate entry quality over a set of trades.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryQualitySummary {
    pub trades: usize,
    /// Trades with a computed spread.
    pub measured: usize,
    /// Trades that sold more vol than was realized.
    pub positive_spread: usize,
    pub avg_vrp_spread: Option<f64>,
    pub total_vrp_captured: Decimal,
}

pub(crate) fn analyze<M: MarketDataProvider + ?Sized>(
    config: &DiagnosisConfig,
    trades: &[TradeAttribution],
    market: &M,
) -> Vec<EntryQuality> {
    trades
        .iter()
        .map(|trade| entry_quality(config, trade, market))
        .collect()
}

fn entry_quality<M: MarketDataProvider + ?Sized>(
    config: &DiagnosisConfig,
    trade: &TradeAttribution,
    market: &M,
) -> EntryQuality {
    let realized_vol = match market.daily_closes(&trade.underlying, trade.entry_date, trade.exit_date)
    {
        Ok(closes) => {
            let closes: Vec<f64> = closes.into_values().collect();
            Estimate::from_option(MetricsCalculator::historical_volatility(
                &closes,
                config.realized_vol_window,
                config.annualization,
            ))
        }
        Err(e) => {
            debug!(position_id = %trade.position_id, error = %e, "Realized vol unavailable");
            Estimate::Unknown
        }
    };

    let vrp_spread = match trade.entry_iv {
        Some(iv) => realized_vol.map(|rv| iv - rv),
        None => Estimate::Unknown,
    };

    let vrp_captured = vrp_spread.and_then(|spread| match trade.entry_vega {
        Some(vega) => Estimate::Computed(money(spread * vega * trade.lot_size as f64)),
        None => Estimate::Unknown,
    });

    EntryQuality {
        position_id: trade.position_id.clone(),
        underlying: trade.underlying.clone(),
        entry_iv: trade.entry_iv,
        realized_vol,
        vrp_spread,
        vrp_captured,
    }
}

pub(crate) fn summarize(rows: &[EntryQuality]) -> EntryQualitySummary {
    let spreads: Vec<f64> = rows.iter().filter_map(|r| r.vrp_spread.computed()).collect();

    EntryQualitySummary {
        trades: rows.len(),
        measured: spreads.len(),
        positive_spread: spreads.iter().filter(|s| **s > 0.0).count(),
        avg_vrp_spread: if spreads.is_empty() {
            None
        } else {
            Some(spreads.iter().sum::<f64>() / spreads.len() as f64)
        },
        total_vrp_captured: rows.iter().filter_map(|r| r.vrp_captured.computed()).sum(),
    }
}

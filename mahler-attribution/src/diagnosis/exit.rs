//! Exit quality: each early exit against holding the contract to expiry.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::attribution::exit_reason::{is_stop_loss, normalize_reason_token, reason_text_token};
use crate::attribution::TradeAttribution;
use crate::data::money::{money, to_f64};
use crate::data::{Estimate, MarketDataProvider};

/// Counterfactual hold-to-expiry outcome for one trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitQuality {
    pub position_id: String,
    pub underlying: String,
    pub exit_reason: String,
    pub actual_pnl: Decimal,
    /// Underlying close on the expiration date.
    pub expiry_close: Estimate<f64>,
    pub pnl_if_held: Estimate<Decimal>,
    /// Actual PnL minus hold-to-expiry PnL.
    pub exit_benefit: Estimate<Decimal>,
}

impl ExitQuality {
    /// `None` when the counterfactual could not be computed.
    pub fn good_exit(&self) -> Option<bool> {
        self.exit_benefit.computed().map(|b| b > Decimal::ZERO)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExitQualitySummary {
    /// Trades with a computed counterfactual.
    pub analyzed: usize,
    pub good_exits: usize,
    pub good_exit_rate: f64,
    pub avg_benefit: Decimal,
    /// Sum of benefits over good exits.
    pub total_saved: Decimal,
    /// Absolute sum of benefits over bad exits.
    pub total_lost: Decimal,
    pub net_value: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReversalBucket {
    pub trades: usize,
    pub reversals: usize,
}

/// How often stopped-out trades would have recovered by expiry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReversalAnalysis {
    pub stop_loss_trades: usize,
    /// Stop-loss trades with a computed counterfactual.
    pub analyzed: usize,
    pub reversals: usize,
    pub reversal_rate: f64,
    /// Mean of hold PnL minus actual PnL over reversals.
    pub avg_reversal_magnitude: Decimal,
    pub breakdown: BTreeMap<String, ReversalBucket>,
}

pub(crate) fn analyze<M: MarketDataProvider + ?Sized>(
    trades: &[TradeAttribution],
    market: &M,
) -> Vec<ExitQuality> {
    trades.iter().map(|t| exit_quality(t, market)).collect()
}

fn exit_quality<M: MarketDataProvider + ?Sized>(
    trade: &TradeAttribution,
    market: &M,
) -> ExitQuality {
    let actual_pnl = trade.actual_pnl();

    // Expired trades were held; open trades have not exited.
    let expiry_close = if trade.expired() || !trade.is_closed() {
        Estimate::NotApplicable
    } else {
        match market.close_on(&trade.underlying, trade.expiration) {
            Ok(close) => Estimate::Computed(close),
            Err(e) => {
                debug!(position_id = %trade.position_id, error = %e, "Expiry close unavailable");
                Estimate::Unknown
            }
        }
    };

    let pnl_if_held = expiry_close.map(|close| {
        let intrinsic = money(trade.option_type.intrinsic(close, to_f64(trade.strike)));
        (intrinsic - trade.entry_price)
            * Decimal::from(trade.quantity)
            * Decimal::from(trade.lot_size)
    });

    ExitQuality {
        position_id: trade.position_id.clone(),
        underlying: trade.underlying.clone(),
        exit_reason: normalize_reason_token(trade.exit_reason_type, trade.exit_reason.as_deref()),
        actual_pnl,
        expiry_close,
        pnl_if_held,
        exit_benefit: pnl_if_held.map(|held| actual_pnl - held),
    }
}

pub(crate) fn summarize(rows: &[ExitQuality]) -> ExitQualitySummary {
    let benefits: Vec<Decimal> = rows.iter().filter_map(|r| r.exit_benefit.computed()).collect();
    if benefits.is_empty() {
        return ExitQualitySummary::default();
    }

    let good: Vec<Decimal> = benefits.iter().copied().filter(|b| *b > Decimal::ZERO).collect();
    let total_saved: Decimal = good.iter().sum();
    let total_lost: Decimal = benefits
        .iter()
        .filter(|b| **b <= Decimal::ZERO)
        .map(|b| b.abs())
        .sum();
    let total: Decimal = benefits.iter().sum();

    ExitQualitySummary {
        analyzed: benefits.len(),
        good_exits: good.len(),
        good_exit_rate: good.len() as f64 / benefits.len() as f64,
        avg_benefit: total / Decimal::from(benefits.len() as i64),
        total_saved,
        total_lost,
        net_value: total_saved - total_lost,
    }
}

/// Stop-loss trades whose hold-to-expiry PnL would have been positive.
pub(crate) fn reversals(trades: &[TradeAttribution], rows: &[ExitQuality]) -> ReversalAnalysis {
    let mut analysis = ReversalAnalysis::default();
    let mut magnitude = Decimal::ZERO;

    for (trade, row) in trades.iter().zip(rows) {
        if !is_stop_loss(trade.exit_reason_type, trade.exit_reason.as_deref()) {
            continue;
        }
        analysis.stop_loss_trades += 1;

        let Some(held) = row.pnl_if_held.computed() else {
            continue;
        };
        analysis.analyzed += 1;

        let bucket = analysis
            .breakdown
            .entry(reason_text_token(trade.exit_reason_type, trade.exit_reason.as_deref()))
            .or_default();
        bucket.trades += 1;

        if held > Decimal::ZERO {
            bucket.reversals += 1;
            analysis.reversals += 1;
            magnitude += held - row.actual_pnl;
        }
    }

    if analysis.analyzed > 0 {
        analysis.reversal_rate = analysis.reversals as f64 / analysis.analyzed as f64;
    }
    if analysis.reversals > 0 {
        analysis.avg_reversal_magnitude = magnitude / Decimal::from(analysis.reversals as i64);
    }

    analysis
}

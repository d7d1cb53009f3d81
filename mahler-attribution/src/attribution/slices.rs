//! Slice attribution: trade-level results grouped by classifier.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::data::money::pct_of;

use super::exit_reason::normalize_reason_token;
use super::types::TradeAttribution;

/// Built-in trade classifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SliceClassifier {
    Underlying,
    /// Position side × option right, e.g. `SHORT_PUT`.
    SideAndRight,
    /// Entry IV rank bucket.
    EntryIvRank,
    ExitReason,
}

type ClassifyFn = fn(&TradeAttribution) -> String;

const CLASSIFIERS: &[(SliceClassifier, ClassifyFn)] = &[
    (SliceClassifier::Underlying, by_underlying),
    (SliceClassifier::SideAndRight, by_side_and_right),
    (SliceClassifier::EntryIvRank, by_entry_iv_rank),
    (SliceClassifier::ExitReason, by_exit_reason),
];

impl SliceClassifier {
    pub const ALL: [SliceClassifier; 4] = [
        Self::Underlying,
        Self::SideAndRight,
        Self::EntryIvRank,
        Self::ExitReason,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Underlying => "underlying",
            Self::SideAndRight => "side_and_right",
            Self::EntryIvRank => "entry_iv_rank",
            Self::ExitReason => "exit_reason",
        }
    }

    /// Label for one trade.
    pub fn classify(&self, trade: &TradeAttribution) -> String {
        CLASSIFIERS
            .iter()
            .find(|(c, _)| c == self)
            .map(|(_, f)| f(trade))
            .unwrap_or_else(|| "UNKNOWN".to_string())
    }
}

fn by_underlying(trade: &TradeAttribution) -> String {
    trade.underlying.clone()
}

fn by_side_and_right(trade: &TradeAttribution) -> String {
    format!("{}_{}", trade.side.label(), trade.option_type.label())
}

fn by_entry_iv_rank(trade: &TradeAttribution) -> String {
    iv_rank_bucket(trade.entry_iv_rank).to_string()
}

fn by_exit_reason(trade: &TradeAttribution) -> String {
    normalize_reason_token(trade.exit_reason_type, trade.exit_reason.as_deref())
}

/// LOW below 30, MEDIUM 30 to 70, HIGH above 70.
pub fn iv_rank_bucket(iv_rank: Option<f64>) -> &'static str {
    match iv_rank {
        Some(r) if r.is_finite() && r < 30.0 => "LOW",
        Some(r) if r.is_finite() && r <= 70.0 => "MEDIUM",
        Some(r) if r.is_finite() => "HIGH",
        _ => "UNKNOWN",
    }
}

/// Performance of one group of trades.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SliceStats {
    pub label: String,
    pub trade_count: usize,
    pub total_pnl: Decimal,
    pub avg_pnl: Decimal,
    pub win_rate: f64,
    /// Share of the signed PnL across all trades, in percent.
    pub contribution_pct: f64,
    pub delta_pnl: Decimal,
    pub gamma_pnl: Decimal,
    pub theta_pnl: Decimal,
    pub vega_pnl: Decimal,
    pub residual: Decimal,
    pub avg_holding_days: f64,
    pub max_win: Decimal,
    pub max_loss: Decimal,
}

impl SliceStats {
    fn from_trades(label: String, trades: &[&TradeAttribution], all_pnl: Decimal) -> Self {
        let count = trades.len();
        let total: Decimal = trades.iter().map(|t| t.total_pnl).sum();
        let winners = trades.iter().filter(|t| t.is_winner()).count();
        let holding: usize = trades.iter().map(|t| t.holding_days).sum();

        let (avg_pnl, win_rate, avg_holding_days) = if count == 0 {
            (Decimal::ZERO, 0.0, 0.0)
        } else {
            (
                total / Decimal::from(count as i64),
                winners as f64 / count as f64,
                holding as f64 / count as f64,
            )
        };

        Self {
            label,
            trade_count: count,
            total_pnl: total,
            avg_pnl,
            win_rate,
            contribution_pct: pct_of(total, all_pnl),
            delta_pnl: trades.iter().map(|t| t.delta_pnl).sum(),
            gamma_pnl: trades.iter().map(|t| t.gamma_pnl).sum(),
            theta_pnl: trades.iter().map(|t| t.theta_pnl).sum(),
            vega_pnl: trades.iter().map(|t| t.vega_pnl).sum(),
            residual: trades.iter().map(|t| t.residual).sum(),
            avg_holding_days,
            max_win: trades
                .iter()
                .map(|t| t.total_pnl)
                .filter(|p| *p > Decimal::ZERO)
                .max()
                .unwrap_or(Decimal::ZERO),
            max_loss: trades
                .iter()
                .map(|t| t.total_pnl)
                .filter(|p| *p < Decimal::ZERO)
                .min()
                .unwrap_or(Decimal::ZERO),
        }
    }
}

/// Group trades by one classifier. Groups come back ordered by label and
/// every trade lands in exactly one group.
pub fn slice(trades: &[TradeAttribution], classifier: SliceClassifier) -> Vec<SliceStats> {
    let all_pnl: Decimal = trades.iter().map(|t| t.total_pnl).sum();

    let mut groups: BTreeMap<String, Vec<&TradeAttribution>> = BTreeMap::new();
    for trade in trades {
        groups
            .entry(classifier.classify(trade))
            .or_default()
            .push(trade);
    }

    groups
        .into_iter()
        .map(|(label, group)| SliceStats::from_trades(label, &group, all_pnl))
        .collect()
}

/// Run every built-in classifier.
pub fn slice_all(trades: &[TradeAttribution]) -> BTreeMap<&'static str, Vec<SliceStats>> {
    SliceClassifier::ALL
        .iter()
        .map(|c| (c.name(), slice(trades, *c)))
        .collect()
}

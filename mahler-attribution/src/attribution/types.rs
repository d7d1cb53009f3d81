//! Attribution output records.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::money::pct_of;
use crate::data::{ExitReasonType, OptionType, PositionSide, TradeAction};
use crate::snapshot::SnapshotError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AttributionError {
    #[error("Trade record on {date} has no position id")]
    MissingTradePositionId { date: NaiveDate },

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// What a position-day row was measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributionBasis {
    /// Previous trading day's snapshot.
    PriorSnapshot,
    /// Entry-day snapshot rebuilt from the open trade.
    SyntheticEntry,
    /// No usable baseline; everything is residual.
    ResidualOnly,
    /// Position closed or expired; measured to the exit fill.
    Terminal,
}

/// The four Greek components of a PnL move.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GreekPnl {
    pub delta: Decimal,
    pub gamma: Decimal,
    pub theta: Decimal,
    pub vega: Decimal,
}

impl GreekPnl {
    pub fn explained(&self) -> Decimal {
        self.delta + self.gamma + self.theta + self.vega
    }
}

impl std::ops::AddAssign for GreekPnl {
    fn add_assign(&mut self, rhs: Self) {
        self.delta += rhs.delta;
        self.gamma += rhs.gamma;
        self.theta += rhs.theta;
        self.vega += rhs.vega;
    }
}

/// One position's PnL breakdown for one day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionDailyAttribution {
    pub date: NaiveDate,
    pub position_id: String,
    pub underlying: String,
    pub basis: AttributionBasis,

    pub delta_pnl: Decimal,
    pub gamma_pnl: Decimal,
    pub theta_pnl: Decimal,
    pub vega_pnl: Decimal,
    pub residual: Decimal,
    pub actual_pnl: Decimal,

    /// Underlying price change.
    pub underlying_move: Decimal,
    /// Underlying price change in percent of the prior price.
    pub underlying_move_pct: f64,
    /// IV change as a decimal fraction, when both sides are known.
    pub iv_change: Option<f64>,
}

impl PositionDailyAttribution {
    /// Build a row whose residual closes the gap to `actual_pnl`.
    pub fn reconciled(
        date: NaiveDate,
        position_id: &str,
        underlying: &str,
        basis: AttributionBasis,
        components: GreekPnl,
        actual_pnl: Decimal,
    ) -> Self {
        Self {
            date,
            position_id: position_id.to_string(),
            underlying: underlying.to_string(),
            basis,
            delta_pnl: components.delta,
            gamma_pnl: components.gamma,
            theta_pnl: components.theta,
            vega_pnl: components.vega,
            residual: actual_pnl - components.explained(),
            actual_pnl,
            underlying_move: Decimal::ZERO,
            underlying_move_pct: 0.0,
            iv_change: None,
        }
    }

    pub fn components(&self) -> GreekPnl {
        GreekPnl {
            delta: self.delta_pnl,
            gamma: self.gamma_pnl,
            theta: self.theta_pnl,
            vega: self.vega_pnl,
        }
    }

    pub fn is_reconciled(&self) -> bool {
        self.components().explained() + self.residual == self.actual_pnl
    }
}

/// Portfolio PnL breakdown for one day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyAttribution {
    pub date: NaiveDate,
    pub total_pnl: Decimal,
    pub delta_pnl: Decimal,
    pub gamma_pnl: Decimal,
    pub theta_pnl: Decimal,
    pub vega_pnl: Decimal,
    pub residual: Decimal,

    /// Component share of |total|, in percent.
    pub delta_pnl_pct: f64,
    pub gamma_pnl_pct: f64,
    pub theta_pnl_pct: f64,
    pub vega_pnl_pct: f64,
    pub residual_pct: f64,

    pub position_count: usize,
    pub positions: Vec<PositionDailyAttribution>,
}

impl DailyAttribution {
    pub fn from_positions(date: NaiveDate, positions: Vec<PositionDailyAttribution>) -> Self {
        let mut components = GreekPnl::default();
        let mut residual = Decimal::ZERO;
        let mut total = Decimal::ZERO;

        for row in &positions {
            components += row.components();
            residual += row.residual;
            total += row.actual_pnl;
        }

        Self {
            date,
            total_pnl: total,
            delta_pnl: components.delta,
            gamma_pnl: components.gamma,
            theta_pnl: components.theta,
            vega_pnl: components.vega,
            residual,
            delta_pnl_pct: pct_of(components.delta, total),
            gamma_pnl_pct: pct_of(components.gamma, total),
            theta_pnl_pct: pct_of(components.theta, total),
            vega_pnl_pct: pct_of(components.vega, total),
            residual_pct: pct_of(residual, total),
            position_count: positions.len(),
            positions,
        }
    }

    pub fn is_reconciled(&self) -> bool {
        self.delta_pnl + self.gamma_pnl + self.theta_pnl + self.vega_pnl + self.residual
            == self.total_pnl
    }
}

/// One position's attribution over its whole life.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeAttribution {
    pub position_id: String,
    pub underlying: String,
    pub symbol: String,
    pub option_type: OptionType,
    pub side: PositionSide,
    pub strike: Decimal,
    pub expiration: NaiveDate,

    pub entry_date: NaiveDate,
    /// Close/expire trade date, or the last snapshot date if still open.
    pub exit_date: NaiveDate,
    /// Terminal trade action, `None` while still open.
    pub closed_by: Option<TradeAction>,
    pub exit_reason: Option<String>,
    pub exit_reason_type: Option<ExitReasonType>,
    /// Number of attribution rows, not calendar span.
    pub holding_days: usize,

    pub total_pnl: Decimal,
    pub delta_pnl: Decimal,
    pub gamma_pnl: Decimal,
    pub theta_pnl: Decimal,
    pub vega_pnl: Decimal,
    pub residual: Decimal,
    /// Realized PnL reported on the terminal trade.
    pub realized_pnl: Option<Decimal>,

    pub entry_iv: Option<f64>,
    pub exit_iv: Option<f64>,
    pub entry_underlying_price: Decimal,
    pub exit_underlying_price: Decimal,
    pub entry_iv_rank: Option<f64>,
    /// Position-level vega on the first snapshot.
    pub entry_vega: Option<f64>,

    pub quantity: i32,
    pub entry_price: Decimal,
    pub lot_size: u32,
}

impl TradeAttribution {
    pub fn is_winner(&self) -> bool {
        self.total_pnl > Decimal::ZERO
    }

    pub fn is_closed(&self) -> bool {
        self.closed_by.is_some()
    }

    pub fn expired(&self) -> bool {
        self.closed_by == Some(TradeAction::Expire)
            || self.exit_reason_type == Some(ExitReasonType::Expired)
    }

    /// Realized PnL when reported, else the attributed total.
    pub fn actual_pnl(&self) -> Decimal {
        self.realized_pnl.unwrap_or(self.total_pnl)
    }
}

/// A position that dropped out of the snapshot stream with no close or
/// expire record to measure its last move against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnattributedDisappearance {
    pub position_id: String,
    pub underlying: String,
    pub last_seen: NaiveDate,
    pub missing_on: NaiveDate,
}

/// Everything one attribution pass produces.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttributionRun {
    pub daily: Vec<DailyAttribution>,
    pub trades: Vec<TradeAttribution>,
    pub unattributed: Vec<UnattributedDisappearance>,
}

/// Headline totals over an [`AttributionRun`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributionSummary {
    pub days: usize,
    pub position_days: usize,
    pub trades: usize,
    pub total_pnl: Decimal,
    pub delta_pnl: Decimal,
    pub gamma_pnl: Decimal,
    pub theta_pnl: Decimal,
    pub vega_pnl: Decimal,
    pub residual: Decimal,
    pub residual_pct: f64,
    pub synthetic_entries: usize,
    pub residual_only_rows: usize,
    pub unattributed: usize,
}

impl AttributionRun {
    pub fn summary(&self) -> AttributionSummary {
        let mut summary = AttributionSummary {
            days: self.daily.len(),
            trades: self.trades.len(),
            unattributed: self.unattributed.len(),
            ..AttributionSummary::default()
        };

        for day in &self.daily {
            summary.position_days += day.position_count;
            summary.total_pnl += day.total_pnl;
            summary.delta_pnl += day.delta_pnl;
            summary.gamma_pnl += day.gamma_pnl;
            summary.theta_pnl += day.theta_pnl;
            summary.vega_pnl += day.vega_pnl;
            summary.residual += day.residual;

            for row in &day.positions {
                match row.basis {
                    AttributionBasis::SyntheticEntry => summary.synthetic_entries += 1,
                    AttributionBasis::ResidualOnly => summary.residual_only_rows += 1,
                    _ => {}
                }
            }
        }
        summary.residual_pct = pct_of(summary.residual, summary.total_pnl);

        summary
    }

    /// Daily PnL keyed by date.
    pub fn daily_pnl(&self) -> std::collections::BTreeMap<NaiveDate, Decimal> {
        self.daily.iter().map(|d| (d.date, d.total_pnl)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn row(basis: AttributionBasis, delta: Decimal, actual: Decimal) -> PositionDailyAttribution {
        PositionDailyAttribution::reconciled(
            date(3),
            "P1",
            "SPY",
            basis,
            GreekPnl {
                delta,
                theta: dec!(-1.5),
                ..GreekPnl::default()
            },
            actual,
        )
    }

    #[test]
    fn test_row_residual_closes_gap() {
        let r = row(AttributionBasis::PriorSnapshot, dec!(10.123456), dec!(7));
        assert_eq!(r.residual, dec!(-1.623456));
        assert!(r.is_reconciled());
    }

    #[test]
    fn test_daily_aggregation_and_percentages() {
        let daily = DailyAttribution::from_positions(
            date(3),
            vec![
                row(AttributionBasis::PriorSnapshot, dec!(20), dec!(15)),
                row(AttributionBasis::ResidualOnly, dec!(0), dec!(-5)),
            ],
        );
        assert_eq!(daily.total_pnl, dec!(10));
        assert_eq!(daily.delta_pnl, dec!(20));
        assert_eq!(daily.theta_pnl, dec!(-3));
        assert!(daily.is_reconciled());
        assert!((daily.delta_pnl_pct - 200.0).abs() < 1e-9);
        assert!((daily.theta_pnl_pct + 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_total_percentages() {
        let daily = DailyAttribution::from_positions(
            date(3),
            vec![
                row(AttributionBasis::PriorSnapshot, dec!(4), dec!(3)),
                row(AttributionBasis::PriorSnapshot, dec!(-4), dec!(-3)),
            ],
        );
        assert_eq!(daily.total_pnl, Decimal::ZERO);
        assert_eq!(daily.delta_pnl_pct, 0.0);
        assert_eq!(daily.gamma_pnl_pct, 0.0);
        assert_eq!(daily.theta_pnl_pct, 0.0);
        assert_eq!(daily.vega_pnl_pct, 0.0);
        assert_eq!(daily.residual_pct, 0.0);

        let empty = DailyAttribution::from_positions(date(4), Vec::new());
        assert_eq!(empty.residual_pct, 0.0);
        assert!(empty.is_reconciled());
    }

    #[test]
    fn test_summary_counts_bases() {
        let run = AttributionRun {
            daily: vec![DailyAttribution::from_positions(
                date(3),
                vec![
                    row(AttributionBasis::SyntheticEntry, dec!(1), dec!(2)),
                    row(AttributionBasis::ResidualOnly, dec!(0), dec!(2)),
                ],
            )],
            trades: Vec::new(),
            unattributed: vec![UnattributedDisappearance {
                position_id: "P9".to_string(),
                underlying: "QQQ".to_string(),
                last_seen: date(2),
                missing_on: date(3),
            }],
        };

        let summary = run.summary();
        assert_eq!(summary.days, 1);
        assert_eq!(summary.position_days, 2);
        assert_eq!(summary.synthetic_entries, 1);
        assert_eq!(summary.residual_only_rows, 1);
        assert_eq!(summary.unattributed, 1);
        assert_eq!(summary.total_pnl, dec!(4));
        assert_eq!(run.daily_pnl()[&date(3)], dec!(4));
    }
}

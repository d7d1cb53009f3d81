//! End-to-end analysis over one simulation run.
//!
//! Snapshots, attribution, slices, regimes and diagnosis in one pass.

use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::attribution::{
    slice_all, AttributionError, AttributionRun, AttributionSummary, PnlAttributionEngine,
    SliceStats,
};
use crate::config::AnalysisConfig;
use crate::data::{CachedMarketData, MarketDataProvider, RawPositionRecord, TradeRecord};
use crate::diagnosis::{StrategyDiagnosis, StrategyDiagnosisReport};
use crate::regime::{regime_stats, DayRegime, RegimeAnalyzer, RegimeStats};
use crate::snapshot::{PortfolioGreeks, SnapshotBuilder};

/// Everything produced for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub attribution: AttributionRun,
    /// Slice rows keyed by classifier name.
    pub slices: BTreeMap<String, Vec<SliceStats>>,
    pub regimes: Vec<DayRegime>,
    pub regime_stats: Vec<RegimeStats>,
    pub diagnosis: StrategyDiagnosisReport,
    pub portfolio_greeks: BTreeMap<NaiveDate, PortfolioGreeks>,
}

impl AnalysisReport {
    pub fn attribution_summary(&self) -> AttributionSummary {
        self.attribution.summary()
    }

    /// Human-readable report.
    pub fn summary(&self) -> String {
        let s = self.attribution_summary();
        let mut out = String::new();

        let _ = writeln!(out, "=== PnL Attribution ===");
        let _ = writeln!(
            out,
            "Days: {}  Position-days: {}  Trades: {}",
            s.days, s.position_days, s.trades
        );
        let _ = writeln!(out, "Total PnL: {}", s.total_pnl.round_dp(2));
        let _ = writeln!(out, "  Delta:    {}", s.delta_pnl.round_dp(2));
        let _ = writeln!(out, "  Gamma:    {}", s.gamma_pnl.round_dp(2));
        let _ = writeln!(out, "  Theta:    {}", s.theta_pnl.round_dp(2));
        let _ = writeln!(out, "  Vega:     {}", s.vega_pnl.round_dp(2));
        let _ = writeln!(
            out,
            "  Residual: {} ({:.1}%)",
            s.residual.round_dp(2),
            s.residual_pct
        );
        if s.synthetic_entries > 0 || s.residual_only_rows > 0 || s.unattributed > 0 {
            let _ = writeln!(
                out,
                "Synthetic entries: {}  Residual-only rows: {}  Unattributed exits: {}",
                s.synthetic_entries, s.residual_only_rows, s.unattributed
            );
        }

        for (name, rows) in &self.slices {
            let _ = writeln!(out, "\n--- By {} ---", name);
            for row in rows {
                let _ = writeln!(
                    out,
                    "{:<24} trades={:<4} pnl={:>12} win={:>5.1}% share={:>6.1}%",
                    row.label,
                    row.trade_count,
                    row.total_pnl.round_dp(2),
                    row.win_rate * 100.0,
                    row.contribution_pct
                );
            }
        }

        if !self.regime_stats.is_empty() {
            let _ = writeln!(out, "\n--- By regime ---");
            for stats in &self.regime_stats {
                let _ = writeln!(
                    out,
                    "{:<32} days={:<4} pnl={:>12} win={:>5.1}% sharpe={}",
                    stats.label,
                    stats.trading_days,
                    stats.total_pnl.round_dp(2),
                    stats.win_rate * 100.0,
                    stats
                        .sharpe_ratio
                        .map_or_else(|| "n/a".to_string(), |v| format!("{:.2}", v))
                );
            }
        }

        let entry = &self.diagnosis.entry_summary;
        let exit = &self.diagnosis.exit_summary;
        let reversals = &self.diagnosis.reversals;
        let _ = writeln!(out, "\n--- Diagnosis ---");
        let _ = writeln!(
            out,
            "Entries measured: {}/{}  positive VRP: {}  VRP captured: {}",
            entry.measured,
            entry.trades,
            entry.positive_spread,
            entry.total_vrp_captured.round_dp(2)
        );
        let _ = writeln!(
            out,
            "Exits analyzed: {}  good: {:.1}%  net value: {}",
            exit.analyzed,
            exit.good_exit_rate * 100.0,
            exit.net_value.round_dp(2)
        );
        let _ = write!(
            out,
            "Stop-loss reversals: {}/{} ({:.1}%)",
            reversals.reversals,
            reversals.analyzed,
            reversals.reversal_rate * 100.0
        );

        out
    }
}

/// Runs every analysis stage with one configuration.
#[derive(Debug, Clone, Default)]
pub struct AnalysisPipeline {
    config: AnalysisConfig,
}

impl AnalysisPipeline {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn run<M: MarketDataProvider + ?Sized>(
        &self,
        records: &[RawPositionRecord],
        trades: &[TradeRecord],
        market: &M,
    ) -> Result<AnalysisReport, AttributionError> {
        let builder = SnapshotBuilder::new(self.config.pricing.clone());
        let snapshots = builder.build_all(records)?;

        let attribution = PnlAttributionEngine::new(builder).run(&snapshots, trades)?;

        let slices = slice_all(&attribution.trades)
            .into_iter()
            .map(|(name, rows)| (name.to_string(), rows))
            .collect();

        // Regime and diagnosis lookups repeat the same ranges.
        let market = CachedMarketData::new(market);

        let dates: Vec<NaiveDate> = attribution.daily.iter().map(|d| d.date).collect();
        let regimes =
            RegimeAnalyzer::new(self.config.regime.clone()).classify_days(&dates, &market);
        let regime_stats = regime_stats(&regimes, &attribution.daily_pnl());

        let diagnosis =
            StrategyDiagnosis::new(self.config.diagnosis.clone()).run(&attribution.trades, &market);

        info!(
            snapshots = snapshots.len(),
            regimes = regime_stats.len(),
            market_ranges = market.cached_ranges(),
            "Analysis complete"
        );

        Ok(AnalysisReport {
            portfolio_greeks: PortfolioGreeks::by_day(&snapshots),
            attribution,
            slices,
            regimes,
            regime_stats,
            diagnosis,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Greeks, InMemoryMarketData, OptionType, TradeAction};
    use crate::snapshot::SnapshotError;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn record(day: u32, spot: Decimal, price: Decimal) -> RawPositionRecord {
        RawPositionRecord {
            date: date(day),
            position_id: Some("P1".to_string()),
            underlying: "SPY".to_string(),
            symbol: "SPY240329P00100000".to_string(),
            option_type: OptionType::Put,
            strike: dec!(100),
            expiration: date(29),
            quantity: -1,
            lot_size: 100,
            underlying_price: spot,
            option_price: price,
            iv: Some(0.2),
            greeks: Some(Greeks {
                delta: 0.4,
                gamma: 0.05,
                theta: 0.08,
                vega: 0.1,
                rho: 0.0,
            }),
            market_value: None,
            unrealized_pnl: None,
            hv: None,
            iv_rank: Some(55.0),
            iv_percentile: None,
            dte: None,
            entry_price: dec!(2.0),
            entry_date: Some(date(4)),
        }
    }

    fn trades() -> Vec<TradeRecord> {
        let open = TradeRecord {
            position_id: Some("P1".to_string()),
            action: TradeAction::Open,
            trade_date: date(4),
            underlying: "SPY".to_string(),
            symbol: "SPY240329P00100000".to_string(),
            option_type: OptionType::Put,
            strike: dec!(100),
            expiration: date(29),
            quantity: -1,
            lot_size: 100,
            fill_price: dec!(2.0),
            underlying_price: Some(dec!(100)),
            realized_pnl: None,
            reason: None,
            reason_type: None,
            iv_rank: Some(55.0),
        };
        let close = TradeRecord {
            action: TradeAction::Close,
            trade_date: date(7),
            fill_price: dec!(1.2),
            underlying_price: Some(dec!(103)),
            realized_pnl: Some(dec!(80)),
            reason: Some("take profit".to_string()),
            iv_rank: None,
            ..open.clone()
        };
        vec![open, close]
    }

    #[test]
    fn test_pipeline_end_to_end() {
        let records = vec![
            record(5, dec!(101), dec!(1.8)),
            record(6, dec!(102), dec!(1.5)),
        ];
        let market = InMemoryMarketData::new()
            .with_closes("VIX", [(date(5), 14.0), (date(6), 14.5), (date(7), 14.2)])
            .with_closes("SPY", [(date(5), 101.0), (date(6), 102.0), (date(7), 103.0)]);

        let report = AnalysisPipeline::default()
            .run(&records, &trades(), &market)
            .unwrap();

        // Synthetic entry on the 5th, prior snapshot on the 6th, terminal on the 7th.
        assert_eq!(report.attribution.daily.len(), 3);
        assert!(report.attribution.daily.iter().all(|d| d.is_reconciled()));
        assert_eq!(report.attribution.trades.len(), 1);
        assert_eq!(report.slices.len(), 4);
        assert_eq!(report.slices["underlying"][0].trade_count, 1);

        assert_eq!(report.regimes.len(), 3);
        assert!(report.regimes.iter().all(|r| r.label.starts_with("LOW_VOL")));
        let regime_days: usize = report.regime_stats.iter().map(|s| s.trading_days).sum();
        assert_eq!(regime_days, 3);

        // Realized PnL is what the trade row reports for its exit.
        assert_eq!(report.diagnosis.exits[0].actual_pnl, dec!(80));
        assert_eq!(report.portfolio_greeks.len(), 2);

        let summary = report.summary();
        assert!(summary.contains("PnL Attribution"));
        assert!(summary.contains("By regime"));
    }

    #[test]
    fn test_pipeline_rejects_missing_position_id() {
        let mut bad = record(5, dec!(101), dec!(1.8));
        bad.position_id = None;

        let result =
            AnalysisPipeline::default().run(&[bad], &trades(), &InMemoryMarketData::new());
        assert!(matches!(
            result,
            Err(AttributionError::Snapshot(SnapshotError::MissingPositionId { .. }))
        ));
    }

    #[test]
    fn test_empty_inputs() {
        let report = AnalysisPipeline::default()
            .run(&[], &[], &InMemoryMarketData::new())
            .unwrap();
        assert!(report.attribution.daily.is_empty());
        assert!(report.regimes.is_empty());
        assert!(report.summary().contains("Trades: 0"));
    }
}

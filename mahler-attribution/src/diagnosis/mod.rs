//! Strategy diagnosis module.
//!
//! Looks at trade-level attribution from two angles:
//! - Entry: was implied vol rich against what was later realized
//! - Exit: did closing early beat holding to expiration
//! - Reversals: how often a stop-loss exit would have recovered

pub mod entry;
pub mod exit;

use serde::{Deserialize, Serialize};

use crate::attribution::TradeAttribution;
use crate::data::MarketDataProvider;
use crate::metrics::ANNUALIZATION_DAYS;

pub use entry::{EntryQuality, EntryQualitySummary};
pub use exit::{ExitQuality, ExitQualitySummary, ReversalAnalysis, ReversalBucket};

/// Diagnosis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosisConfig {
    /// Longest window of daily returns used for realized vol.
    pub realized_vol_window: usize,
    /// Trading days per year.
    pub annualization: f64,
}

impl Default for DiagnosisConfig {
    fn default() -> Self {
        Self {
            realized_vol_window: 20,
            annualization: ANNUALIZATION_DAYS,
        }
    }
}

/// Everything the diagnosis pass produces.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyDiagnosisReport {
    pub entries: Vec<EntryQuality>,
    pub entry_summary: EntryQualitySummary,
    pub exits: Vec<ExitQuality>,
    pub exit_summary: ExitQualitySummary,
    pub reversals: ReversalAnalysis,
}

/// Entry and exit quality analyzer.
#[derive(Debug, Clone, Default)]
pub struct StrategyDiagnosis {
    config: DiagnosisConfig,
}

impl StrategyDiagnosis {
    pub fn new(config: DiagnosisConfig) -> Self {
        Self { config }
    }

    pub fn entry_quality<M: MarketDataProvider + ?Sized>(
        &self,
        trades: &[TradeAttribution],
        market: &M,
    ) -> Vec<EntryQuality> {
        entry::analyze(&self.config, trades, market)
    }

    pub fn exit_quality<M: MarketDataProvider + ?Sized>(
        &self,
        trades: &[TradeAttribution],
        market: &M,
    ) -> Vec<ExitQuality> {
        exit::analyze(trades, market)
    }

    /// Reversal analysis over exit rows produced by [`Self::exit_quality`]
    /// for the same trades.
    pub fn reversal_analysis(
        &self,
        trades: &[TradeAttribution],
        exits: &[ExitQuality],
    ) -> ReversalAnalysis {
        exit::reversals(trades, exits)
    }

    pub fn run<M: MarketDataProvider + ?Sized>(
        &self,
        trades: &[TradeAttribution],
        market: &M,
    ) -> StrategyDiagnosisReport {
        let entries = self.entry_quality(trades, market);
        let exits = self.exit_quality(trades, market);
        let reversals = self.reversal_analysis(trades, &exits);

        StrategyDiagnosisReport {
            entry_summary: entry::summarize(&entries),
            exit_summary: exit::summarize(&exits),
            entries,
            exits,
            reversals,
        }
    }
}

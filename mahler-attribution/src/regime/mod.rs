//! Market regime module.
//!
//! Labels trading days from market conditions:
//! - VIX level: LOW < 15, NORMAL 15-20, ELEVATED 20-25, HIGH >= 25
//! - VIX trend against its trailing mean
//! - SPY five-day trend
//! - Macro event blackouts

pub mod analyzer;

pub use analyzer::{
    regime_stats, DayRegime, RegimeAnalyzer, RegimeAnalyzerConfig, RegimeStats, SpyTrend,
    VixLevel, VixTrend,
};

//! Performance metrics module.
//!
//! Provides the statistics shared by regime and diagnosis analysis:
//! - Historical volatility
//! - Sharpe ratio
//! - Win rate

pub mod calculator;

pub use calculator::{MetricsCalculator, ANNUALIZATION_DAYS};

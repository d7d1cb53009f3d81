//! Performance and volatility statistics.

use rust_decimal::Decimal;
use statrs::statistics::Statistics;

use crate::data::money::to_f64;

/// Trading days per year.
pub const ANNUALIZATION_DAYS: f64 = 252.0;

/// Metrics calculator.
pub struct MetricsCalculator;

impl MetricsCalculator {
    /// Annualized close-to-close historical volatility.
    ///
    /// Uses log returns over the most recent `min(closes - 1, max_window)`
    /// days. Needs at least three valid closes.
    pub fn historical_volatility(
        closes: &[f64],
        max_window: usize,
        annualization: f64,
    ) -> Option<f64> {
        let valid: Vec<f64> = closes
            .iter()
            .copied()
            .filter(|c| c.is_finite() && *c > 0.0)
            .collect();
        if valid.len() < 3 {
            return None;
        }

        let returns: Vec<f64> = valid.windows(2).map(|w| (w[1] / w[0]).ln()).collect();
        let window = (valid.len() - 1).min(max_window);
        if window < 2 {
            return None;
        }

        let recent = &returns[returns.len() - window..];
        let std_dev = recent.std_dev();
        if !std_dev.is_finite() {
            return None;
        }

        Some(std_dev * annualization.sqrt())
    }

    /// Annualized Sharpe ratio of a daily PnL series (risk-free rate = 0).
    ///
    /// `None` with fewer than two observations or zero dispersion.
    pub fn sharpe_ratio(daily: &[f64], annualization: f64) -> Option<f64> {
        if daily.len() < 2 {
            return None;
        }

        let mean = daily.mean();
        let std_dev = daily.std_dev();
        if !std_dev.is_finite() || std_dev == 0.0 {
            return None;
        }

        Some(mean / std_dev * annualization.sqrt())
    }

    /// Fraction of strictly positive values, 0 when empty.
    pub fn win_rate(pnls: &[Decimal]) -> f64 {
        if pnls.is_empty() {
            return 0.0;
        }
        let winners = pnls.iter().filter(|p| **p > Decimal::ZERO).count();
        winners as f64 / pnls.len() as f64
    }

    /// Daily PnL amounts as floats for the statistics above.
    pub fn to_series(pnls: &[Decimal]) -> Vec<f64> {
        pnls.iter().map(|p| to_f64(*p)).collect()
    }
}

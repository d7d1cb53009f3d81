//! Market regime labelling.
//!
//! Labels each trading day from the VIX level, the VIX trend, the SPY trend
//! and the macro event calendar, then summarizes attribution PnL per label.
//! Labels are independent of attribution output and joined by date.

use std::collections::{BTreeMap, HashMap};

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::data::money::to_f64;
use crate::data::MarketDataProvider;
use crate::metrics::{MetricsCalculator, ANNUALIZATION_DAYS};

/// VIX level bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VixLevel {
    Low,
    Normal,
    Elevated,
    High,
    Unknown,
}

impl VixLevel {
    pub fn token(&self) -> &'static str {
        match self {
            Self::Low => "LOW_VOL",
            Self::Normal => "NORMAL_VOL",
            Self::Elevated => "ELEVATED_VOL",
            Self::High => "HIGH_VOL",
            Self::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VixTrend {
    Rising,
    Falling,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpyTrend {
    Bullish,
    Bearish,
    Neutral,
}

impl SpyTrend {
    pub fn token(&self) -> &'static str {
        match self {
            Self::Bullish => "BULLISH",
            Self::Bearish => "BEARISH",
            Self::Neutral => "NEUTRAL",
        }
    }
}

/// Event token used when no blackout applies.
pub const NO_EVENT: &str = "NONE";

/// Market conditions on one trading day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayRegime {
    pub date: NaiveDate,
    pub vix_close: Option<f64>,
    pub vix_level: VixLevel,
    pub vix_trend: VixTrend,
    pub spy_trend: SpyTrend,
    /// Macro event type, or `"NONE"`.
    pub event: String,
    /// Composite label, e.g. `ELEVATED_VOL_BEARISH_FOMC`.
    pub label: String,
}

/// Regime analyzer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeAnalyzerConfig {
    pub vix_symbol: String,
    pub spy_symbol: String,
    /// VIX below this is LOW.
    pub vix_low: f64,
    /// VIX below this is NORMAL.
    pub vix_normal: f64,
    /// VIX below this is ELEVATED, else HIGH.
    pub vix_elevated: f64,
    /// Relative band around the trailing VIX mean.
    pub vix_trend_band: f64,
    /// Calendar days scanned back for VIX history.
    pub vix_lookback_days: i64,
    /// Most trailing VIX values used.
    pub vix_max_points: usize,
    /// Fewer trailing values than this means STABLE.
    pub vix_min_points: usize,
    /// SPY return threshold for a trend.
    pub spy_trend_threshold: f64,
    /// Nearest calendar day searched back for the SPY base price.
    pub spy_lookback_min_days: i64,
    /// Farthest calendar day searched back for the SPY base price.
    pub spy_lookback_max_days: i64,
}

impl Default for RegimeAnalyzerConfig {
    fn default() -> Self {
        Self {
            vix_symbol: "VIX".to_string(),
            spy_symbol: "SPY".to_string(),
            vix_low: 15.0,
            vix_normal: 20.0,
            vix_elevated: 25.0,
            vix_trend_band: 0.05,
            vix_lookback_days: 7,
            vix_max_points: 5,
            vix_min_points: 3,
            spy_trend_threshold: 0.01,
            spy_lookback_min_days: 4,
            spy_lookback_max_days: 9,
        }
    }
}

/// PnL statistics for one regime label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeStats {
    pub label: String,
    pub trading_days: usize,
    pub total_pnl: Decimal,
    pub avg_pnl: Decimal,
    pub win_rate: f64,
    /// Most negative daily PnL, 0 if no losing day.
    pub max_daily_loss: Decimal,
    pub sharpe_ratio: Option<f64>,
}

/// Market regime analyzer.
#[derive(Debug, Clone, Default)]
pub struct RegimeAnalyzer {
    config: RegimeAnalyzerConfig,
}

impl RegimeAnalyzer {
    pub fn new(config: RegimeAnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RegimeAnalyzerConfig {
        &self.config
    }

    /// Label each date. Missing market data degrades to UNKNOWN, STABLE,
    /// NEUTRAL or NONE rather than failing.
    pub fn classify_days<M: MarketDataProvider + ?Sized>(
        &self,
        dates: &[NaiveDate],
        market: &M,
    ) -> Vec<DayRegime> {
        let (Some(first), Some(last)) = (dates.iter().min(), dates.iter().max()) else {
            return Vec::new();
        };

        let vix = self.series(
            market,
            &self.config.vix_symbol,
            *first - Duration::days(self.config.vix_lookback_days),
            *last,
        );
        let spy = self.series(
            market,
            &self.config.spy_symbol,
            *first - Duration::days(self.config.spy_lookback_max_days),
            *last,
        );

        dates
            .iter()
            .map(|date| self.classify_day(*date, &vix, &spy, market))
            .collect()
    }

    fn series<M: MarketDataProvider + ?Sized>(
        &self,
        market: &M,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> BTreeMap<NaiveDate, f64> {
        market.daily_closes(symbol, start, end).unwrap_or_else(|e| {
            warn!(symbol, error = %e, "Regime series unavailable");
            BTreeMap::new()
        })
    }

    fn classify_day<M: MarketDataProvider + ?Sized>(
        &self,
        date: NaiveDate,
        vix: &BTreeMap<NaiveDate, f64>,
        spy: &BTreeMap<NaiveDate, f64>,
        market: &M,
    ) -> DayRegime {
        let vix_close = vix.get(&date).copied();
        let vix_level = vix_close.map_or(VixLevel::Unknown, |v| self.vix_level(v));
        let vix_trend = vix_close.map_or(VixTrend::Stable, |v| self.vix_trend(date, v, vix));
        let spy_trend = self.spy_trend(date, spy);

        let event = match market.event_blackout(date) {
            Ok(events) => events
                .into_iter()
                .next()
                .map(|e| e.event_type)
                .unwrap_or_else(|| NO_EVENT.to_string()),
            Err(e) => {
                warn!(%date, error = %e, "Event calendar unavailable");
                NO_EVENT.to_string()
            }
        };

        let mut label = format!("{}_{}", vix_level.token(), spy_trend.token());
        if event != NO_EVENT {
            label.push('_');
            label.push_str(&event);
        }

        DayRegime {
            date,
            vix_close,
            vix_level,
            vix_trend,
            spy_trend,
            event,
            label,
        }
    }

    pub fn vix_level(&self, vix: f64) -> VixLevel {
        if !vix.is_finite() {
            VixLevel::Unknown
        } else if vix < self.config.vix_low {
            VixLevel::Low
        } else if vix < self.config.vix_normal {
            VixLevel::Normal
        } else if vix < self.config.vix_elevated {
            VixLevel::Elevated
        } else {
            VixLevel::High
        }
    }

    fn vix_trend(&self, date: NaiveDate, current: f64, vix: &BTreeMap<NaiveDate, f64>) -> VixTrend {
        let trailing: Vec<f64> = (1..=self.config.vix_lookback_days)
            .filter_map(|back| vix.get(&(date - Duration::days(back))).copied())
            .take(self.config.vix_max_points)
            .collect();

        if trailing.len() < self.config.vix_min_points {
            return VixTrend::Stable;
        }

        let mean = trailing.iter().sum::<f64>() / trailing.len() as f64;
        if current > mean * (1.0 + self.config.vix_trend_band) {
            VixTrend::Rising
        } else if current < mean * (1.0 - self.config.vix_trend_band) {
            VixTrend::Falling
        } else {
            VixTrend::Stable
        }
    }

    fn spy_trend(&self, date: NaiveDate, spy: &BTreeMap<NaiveDate, f64>) -> SpyTrend {
        let Some(current) = spy.get(&date).copied() else {
            return SpyTrend::Neutral;
        };

        let base = (self.config.spy_lookback_min_days..=self.config.spy_lookback_max_days)
            .find_map(|back| spy.get(&(date - Duration::days(back))).copied())
            .filter(|b| *b > 0.0);

        let Some(base) = base else {
            return SpyTrend::Neutral;
        };

        let ret = current / base - 1.0;
        if ret > self.config.spy_trend_threshold {
            SpyTrend::Bullish
        } else if ret < -self.config.spy_trend_threshold {
            SpyTrend::Bearish
        } else {
            SpyTrend::Neutral
        }
    }
}

/// Group labelled days and summarize their attributed PnL. Days without an
/// attribution row count as zero PnL.
pub fn regime_stats(
    regimes: &[DayRegime],
    daily_pnl: &BTreeMap<NaiveDate, Decimal>,
) -> Vec<RegimeStats> {
    let mut groups: HashMap<&str, Vec<Decimal>> = HashMap::new();
    for regime in regimes {
        let pnl = daily_pnl.get(&regime.date).copied().unwrap_or(Decimal::ZERO);
        groups.entry(regime.label.as_str()).or_default().push(pnl);
    }

    let mut stats: Vec<RegimeStats> = groups
        .into_iter()
        .map(|(label, pnls)| {
            let total: Decimal = pnls.iter().copied().sum();
            let days = pnls.len();
            let series = MetricsCalculator::to_series(&pnls);

            RegimeStats {
                label: label.to_string(),
                trading_days: days,
                total_pnl: total,
                avg_pnl: total / Decimal::from(days as i64),
                win_rate: MetricsCalculator::win_rate(&pnls),
                max_daily_loss: pnls
                    .iter()
                    .copied()
                    .filter(|p| *p < Decimal::ZERO)
                    .min()
                    .unwrap_or(Decimal::ZERO),
                sharpe_ratio: MetricsCalculator::sharpe_ratio(&series, ANNUALIZATION_DAYS),
            }
        })
        .collect();

    stats.sort_by(|a, b| {
        b.trading_days
            .cmp(&a.trading_days)
            .then_with(|| a.label.cmp(&b.label))
    });

    let worst = stats
        .iter()
        .min_by(|a, b| a.avg_pnl.cmp(&b.avg_pnl))
        .map(|s| (s.label.as_str(), to_f64(s.avg_pnl)));
    if let Some((label, avg)) = worst {
        debug!(label, avg, "Weakest regime by average daily PnL");
    }

    stats
}

//! Market data collaborator interface.
//!
//! Attribution never fetches prices itself. Regime labelling and strategy
//! diagnosis read historical closes, the volatility index and the macro
//! event calendar through [`MarketDataProvider`]. A failed lookup is "data
//! unavailable", never a fatal error.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketDataError {
    #[error("No market data for {what}")]
    LookupMiss { what: String },

    #[error("Market data source failed: {0}")]
    Source(String),
}

/// A scheduled macro event and its blackout window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacroEvent {
    /// Event type token (e.g., "FOMC", "CPI").
    pub event_type: String,
    pub event_date: NaiveDate,
    pub blackout_start: NaiveDate,
    pub blackout_end: NaiveDate,
}

impl MacroEvent {
    pub fn covers(&self, date: NaiveDate) -> bool {
        date >= self.blackout_start && date <= self.blackout_end
    }
}

/// Read-only market data lookups.
pub trait MarketDataProvider {
    /// Daily closes for `symbol` over `[start, end]`, keyed by date.
    fn daily_closes(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, f64>, MarketDataError>;

    /// Events whose blackout window covers `date`, in calendar order.
    fn event_blackout(&self, date: NaiveDate) -> Result<Vec<MacroEvent>, MarketDataError>;

    /// Point-in-time close for `symbol` on exactly `date`.
    fn close_on(&self, symbol: &str, date: NaiveDate) -> Result<f64, MarketDataError> {
        self.daily_closes(symbol, date, date)?
            .get(&date)
            .copied()
            .ok_or_else(|| MarketDataError::LookupMiss {
                what: format!("{} close on {}", symbol, date),
            })
    }
}

/// Table-backed market data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMarketData {
    closes: HashMap<String, BTreeMap<NaiveDate, f64>>,
    events: Vec<MacroEvent>,
}

impl InMemoryMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_close(&mut self, symbol: &str, date: NaiveDate, close: f64) {
        self.closes
            .entry(symbol.to_string())
            .or_default()
            .insert(date, close);
    }

    pub fn with_closes<I>(mut self, symbol: &str, closes: I) -> Self
    where
        I: IntoIterator<Item = (NaiveDate, f64)>,
    {
        for (date, close) in closes {
            self.insert_close(symbol, date, close);
        }
        self
    }

    pub fn with_event(mut self, event: MacroEvent) -> Self {
        self.events.push(event);
        self.events.sort_by_key(|e| e.event_date);
        self
    }

    pub fn symbols(&self) -> Vec<&str> {
        let mut symbols: Vec<_> = self.closes.keys().map(|s| s.as_str()).collect();
        symbols.sort();
        symbols
    }
}

impl MarketDataProvider for InMemoryMarketData {
    fn daily_closes(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, f64>, MarketDataError> {
        let series = self
            .closes
            .get(symbol)
            .ok_or_else(|| MarketDataError::LookupMiss {
                what: format!("symbol {}", symbol),
            })?;

        if start > end {
            return Ok(BTreeMap::new());
        }

        Ok(series
            .range(start..=end)
            .map(|(d, c)| (*d, *c))
            .collect())
    }

    fn event_blackout(&self, date: NaiveDate) -> Result<Vec<MacroEvent>, MarketDataError> {
        Ok(self
            .events
            .iter()
            .filter(|e| e.covers(date))
            .cloned()
            .collect())
    }
}

type RangeKey = (String, NaiveDate, NaiveDate);

/// Memoizing wrapper scoped to one analysis run.
///
/// Repeated range requests for the same (symbol, start, end) are served
/// from the cache. Misses are cached too so a missing symbol is looked up
/// once per run.
pub struct CachedMarketData<'a, P: MarketDataProvider + ?Sized> {
    inner: &'a P,
    ranges: RefCell<HashMap<RangeKey, Result<BTreeMap<NaiveDate, f64>, MarketDataError>>>,
}

impl<'a, P: MarketDataProvider + ?Sized> CachedMarketData<'a, P> {
    pub fn new(inner: &'a P) -> Self {
        Self {
            inner,
            ranges: RefCell::new(HashMap::new()),
        }
    }

    /// Number of distinct range lookups served so far.
    pub fn cached_ranges(&self) -> usize {
        self.ranges.borrow().len()
    }
}

impl<P: MarketDataProvider + ?Sized> MarketDataProvider for CachedMarketData<'_, P> {
    fn daily_closes(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, f64>, MarketDataError> {
        let key = (symbol.to_string(), start, end);
        if let Some(hit) = self.ranges.borrow().get(&key) {
            return hit.clone();
        }

        let fetched = self.inner.daily_closes(symbol, start, end);
        self.ranges.borrow_mut().insert(key, fetched.clone());
        fetched
    }

    fn event_blackout(&self, date: NaiveDate) -> Result<Vec<MacroEvent>, MarketDataError> {
        self.inner.event_blackout(date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    struct CountingProvider {
        data: InMemoryMarketData,
        calls: Cell<usize>,
    }

    impl MarketDataProvider for CountingProvider {
        fn daily_closes(
            &self,
            symbol: &str,
            start: NaiveDate,
            end: NaiveDate,
        ) -> Result<BTreeMap<NaiveDate, f64>, MarketDataError> {
            self.calls.set(self.calls.get() + 1);
            self.data.daily_closes(symbol, start, end)
        }

        fn event_blackout(&self, date: NaiveDate) -> Result<Vec<MacroEvent>, MarketDataError> {
            self.data.event_blackout(date)
        }
    }

    #[test]
    fn test_range_and_point_lookup() {
        let data = InMemoryMarketData::new()
            .with_closes("SPY", vec![(d(1), 500.0), (d(4), 505.0), (d(5), 503.0)]);

        let range = data.daily_closes("SPY", d(2), d(5)).unwrap();
        assert_eq!(range.len(), 2);
        assert_eq!(data.close_on("SPY", d(4)).unwrap(), 505.0);
        assert!(matches!(
            data.close_on("SPY", d(2)),
            Err(MarketDataError::LookupMiss { .. })
        ));
        assert!(data.daily_closes("QQQ", d(1), d(5)).is_err());
    }

    #[test]
    fn test_event_blackout_window() {
        let data = InMemoryMarketData::new().with_event(MacroEvent {
            event_type: "FOMC".to_string(),
            event_date: d(20),
            blackout_start: d(19),
            blackout_end: d(20),
        });

        assert!(data.event_blackout(d(18)).unwrap().is_empty());
        assert_eq!(data.event_blackout(d(19)).unwrap()[0].event_type, "FOMC");
    }

    #[test]
    fn test_cache_serves_repeat_lookups() {
        let provider = CountingProvider {
            data: InMemoryMarketData::new().with_closes("SPY", vec![(d(1), 500.0)]),
            calls: Cell::new(0),
        };
        let cached = CachedMarketData::new(&provider);

        cached.daily_closes("SPY", d(1), d(3)).unwrap();
        cached.daily_closes("SPY", d(1), d(3)).unwrap();
        assert!(cached.daily_closes("QQQ", d(1), d(3)).is_err());
        assert!(cached.daily_closes("QQQ", d(1), d(3)).is_err());

        assert_eq!(provider.calls.get(), 2);
        assert_eq!(cached.cached_ranges(), 2);
    }
}

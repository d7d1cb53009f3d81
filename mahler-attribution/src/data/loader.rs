//! Parquet loader for simulation output.
//!
//! Reads the three files a backtest run leaves behind:
//! - `positions.parquet`: one row per position per day
//! - `trades.parquet`: open/close/expire events
//! - `closes.parquet`: daily closes (`symbol`, `date`, `close`), volatility
//!   index included as its own symbol
//!
//! Dates are stored as `YYYY-MM-DD` strings. Optional columns may be absent
//! from the file entirely.

use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use polars::prelude::*;
use rust_decimal::Decimal;
use thiserror::Error;

use super::market::InMemoryMarketData;
use super::money;
use super::records::{ExitReasonType, RawPositionRecord, TradeAction, TradeRecord};
use super::types::{Greeks, OptionType};

pub const POSITIONS_FILE: &str = "positions.parquet";
pub const TRADES_FILE: &str = "trades.parquet";
pub const CLOSES_FILE: &str = "closes.parquet";

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parquet loader for attribution inputs.
pub struct DataLoader {
    data_dir: PathBuf,
}

impl DataLoader {
    /// Create a loader pointing at a backtest output directory.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    pub fn positions_path(&self) -> PathBuf {
        self.data_dir.join(POSITIONS_FILE)
    }

    pub fn trades_path(&self) -> PathBuf {
        self.data_dir.join(TRADES_FILE)
    }

    pub fn closes_path(&self) -> PathBuf {
        self.data_dir.join(CLOSES_FILE)
    }

    pub fn load_positions(&self) -> Result<Vec<RawPositionRecord>, LoaderError> {
        let df = read_parquet(&self.positions_path())?;
        position_records(&df)
    }

    pub fn load_trades(&self) -> Result<Vec<TradeRecord>, LoaderError> {
        let df = read_parquet(&self.trades_path())?;
        trade_records(&df)
    }

    /// Load daily closes. A missing file yields an empty table, since every
    /// consumer treats absent market data as unknown.
    pub fn load_market_data(&self) -> Result<InMemoryMarketData, LoaderError> {
        let path = self.closes_path();
        if !path.exists() {
            return Ok(InMemoryMarketData::new());
        }
        let df = read_parquet(&path)?;
        market_data(&df)
    }
}

/// Read a parquet file into a DataFrame.
pub fn read_parquet(path: &Path) -> Result<DataFrame, LoaderError> {
    if !path.exists() {
        return Err(LoaderError::FileNotFound(path.display().to_string()));
    }
    let file = File::open(path)?;
    Ok(ParquetReader::new(file).finish()?)
}

/// Convert a positions frame into raw records.
pub fn position_records(df: &DataFrame) -> Result<Vec<RawPositionRecord>, LoaderError> {
    let dates = str_col(df, "date")?;
    let ids = opt_str_col(df, "position_id")?;
    let underlyings = str_col(df, "underlying")?;
    let symbols = opt_str_col(df, "symbol")?;
    let option_types = str_col(df, "option_type")?;
    let strikes = f64_col(df, "strike")?;
    let expirations = str_col(df, "expiration")?;
    let quantities = i64_col(df, "quantity")?;
    let lot_sizes = opt_i64_col(df, "lot_size")?;
    let spots = f64_col(df, "underlying_price")?;
    let prices = f64_col(df, "option_price")?;
    let ivs = opt_f64_col(df, "iv")?;
    let deltas = opt_f64_col(df, "delta")?;
    let gammas = opt_f64_col(df, "gamma")?;
    let thetas = opt_f64_col(df, "theta")?;
    let vegas = opt_f64_col(df, "vega")?;
    let rhos = opt_f64_col(df, "rho")?;
    let market_values = opt_f64_col(df, "market_value")?;
    let unrealized = opt_f64_col(df, "unrealized_pnl")?;
    let hvs = opt_f64_col(df, "hv")?;
    let ranks = opt_f64_col(df, "iv_rank")?;
    let percentiles = opt_f64_col(df, "iv_percentile")?;
    let dtes = opt_i64_col(df, "dte")?;
    let entry_prices = opt_f64_col(df, "entry_price")?;
    let entry_dates = opt_str_col(df, "entry_date")?;

    let mut records = Vec::with_capacity(df.height());

    for idx in 0..df.height() {
        let greeks = match (deltas[idx], gammas[idx], thetas[idx], vegas[idx]) {
            (Some(delta), Some(gamma), Some(theta), Some(vega)) => Some(Greeks {
                delta,
                gamma,
                theta,
                vega,
                rho: rhos[idx].unwrap_or(0.0),
            }),
            _ => None,
        };

        records.push(RawPositionRecord {
            date: parse_date(required(&dates, idx, "date")?, idx)?,
            position_id: ids[idx].clone().filter(|id| !id.is_empty()),
            underlying: required(&underlyings, idx, "underlying")?.to_string(),
            symbol: symbols[idx].clone().unwrap_or_default(),
            option_type: parse_option_type(required(&option_types, idx, "option_type")?, idx)?,
            strike: money::price(*required(&strikes, idx, "strike")?),
            expiration: parse_date(required(&expirations, idx, "expiration")?, idx)?,
            quantity: to_i32(*required(&quantities, idx, "quantity")?, idx)?,
            lot_size: lot_sizes[idx]
                .map(|l| to_lot_size(l, idx))
                .transpose()?
                .unwrap_or(100),
            underlying_price: money::price(*required(&spots, idx, "underlying_price")?),
            option_price: money::price(*required(&prices, idx, "option_price")?),
            iv: ivs[idx],
            greeks,
            market_value: market_values[idx].map(money::price),
            unrealized_pnl: unrealized[idx].map(money::price),
            hv: hvs[idx],
            iv_rank: ranks[idx],
            iv_percentile: percentiles[idx],
            dte: dtes[idx].map(|d| d as i32),
            entry_price: entry_prices[idx].map(money::price).unwrap_or(Decimal::ZERO),
            entry_date: entry_dates[idx]
                .as_deref()
                .map(|s| parse_date(s, idx))
                .transpose()?,
        });
    }

    Ok(records)
}

/// Convert a trades frame into trade records.
pub fn trade_records(df: &DataFrame) -> Result<Vec<TradeRecord>, LoaderError> {
    let ids = opt_str_col(df, "position_id")?;
    let actions = str_col(df, "action")?;
    let dates = str_col(df, "trade_date")?;
    let underlyings = str_col(df, "underlying")?;
    let symbols = opt_str_col(df, "symbol")?;
    let option_types = str_col(df, "option_type")?;
    let strikes = f64_col(df, "strike")?;
    let expirations = str_col(df, "expiration")?;
    let quantities = i64_col(df, "quantity")?;
    let lot_sizes = opt_i64_col(df, "lot_size")?;
    let fills = f64_col(df, "fill_price")?;
    let spots = opt_f64_col(df, "underlying_price")?;
    let realized = opt_f64_col(df, "realized_pnl")?;
    let reasons = opt_str_col(df, "reason")?;
    let reason_types = opt_str_col(df, "reason_type")?;
    let ranks = opt_f64_col(df, "iv_rank")?;

    let mut records = Vec::with_capacity(df.height());

    for idx in 0..df.height() {
        let action_str = required(&actions, idx, "action")?;
        let action = TradeAction::from_str(action_str).ok_or_else(|| {
            LoaderError::InvalidData(format!("row {}: unknown action '{}'", idx, action_str))
        })?;

        records.push(TradeRecord {
            position_id: ids[idx].clone().filter(|id| !id.is_empty()),
            action,
            trade_date: parse_date(required(&dates, idx, "trade_date")?, idx)?,
            underlying: required(&underlyings, idx, "underlying")?.to_string(),
            symbol: symbols[idx].clone().unwrap_or_default(),
            option_type: parse_option_type(required(&option_types, idx, "option_type")?, idx)?,
            strike: money::price(*required(&strikes, idx, "strike")?),
            expiration: parse_date(required(&expirations, idx, "expiration")?, idx)?,
            quantity: to_i32(*required(&quantities, idx, "quantity")?, idx)?,
            lot_size: lot_sizes[idx]
                .map(|l| to_lot_size(l, idx))
                .transpose()?
                .unwrap_or(100),
            fill_price: money::price(*required(&fills, idx, "fill_price")?),
            underlying_price: spots[idx].map(money::price),
            realized_pnl: realized[idx].map(money::price),
            reason: reasons[idx].clone().filter(|r| !r.is_empty()),
            reason_type: reason_types[idx]
                .as_deref()
                .and_then(ExitReasonType::from_str),
            iv_rank: ranks[idx],
        });
    }

    Ok(records)
}

/// Convert a closes frame into an in-memory market data table.
pub fn market_data(df: &DataFrame) -> Result<InMemoryMarketData, LoaderError> {
    let symbols = str_col(df, "symbol")?;
    let dates = str_col(df, "date")?;
    let closes = f64_col(df, "close")?;

    let mut data = InMemoryMarketData::new();
    for idx in 0..df.height() {
        let (Some(symbol), Some(date), Some(close)) = (&symbols[idx], &dates[idx], closes[idx])
        else {
            continue;
        };
        data.insert_close(symbol, parse_date(date, idx)?, close);
    }

    Ok(data)
}

fn str_col(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>, LoaderError> {
    let column = df
        .column(name)
        .map_err(|_| LoaderError::MissingColumn(name.to_string()))?;
    let casted = column.cast(&DataType::String)?;
    Ok(casted
        .str()?
        .into_iter()
        .map(|v| v.map(|s| s.to_string()))
        .collect())
}

fn opt_str_col(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>, LoaderError> {
    match str_col(df, name) {
        Err(LoaderError::MissingColumn(_)) => Ok(vec![None; df.height()]),
        other => other,
    }
}

fn f64_col(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, LoaderError> {
    let column = df
        .column(name)
        .map_err(|_| LoaderError::MissingColumn(name.to_string()))?;
    let casted = column.cast(&DataType::Float64)?;
    Ok(casted.f64()?.into_iter().collect())
}

fn opt_f64_col(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, LoaderError> {
    match f64_col(df, name) {
        Err(LoaderError::MissingColumn(_)) => Ok(vec![None; df.height()]),
        other => other,
    }
}

fn i64_col(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>, LoaderError> {
    let column = df
        .column(name)
        .map_err(|_| LoaderError::MissingColumn(name.to_string()))?;
    let casted = column.cast(&DataType::Int64)?;
    Ok(casted.i64()?.into_iter().collect())
}

fn opt_i64_col(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>, LoaderError> {
    match i64_col(df, name) {
        Err(LoaderError::MissingColumn(_)) => Ok(vec![None; df.height()]),
        other => other,
    }
}

fn required<'a, T>(values: &'a [Option<T>], idx: usize, name: &str) -> Result<&'a T, LoaderError> {
    values[idx]
        .as_ref()
        .ok_or_else(|| LoaderError::InvalidData(format!("row {}: null {}", idx, name)))
}

fn parse_date(s: &str, idx: usize) -> Result<NaiveDate, LoaderError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| LoaderError::InvalidData(format!("row {}: bad date '{}': {}", idx, s, e)))
}

fn parse_option_type(s: &str, idx: usize) -> Result<OptionType, LoaderError> {
    OptionType::from_str(s)
        .ok_or_else(|| LoaderError::InvalidData(format!("row {}: bad option type '{}'", idx, s)))
}

fn to_i32(value: i64, idx: usize) -> Result<i32, LoaderError> {
    i32::try_from(value)
        .map_err(|_| LoaderError::InvalidData(format!("row {}: quantity {} out of range", idx, value)))
}

fn to_lot_size(value: i64, idx: usize) -> Result<u32, LoaderError> {
    u32::try_from(value)
        .ok()
        .filter(|lot| *lot > 0)
        .ok_or_else(|| LoaderError::InvalidData(format!("row {}: lot size {} out of range", idx, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MarketDataProvider;
    use rust_decimal_macros::dec;

    fn positions_frame() -> DataFrame {
        df!(
            "date" => ["2024-03-01", "2024-03-04"],
            "position_id" => ["P1", ""],
            "underlying" => ["SPY", "SPY"],
            "option_type" => ["P", "put"],
            "strike" => [500.0, 500.0],
            "expiration" => ["2024-04-19", "2024-04-19"],
            "quantity" => [-2i64, -2],
            "underlying_price" => [510.0, 505.5],
            "option_price" => [4.25, 5.10],
            "iv" => [Some(0.18), None],
            "delta" => [Some(0.6), None],
            "gamma" => [Some(0.02), None],
            "theta" => [Some(-0.1), None],
            "vega" => [Some(1.2), None],
            "entry_price" => [4.0, 4.0]
        )
        .unwrap()
    }

    #[test]
    fn test_position_records_from_frame() {
        let records = position_records(&positions_frame()).unwrap();

        assert_eq!(records.len(), 2);
        let first = &records[0];
        assert_eq!(first.position_id.as_deref(), Some("P1"));
        assert_eq!(first.option_type, OptionType::Put);
        assert_eq!(first.quantity, -2);
        assert_eq!(first.lot_size, 100);
        assert_eq!(first.option_price, dec!(4.25));
        assert_eq!(first.greeks.unwrap().vega, 1.2);
        assert!(first.symbol.is_empty());
        assert!(first.market_value.is_none());

        // Empty identifiers are surfaced as missing, not as "".
        assert!(records[1].position_id.is_none());
        assert!(records[1].greeks.is_none());
    }

    #[test]
    fn test_missing_required_column() {
        let df = df!("date" => ["2024-03-01"]).unwrap();
        assert!(matches!(
            position_records(&df),
            Err(LoaderError::MissingColumn(_))
        ));
    }

    #[test]
    fn test_lot_size_out_of_range_is_rejected() {
        let mut df = positions_frame();
        df.with_column(Series::new("lot_size".into(), [100i64, 5_000_000_000]))
            .unwrap();
        assert!(matches!(
            position_records(&df),
            Err(LoaderError::InvalidData(msg)) if msg.contains("row 1")
        ));

        df.with_column(Series::new("lot_size".into(), [0i64, 100]))
            .unwrap();
        assert!(matches!(
            position_records(&df),
            Err(LoaderError::InvalidData(_))
        ));

        df.with_column(Series::new("lot_size".into(), [Some(10i64), None]))
            .unwrap();
        let records = position_records(&df).unwrap();
        assert_eq!(records[0].lot_size, 10);
        assert_eq!(records[1].lot_size, 100);
    }

    #[test]
    fn test_trade_records_from_frame() {
        let df = df!(
            "position_id" => ["P1", "P1"],
            "action" => ["open", "close"],
            "trade_date" => ["2024-03-01", "2024-03-08"],
            "underlying" => ["SPY", "SPY"],
            "option_type" => ["P", "P"],
            "strike" => [500.0, 500.0],
            "expiration" => ["2024-04-19", "2024-04-19"],
            "quantity" => [-2i64, -2],
            "fill_price" => [4.0, 8.5],
            "reason" => [None, Some("stop loss hit")],
            "reason_type" => [None::<&str>, None]
        )
        .unwrap();

        let trades = trade_records(&df).unwrap();
        assert_eq!(trades[0].action, TradeAction::Open);
        assert_eq!(trades[1].action, TradeAction::Close);
        assert_eq!(trades[1].reason.as_deref(), Some("stop loss hit"));
        assert!(trades[1].reason_type.is_none());
        assert!(trades[1].underlying_price.is_none());
    }

    #[test]
    fn test_parquet_round_trip_through_loader() {
        let dir = std::env::temp_dir().join(format!("mahler-attr-loader-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let mut closes = df!(
            "symbol" => ["SPY", "SPY", "VIX"],
            "date" => ["2024-03-01", "2024-03-04", "2024-03-01"],
            "close" => [510.0, 505.5, 14.2]
        )
        .unwrap();
        let mut file = File::create(dir.join(CLOSES_FILE)).unwrap();
        ParquetWriter::new(&mut file).finish(&mut closes).unwrap();

        let loader = DataLoader::new(&dir);
        let market = loader.load_market_data().unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        assert_eq!(market.close_on("SPY", day).unwrap(), 505.5);
        assert_eq!(market.symbols(), vec!["SPY", "VIX"]);

        assert!(matches!(
            loader.load_positions(),
            Err(LoaderError::FileNotFound(_))
        ));

        std::fs::remove_dir_all(&dir).ok();
    }
}

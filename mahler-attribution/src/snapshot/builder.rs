//! Raw record → typed snapshot conversion.
//!
//! Trusted IV/Greeks on the input are kept as given. When IV is missing it
//! is recovered from the mid price with the IV solver, and the Greeks are
//! derived from the recovered vol. If recovery fails the fields stay empty.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::debug;

use crate::data::money::to_f64;
use crate::data::{Greeks, OptionType, PositionSnapshot, RawPositionRecord, TradeRecord};
use crate::pricing::{IvError, IvSolver, PricingConfig};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SnapshotError {
    #[error("Position record on {date} for {underlying} has no position id")]
    MissingPositionId { date: NaiveDate, underlying: String },
}

/// Why IV/Greeks could not be recovered for a position-day.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecoveryError {
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    #[error(transparent)]
    Solver(#[from] IvError),
}

/// Builds [`PositionSnapshot`]s, recovering IV and Greeks where needed.
#[derive(Debug, Clone, Default)]
pub struct SnapshotBuilder {
    solver: IvSolver,
}

impl SnapshotBuilder {
    pub fn new(config: PricingConfig) -> Self {
        Self {
            solver: IvSolver::new(config),
        }
    }

    pub fn solver(&self) -> &IvSolver {
        &self.solver
    }

    /// Convert every record, failing on the first one without an id.
    pub fn build_all(
        &self,
        records: &[RawPositionRecord],
    ) -> Result<Vec<PositionSnapshot>, SnapshotError> {
        let snapshots = records
            .iter()
            .map(|r| self.build(r))
            .collect::<Result<Vec<_>, _>>()?;

        let missing_iv = snapshots.iter().filter(|s| s.iv.is_none()).count();
        debug!(
            records = records.len(),
            missing_iv, "Built position snapshots"
        );

        Ok(snapshots)
    }

    /// Convert one raw record.
    pub fn build(&self, record: &RawPositionRecord) -> Result<PositionSnapshot, SnapshotError> {
        let position_id = record
            .position_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SnapshotError::MissingPositionId {
                date: record.date,
                underlying: record.underlying.clone(),
            })?
            .to_string();

        let dte = record
            .dte
            .unwrap_or_else(|| (record.expiration - record.date).num_days() as i32);

        let (iv, greeks) = match record.iv.filter(|iv| iv.is_finite() && *iv > 0.0) {
            Some(iv) => {
                let greeks = record.greeks.or_else(|| {
                    self.greeks_from_iv(
                        iv,
                        record.underlying_price,
                        record.strike,
                        dte,
                        record.option_type,
                        record.quantity,
                    )
                });
                (Some(iv), greeks)
            }
            None => match self.recover(
                record.option_price,
                record.underlying_price,
                record.strike,
                dte,
                record.option_type,
                record.quantity,
            ) {
                Ok((iv, greeks)) => (Some(iv), Some(greeks)),
                Err(e) => {
                    debug!(
                        position_id = %position_id,
                        date = %record.date,
                        error = %e,
                        "IV recovery skipped"
                    );
                    (None, None)
                }
            },
        };

        let market_value = record
            .market_value
            .unwrap_or_else(|| notional(record.option_price, record.quantity, record.lot_size));
        let entry_notional = notional(record.entry_price, record.quantity, record.lot_size);

        let iv_hv_ratio = match (iv, record.hv) {
            (Some(iv), Some(hv)) if hv > 0.0 => Some(iv / hv),
            _ => None,
        };

        Ok(PositionSnapshot {
            date: record.date,
            position_id,
            underlying: record.underlying.clone(),
            symbol: record.symbol.clone(),
            option_type: record.option_type,
            strike: record.strike,
            expiration: record.expiration,
            quantity: record.quantity,
            lot_size: record.lot_size,
            underlying_price: record.underlying_price,
            option_price: record.option_price,
            iv,
            hv: record.hv,
            iv_hv_ratio,
            iv_rank: record.iv_rank,
            iv_percentile: record.iv_percentile,
            greeks,
            market_value,
            unrealized_pnl: record.unrealized_pnl.unwrap_or(market_value - entry_notional),
            moneyness_pct: moneyness_pct(record.option_type, record.underlying_price, record.strike),
            dte,
            entry_price: record.entry_price,
            entry_date: record.entry_date,
        })
    }

    /// Solve IV from a price and derive position-level Greeks from it.
    pub fn recover(
        &self,
        option_price: Decimal,
        spot: Decimal,
        strike: Decimal,
        dte: i32,
        opt_type: OptionType,
        quantity: i32,
    ) -> Result<(f64, Greeks), RecoveryError> {
        if option_price <= Decimal::ZERO {
            return Err(RecoveryError::DataUnavailable(format!(
                "non-positive option price {}",
                option_price
            )));
        }
        if spot <= Decimal::ZERO || strike <= Decimal::ZERO {
            return Err(RecoveryError::DataUnavailable(format!(
                "non-positive spot {} or strike {}",
                spot, strike
            )));
        }
        if dte <= 0 {
            return Err(RecoveryError::DataUnavailable(format!(
                "non-positive DTE {}",
                dte
            )));
        }

        let (spot, strike) = (to_f64(spot), to_f64(strike));
        let time = dte as f64 / 365.0;
        let iv = self
            .solver
            .solve(to_f64(option_price), spot, strike, time, opt_type)?;
        let greeks = self
            .solver
            .black_scholes()
            .greeks(spot, strike, time, iv, opt_type)
            .to_position(quantity);

        Ok((iv, greeks))
    }

    /// Build the entry-day snapshot for a position first seen today, from
    /// its open trade's fill and underlying price.
    pub fn synthesize_entry(
        &self,
        open: &TradeRecord,
        current: &PositionSnapshot,
    ) -> Result<PositionSnapshot, RecoveryError> {
        let spot = open.underlying_price.ok_or_else(|| {
            RecoveryError::DataUnavailable(format!(
                "open trade for {} has no underlying price",
                current.position_id
            ))
        })?;

        let dte = (current.expiration - open.trade_date).num_days() as i32;
        let (iv, greeks) = self.recover(
            open.fill_price,
            spot,
            current.strike,
            dte,
            current.option_type,
            current.quantity,
        )?;

        Ok(PositionSnapshot {
            date: open.trade_date,
            underlying_price: spot,
            option_price: open.fill_price,
            iv: Some(iv),
            hv: None,
            iv_hv_ratio: None,
            iv_rank: open.iv_rank,
            iv_percentile: None,
            greeks: Some(greeks),
            market_value: notional(open.fill_price, current.quantity, current.lot_size),
            unrealized_pnl: Decimal::ZERO,
            moneyness_pct: moneyness_pct(current.option_type, spot, current.strike),
            dte,
            entry_price: open.fill_price,
            entry_date: Some(open.trade_date),
            ..current.clone()
        })
    }

    fn greeks_from_iv(
        &self,
        iv: f64,
        spot: Decimal,
        strike: Decimal,
        dte: i32,
        opt_type: OptionType,
        quantity: i32,
    ) -> Option<Greeks> {
        if spot <= Decimal::ZERO || strike <= Decimal::ZERO || dte <= 0 {
            return None;
        }
        let time = dte as f64 / 365.0;
        Some(
            self.solver
                .black_scholes()
                .greeks(to_f64(spot), to_f64(strike), time, iv, opt_type)
                .to_position(quantity),
        )
    }
}

/// Price × quantity × lot, signed with the quantity.
pub fn notional(price: Decimal, quantity: i32, lot_size: u32) -> Decimal {
    price * Decimal::from(quantity) * Decimal::from(lot_size)
}

/// Moneyness in percent of strike, positive when in the money.
pub fn moneyness_pct(opt_type: OptionType, spot: Decimal, strike: Decimal) -> f64 {
    if strike <= Decimal::ZERO {
        return 0.0;
    }
    let (spot, strike) = (to_f64(spot), to_f64(strike));
    match opt_type {
        OptionType::Call => (spot - strike) / strike * 100.0,
        OptionType::Put => (strike - spot) / strike * 100.0,
    }
}

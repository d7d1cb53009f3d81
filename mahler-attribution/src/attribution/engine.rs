//! Day-by-day PnL attribution.
//!
//! Runs the attribution loop:
//! 1. Index trade records by position
//! 2. Walk processing days in ascending order
//! 3. Attribute every present position against its carried-forward snapshot
//! 4. Attribute absent positions whose close/expire record is due. On a
//!    snapshot day, an absent position with no record at all is reported
//!    as unattributed
//! 5. Carry today's snapshots forward
//! 6. Roll rows up into per-trade totals
//!
//! Positions within a day are independent and run on the rayon pool. Days
//! are strictly sequential.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;
use rayon::prelude::*;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::data::money::{money, to_f64};
use crate::data::{PositionSide, PositionSnapshot, TradeRecord};
use crate::snapshot::{RecoveryError, SnapshotBuilder};

use super::types::{
    AttributionBasis, AttributionError, AttributionRun, DailyAttribution, GreekPnl,
    PositionDailyAttribution, TradeAttribution, UnattributedDisappearance,
};

/// Open and terminal trade records grouped by position id.
#[derive(Debug, Default)]
pub struct TradeBook<'a> {
    opens: HashMap<&'a str, &'a TradeRecord>,
    terminals: HashMap<&'a str, Vec<&'a TradeRecord>>,
}

impl<'a> TradeBook<'a> {
    /// Index trades. Every record must carry a position id.
    pub fn index(trades: &'a [TradeRecord]) -> Result<Self, AttributionError> {
        let mut book = Self::default();

        for trade in trades {
            let id = trade
                .position_id()
                .ok_or(AttributionError::MissingTradePositionId {
                    date: trade.trade_date,
                })?;

            if trade.action.is_terminal() {
                book.terminals.entry(id).or_default().push(trade);
            } else {
                // Earliest open wins.
                book.opens
                    .entry(id)
                    .and_modify(|t| {
                        if trade.trade_date < t.trade_date {
                            *t = trade;
                        }
                    })
                    .or_insert(trade);
            }
        }

        for records in book.terminals.values_mut() {
            records.sort_by_key(|t| t.trade_date);
        }

        Ok(book)
    }

    pub fn open(&self, position_id: &str) -> Option<&'a TradeRecord> {
        self.opens.get(position_id).copied()
    }

    /// Earliest close/expire record dated on or after `date`.
    pub fn terminal_from(&self, position_id: &str, date: NaiveDate) -> Option<&'a TradeRecord> {
        self.terminals
            .get(position_id)?
            .iter()
            .find(|t| t.trade_date >= date)
            .copied()
    }

    fn terminal_dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.terminals.values().flatten().map(|t| t.trade_date)
    }
}

/// Greek PnL attribution engine.
#[derive(Debug, Clone, Default)]
pub struct PnlAttributionEngine {
    builder: SnapshotBuilder,
}

impl PnlAttributionEngine {
    pub fn new(builder: SnapshotBuilder) -> Self {
        Self { builder }
    }

    /// Attribute a snapshot stream against its trade records.
    pub fn run(
        &self,
        snapshots: &[PositionSnapshot],
        trades: &[TradeRecord],
    ) -> Result<AttributionRun, AttributionError> {
        let book = TradeBook::index(trades)?;

        // Position order within a day is by id, later duplicates replace earlier.
        let mut by_date: BTreeMap<NaiveDate, BTreeMap<&str, &PositionSnapshot>> = BTreeMap::new();
        for snapshot in snapshots {
            by_date
                .entry(snapshot.date)
                .or_default()
                .insert(snapshot.position_id.as_str(), snapshot);
        }

        let days: BTreeSet<NaiveDate> = by_date
            .keys()
            .copied()
            .chain(book.terminal_dates())
            .collect();

        let empty = BTreeMap::new();
        let mut previous: HashMap<String, PositionSnapshot> = HashMap::new();
        let mut closing: HashMap<String, &TradeRecord> = HashMap::new();
        let mut daily = Vec::new();
        let mut unattributed = Vec::new();

        for date in days {
            let today = by_date.get(&date).unwrap_or(&empty);

            let mut rows: Vec<PositionDailyAttribution> = today
                .par_iter()
                .filter_map(|(id, snapshot)| {
                    self.attribute_present(previous.get(*id), snapshot, &book)
                })
                .collect();

            // Only a snapshot day can show that a position is gone. On a
            // trade-only day, carried positions without a due record stay put.
            let snapshot_day = by_date.contains_key(&date);

            let mut absent: Vec<String> = previous
                .keys()
                .filter(|id| !today.contains_key(id.as_str()))
                .cloned()
                .collect();
            absent.sort();

            for id in absent {
                let Some(prev) = previous.get(&id) else {
                    continue;
                };

                match book.terminal_from(&id, prev.date) {
                    Some(trade) if trade.trade_date <= date => {
                        let siblings = by_date.get(&trade.trade_date);
                        rows.push(attribute_terminal(prev, trade, siblings, date));
                        closing.insert(id.clone(), trade);
                        previous.remove(&id);
                    }
                    // Closes later: carried until the record's own date.
                    Some(_) => {}
                    None if snapshot_day => {
                        warn!(
                            position_id = %id,
                            last_seen = %prev.date,
                            missing_on = %date,
                            "Position vanished without a close or expire record"
                        );
                        unattributed.push(UnattributedDisappearance {
                            position_id: id.clone(),
                            underlying: prev.underlying.clone(),
                            last_seen: prev.date,
                            missing_on: date,
                        });
                        previous.remove(&id);
                    }
                    None => {}
                }
            }

            for (id, snapshot) in today {
                previous.insert(id.to_string(), (*snapshot).clone());
            }

            if !rows.is_empty() {
                daily.push(DailyAttribution::from_positions(date, rows));
            }
        }

        let trades = aggregate_trades(snapshots, &daily, &book, &closing);

        let run = AttributionRun {
            daily,
            trades,
            unattributed,
        };

        let summary = run.summary();
        info!(
            days = summary.days,
            trades = summary.trades,
            total_pnl = %summary.total_pnl,
            residual = %summary.residual,
            unattributed = summary.unattributed,
            "Attribution complete"
        );

        Ok(run)
    }

    fn attribute_present(
        &self,
        prev: Option<&PositionSnapshot>,
        today: &PositionSnapshot,
        book: &TradeBook<'_>,
    ) -> Option<PositionDailyAttribution> {
        if let Some(prev) = prev {
            return Some(attribute_pair(prev, today, AttributionBasis::PriorSnapshot));
        }

        if today.entry_price <= Decimal::ZERO {
            debug!(
                position_id = %today.position_id,
                date = %today.date,
                "No prior snapshot or entry price, skipping"
            );
            return None;
        }

        let synthetic = book
            .open(&today.position_id)
            .ok_or_else(|| {
                RecoveryError::DataUnavailable(format!(
                    "no open trade for {}",
                    today.position_id
                ))
            })
            .and_then(|open| self.builder.synthesize_entry(open, today));

        let row = match synthetic {
            Ok(entry) => attribute_pair(&entry, today, AttributionBasis::SyntheticEntry),
            Err(e) => {
                debug!(
                    position_id = %today.position_id,
                    date = %today.date,
                    error = %e,
                    "Entry synthesis failed, attributing to residual"
                );
                PositionDailyAttribution::reconciled(
                    today.date,
                    &today.position_id,
                    &today.underlying,
                    AttributionBasis::ResidualOnly,
                    GreekPnl::default(),
                    today.market_value - today.entry_notional(),
                )
            }
        };

        Some(row)
    }
}

/// Greek components for a move from `prev`, using its Greeks.
///
/// Gamma and vega carry magnitude only and get the quantity's sign back here.
pub fn greek_pnl(
    prev: &PositionSnapshot,
    spot_move: f64,
    elapsed_days: f64,
    iv_change: f64,
) -> GreekPnl {
    let g = prev.greeks.unwrap_or_default();
    let lot = prev.lot_size as f64;
    let sign = prev.quantity.signum() as f64;

    GreekPnl {
        delta: money(g.delta * lot * spot_move),
        gamma: money(0.5 * g.gamma * sign * lot * spot_move * spot_move),
        theta: money(g.theta * lot * elapsed_days),
        vega: money(g.vega * sign * lot * iv_change * 100.0),
    }
}

fn attribute_pair(
    prev: &PositionSnapshot,
    today: &PositionSnapshot,
    basis: AttributionBasis,
) -> PositionDailyAttribution {
    let spot_move = today.underlying_price - prev.underlying_price;
    let elapsed = (today.date - prev.date).num_days() as f64;
    let iv_change = match (today.iv, prev.iv) {
        (Some(now), Some(before)) => Some(now - before),
        _ => None,
    };

    let components = greek_pnl(prev, to_f64(spot_move), elapsed, iv_change.unwrap_or(0.0));

    let mut row = PositionDailyAttribution::reconciled(
        today.date,
        &today.position_id,
        &today.underlying,
        basis,
        components,
        today.market_value - prev.market_value,
    );
    row.underlying_move = spot_move;
    row.underlying_move_pct = move_pct(spot_move, prev.underlying_price);
    row.iv_change = iv_change;
    row
}

/// Attribute the final leg of a closed or expired position. Vega is not
/// measured because there is no same-day IV.
fn attribute_terminal(
    prev: &PositionSnapshot,
    trade: &TradeRecord,
    siblings: Option<&BTreeMap<&str, &PositionSnapshot>>,
    date: NaiveDate,
) -> PositionDailyAttribution {
    let closing_spot = trade
        .underlying_price
        .or_else(|| {
            siblings?
                .values()
                .find(|s| s.underlying == prev.underlying)
                .map(|s| s.underlying_price)
        })
        .unwrap_or(prev.underlying_price);

    let spot_move = closing_spot - prev.underlying_price;
    let elapsed = (trade.trade_date - prev.date).num_days() as f64;
    let mut components = greek_pnl(prev, to_f64(spot_move), elapsed, 0.0);
    components.vega = Decimal::ZERO;

    let close_value =
        trade.fill_price * Decimal::from(prev.quantity) * Decimal::from(prev.lot_size);

    let mut row = PositionDailyAttribution::reconciled(
        date,
        &prev.position_id,
        &prev.underlying,
        AttributionBasis::Terminal,
        components,
        close_value - prev.market_value,
    );
    row.underlying_move = spot_move;
    row.underlying_move_pct = move_pct(spot_move, prev.underlying_price);
    row
}

fn move_pct(spot_move: Decimal, base: Decimal) -> f64 {
    if base.is_zero() {
        0.0
    } else {
        to_f64(spot_move) / to_f64(base) * 100.0
    }
}

/// Roll daily rows up into one [`TradeAttribution`] per position.
fn aggregate_trades(
    snapshots: &[PositionSnapshot],
    daily: &[DailyAttribution],
    book: &TradeBook<'_>,
    closing: &HashMap<String, &TradeRecord>,
) -> Vec<TradeAttribution> {
    let mut lives: HashMap<&str, (&PositionSnapshot, &PositionSnapshot)> = HashMap::new();
    for snapshot in snapshots {
        lives
            .entry(snapshot.position_id.as_str())
            .and_modify(|(first, last)| {
                if snapshot.date < first.date {
                    *first = snapshot;
                }
                if snapshot.date >= last.date {
                    *last = snapshot;
                }
            })
            .or_insert((snapshot, snapshot));
    }

    let mut rows: HashMap<&str, Vec<&PositionDailyAttribution>> = HashMap::new();
    for row in daily.iter().flat_map(|d| &d.positions) {
        rows.entry(row.position_id.as_str()).or_default().push(row);
    }

    let mut trades: Vec<TradeAttribution> = lives
        .into_iter()
        .map(|(id, (first, last))| {
            let open = book.open(id);
            let close = closing.get(id).copied();
            let position_rows = rows.get(id).map(Vec::as_slice).unwrap_or(&[]);

            let mut components = GreekPnl::default();
            let mut residual = Decimal::ZERO;
            let mut total = Decimal::ZERO;
            for row in position_rows {
                components += row.components();
                residual += row.residual;
                total += row.actual_pnl;
            }

            TradeAttribution {
                position_id: id.to_string(),
                underlying: first.underlying.clone(),
                symbol: first.symbol.clone(),
                option_type: first.option_type,
                side: PositionSide::from_quantity(first.quantity),
                strike: first.strike,
                expiration: first.expiration,
                entry_date: open
                    .map(|t| t.trade_date)
                    .or(first.entry_date)
                    .unwrap_or(first.date),
                exit_date: close.map(|t| t.trade_date).unwrap_or(last.date),
                closed_by: close.map(|t| t.action),
                exit_reason: close.and_then(|t| t.reason.clone()),
                exit_reason_type: close.and_then(|t| t.reason_type),
                holding_days: position_rows.len(),
                total_pnl: total,
                delta_pnl: components.delta,
                gamma_pnl: components.gamma,
                theta_pnl: components.theta,
                vega_pnl: components.vega,
                residual,
                realized_pnl: close.and_then(|t| t.realized_pnl),
                entry_iv: first.iv,
                exit_iv: last.iv,
                entry_underlying_price: first.underlying_price,
                exit_underlying_price: close
                    .and_then(|t| t.underlying_price)
                    .unwrap_or(last.underlying_price),
                entry_iv_rank: open.and_then(|t| t.iv_rank).or(first.iv_rank),
                entry_vega: first.greeks.map(|g| g.vega),
                quantity: first.quantity,
                entry_price: first.entry_price,
                lot_size: first.lot_size,
            }
        })
        .collect();

    trades.sort_by(|a, b| {
        a.entry_date
            .cmp(&b.entry_date)
            .then_with(|| a.position_id.cmp(&b.position_id))
    });

    let still_open = trades
        .iter()
        .filter(|t| t.closed_by.is_none())
        .count();
    debug!(trades = trades.len(), still_open, "Aggregated trade attribution");

    trades
}

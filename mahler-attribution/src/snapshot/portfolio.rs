//! Portfolio Greeks aggregation.
//!
//! Sums a day's position-level Greeks into dollar exposures:
//! - Delta: sum(position_delta * lot)
//! - Gamma: sum(position_gamma * sign * lot)
//! - Theta: sum(position_theta * lot)
//! - Vega: sum(position_vega * sign * lot)
//!
//! Gamma and vega on a snapshot carry magnitude only, so the quantity's sign
//! is put back before summing.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::data::PositionSnapshot;

/// Aggregated portfolio Greeks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioGreeks {
    /// Net delta exposure.
    pub delta: f64,
    /// Net gamma exposure.
    pub gamma: f64,
    /// Net theta (daily decay).
    pub theta: f64,
    /// Net vega exposure.
    pub vega: f64,
    /// Number of positions included.
    pub position_count: usize,
    /// Positions skipped for lack of Greeks.
    pub missing_greeks: usize,
}

impl PortfolioGreeks {
    /// Aggregate one day's snapshots.
    pub fn from_snapshots<'a, I>(snapshots: I) -> Self
    where
        I: IntoIterator<Item = &'a PositionSnapshot>,
    {
        let mut greeks = Self::default();

        for snapshot in snapshots {
            let Some(g) = snapshot.greeks else {
                greeks.missing_greeks += 1;
                continue;
            };

            let lot = snapshot.lot_size as f64;
            let sign = snapshot.quantity.signum() as f64;

            greeks.delta += g.delta * lot;
            greeks.gamma += g.gamma * sign * lot;
            greeks.theta += g.theta * lot;
            greeks.vega += g.vega * sign * lot;
            greeks.position_count += 1;
        }

        greeks
    }

    /// Aggregate every day in a snapshot stream.
    pub fn by_day(snapshots: &[PositionSnapshot]) -> BTreeMap<NaiveDate, Self> {
        let mut days: BTreeMap<NaiveDate, Vec<&PositionSnapshot>> = BTreeMap::new();
        for snapshot in snapshots {
            days.entry(snapshot.date).or_default().push(snapshot);
        }

        days.into_iter()
            .map(|(date, day)| (date, Self::from_snapshots(day)))
            .collect()
    }

    /// Theta earned per unit of gamma risk. `None` when flat gamma.
    pub fn theta_gamma_ratio(&self) -> Option<f64> {
        if self.gamma == 0.0 {
            None
        } else {
            Some(self.theta / self.gamma.abs())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Greeks, OptionType};
    use approx::assert_relative_eq;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn snapshot(day: u32, quantity: i32, greeks: Option<Greeks>) -> PositionSnapshot {
        PositionSnapshot {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            position_id: format!("P{}", quantity),
            underlying: "SPY".to_string(),
            symbol: "SPY".to_string(),
            option_type: OptionType::Put,
            strike: dec!(450),
            expiration: NaiveDate::from_ymd_opt(2024, 2, 16).unwrap(),
            quantity,
            lot_size: 100,
            underlying_price: dec!(470),
            option_price: dec!(2.5),
            iv: Some(0.18),
            hv: None,
            iv_hv_ratio: None,
            iv_rank: None,
            iv_percentile: None,
            greeks,
            market_value: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            moneyness_pct: 0.0,
            dte: 30,
            entry_price: dec!(2.5),
            entry_date: None,
        }
    }

    #[test]
    fn test_short_and_long_net_out() {
        let per_share = Greeks {
            delta: -0.2,
            gamma: 0.01,
            theta: -0.04,
            vega: 0.3,
            rho: 0.0,
        };
        let short = snapshot(2, -2, Some(per_share.to_position(-2)));
        let long = snapshot(2, 1, Some(per_share.to_position(1)));

        let greeks = PortfolioGreeks::from_snapshots([&short, &long]);
        assert_eq!(greeks.position_count, 2);
        // Net quantity -1.
        assert_relative_eq!(greeks.delta, 20.0, epsilon = 1e-9);
        assert_relative_eq!(greeks.gamma, -1.0, epsilon = 1e-9);
        assert_relative_eq!(greeks.theta, 4.0, epsilon = 1e-9);
        assert_relative_eq!(greeks.vega, -30.0, epsilon = 1e-9);
        assert_relative_eq!(greeks.theta_gamma_ratio().unwrap(), 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_missing_greeks_counted_and_by_day() {
        let snapshots = vec![
            snapshot(2, -1, None),
            snapshot(3, -1, Some(Greeks::default())),
        ];
        let days = PortfolioGreeks::by_day(&snapshots);
        assert_eq!(days.len(), 2);

        let first = &days[&NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()];
        assert_eq!(first.missing_greeks, 1);
        assert_eq!(first.position_count, 0);
        assert!(first.theta_gamma_ratio().is_none());
    }
}

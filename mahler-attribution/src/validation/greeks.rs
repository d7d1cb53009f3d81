//! Greeks consistency validation.
//!
//! Recomputes per-share Black-Scholes Greeks from each snapshot's IV and
//! compares them with the Greeks carried on the snapshot. Large mismatches
//! usually mean the upstream Greeks use a different scaling convention.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::money::to_f64;
use crate::data::PositionSnapshot;
use crate::pricing::BlackScholes;

/// Result of Greeks validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GreeksValidationReport {
    pub total_rows: usize,
    pub validated_rows: usize,
    pub delta_within_tolerance: usize,
    pub gamma_within_tolerance: usize,
    pub theta_within_tolerance: usize,
    pub vega_within_tolerance: usize,
    /// Model price at the snapshot IV within tolerance of the mid.
    pub price_consistent: usize,
    pub delta_tolerance: f64,
    pub gamma_tolerance: f64,
    pub theta_tolerance: f64,
    pub vega_tolerance: f64,
}

impl GreeksValidationReport {
    fn rate(&self, passed: usize) -> f64 {
        if self.validated_rows == 0 {
            return 0.0;
        }
        passed as f64 / self.validated_rows as f64
    }

    pub fn delta_pass_rate(&self) -> f64 {
        self.rate(self.delta_within_tolerance)
    }

    pub fn gamma_pass_rate(&self) -> f64 {
        self.rate(self.gamma_within_tolerance)
    }

    pub fn theta_pass_rate(&self) -> f64 {
        self.rate(self.theta_within_tolerance)
    }

    pub fn vega_pass_rate(&self) -> f64 {
        self.rate(self.vega_within_tolerance)
    }

    pub fn price_consistency_rate(&self) -> f64 {
        self.rate(self.price_consistent)
    }

    pub fn summary(&self) -> String {
        format!(
            "Greeks validation ({}/{} rows): delta={:.1}%, gamma={:.1}%, theta={:.1}%, vega={:.1}%, price={:.1}%",
            self.validated_rows,
            self.total_rows,
            self.delta_pass_rate() * 100.0,
            self.gamma_pass_rate() * 100.0,
            self.theta_pass_rate() * 100.0,
            self.vega_pass_rate() * 100.0,
            self.price_consistency_rate() * 100.0
        )
    }

    pub fn all_pass(&self, threshold: f64) -> bool {
        self.delta_pass_rate() >= threshold
            && self.gamma_pass_rate() >= threshold
            && self.theta_pass_rate() >= threshold
            && self.vega_pass_rate() >= threshold
    }
}

/// Validator for snapshot Greeks.
#[derive(Debug, Clone)]
pub struct GreeksConsistencyValidator {
    bs: BlackScholes,
    delta_tolerance: f64,
    gamma_tolerance: f64,
    theta_tolerance: f64,
    vega_tolerance: f64,
    price_tolerance: f64,
}

impl Default for GreeksConsistencyValidator {
    fn default() -> Self {
        Self {
            bs: BlackScholes::default(),
            delta_tolerance: 0.01,
            gamma_tolerance: 0.001,
            theta_tolerance: 0.05,
            vega_tolerance: 0.01,
            price_tolerance: 0.01,
        }
    }
}

impl GreeksConsistencyValidator {
    pub fn new(bs: BlackScholes) -> Self {
        Self {
            bs,
            ..Self::default()
        }
    }

    pub fn with_tolerances(
        mut self,
        delta: f64,
        gamma: f64,
        theta: f64,
        vega: f64,
        price: f64,
    ) -> Self {
        self.delta_tolerance = delta;
        self.gamma_tolerance = gamma;
        self.theta_tolerance = theta;
        self.vega_tolerance = vega;
        self.price_tolerance = price;
        self
    }

    /// Validate every snapshot that carries IV, Greeks and a live contract.
    pub fn validate(&self, snapshots: &[PositionSnapshot]) -> GreeksValidationReport {
        let mut report = GreeksValidationReport {
            total_rows: snapshots.len(),
            delta_tolerance: self.delta_tolerance,
            gamma_tolerance: self.gamma_tolerance,
            theta_tolerance: self.theta_tolerance,
            vega_tolerance: self.vega_tolerance,
            ..GreeksValidationReport::default()
        };

        for snapshot in snapshots {
            let (Some(iv), Some(greeks)) = (snapshot.iv, snapshot.greeks) else {
                continue;
            };
            let Some(given) = greeks.to_per_share(snapshot.quantity) else {
                continue;
            };

            let spot = to_f64(snapshot.underlying_price);
            let strike = to_f64(snapshot.strike);
            if snapshot.dte <= 0 || spot <= 0.0 || strike <= 0.0 {
                continue;
            }

            let time = snapshot.dte as f64 / 365.0;
            let model = self.bs.greeks(spot, strike, time, iv, snapshot.option_type);
            report.validated_rows += 1;

            if (model.delta - given.delta).abs() <= self.delta_tolerance {
                report.delta_within_tolerance += 1;
            }
            if (model.gamma - given.gamma).abs() <= self.gamma_tolerance {
                report.gamma_within_tolerance += 1;
            }
            if (model.theta - given.theta).abs() <= self.theta_tolerance {
                report.theta_within_tolerance += 1;
            }
            if (model.vega - given.vega).abs() <= self.vega_tolerance {
                report.vega_within_tolerance += 1;
            }

            let model_price = self.bs.price(spot, strike, time, iv, snapshot.option_type);
            if (model_price - to_f64(snapshot.option_price)).abs() <= self.price_tolerance {
                report.price_consistent += 1;
            } else {
                debug!(
                    position_id = %snapshot.position_id,
                    date = %snapshot.date,
                    model_price,
                    "Snapshot price inconsistent with its IV"
                );
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::money::price;
    use crate::data::{Greeks, OptionType};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn snapshot(greeks: Option<Greeks>, option_price: Decimal) -> PositionSnapshot {
        PositionSnapshot {
            date: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            position_id: "P1".to_string(),
            underlying: "SPY".to_string(),
            symbol: "SPY".to_string(),
            option_type: OptionType::Call,
            strike: dec!(100),
            expiration: NaiveDate::from_ymd_opt(2024, 7, 3).unwrap(),
            quantity: -3,
            lot_size: 100,
            underlying_price: dec!(100),
            option_price,
            iv: Some(0.2),
            hv: None,
            iv_hv_ratio: None,
            iv_rank: None,
            iv_percentile: None,
            greeks,
            market_value: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            moneyness_pct: 0.0,
            dte: 30,
            entry_price: dec!(2),
            entry_date: None,
        }
    }

    #[test]
    fn test_consistent_position_greeks_pass() {
        let bs = BlackScholes::default();
        let time = 30.0 / 365.0;
        let per_share = bs.greeks(100.0, 100.0, time, 0.2, OptionType::Call);
        let mid = price(bs.call_price(100.0, 100.0, time, 0.2));

        let report = GreeksConsistencyValidator::default()
            .validate(&[snapshot(Some(per_share.to_position(-3)), mid)]);

        assert_eq!(report.validated_rows, 1);
        assert!(report.all_pass(1.0));
        assert_eq!(report.price_consistency_rate(), 1.0);
    }

    #[test]
    fn test_unscaled_greeks_fail_and_missing_skipped() {
        let bs = BlackScholes::default();
        let per_share = bs.greeks(100.0, 100.0, 30.0 / 365.0, 0.2, OptionType::Call);

        // Per-share values stored where position-level ones belong.
        let report = GreeksConsistencyValidator::default().validate(&[
            snapshot(Some(per_share), dec!(2.5)),
            snapshot(None, dec!(2.5)),
        ]);

        assert_eq!(report.total_rows, 2);
        assert_eq!(report.validated_rows, 1);
        assert_eq!(report.delta_pass_rate(), 0.0);
        assert!(!report.all_pass(0.9));
    }

    #[test]
    fn test_empty_report_rates() {
        let report = GreeksConsistencyValidator::default().validate(&[]);
        assert_eq!(report.delta_pass_rate(), 0.0);
        assert!(report.summary().contains("0/0"));
    }
}

//! Implied volatility solver.
//!
//! Brent's method on `model_price(vol) - observed_price` over a fixed
//! volatility bracket. Every call ends in a solved vol or a typed failure
//! within the iteration cap.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::OptionType;

use super::black_scholes::BlackScholes;

/// Where an unsolvable price sits relative to the contract.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundsDiagnostics {
    /// Spot / strike.
    pub moneyness: f64,
    pub intrinsic: f64,
    pub in_the_money: bool,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IvError {
    #[error("No-arbitrage violation: price={price:.4}, intrinsic={intrinsic:.4} ({detail})")]
    ArbitrageViolation {
        price: f64,
        intrinsic: f64,
        detail: String,
    },

    #[error(
        "Price {price:.4} outside model range [{min_price:.4}, {max_price:.4}] \
         (moneyness={:.3}, intrinsic={:.4}, itm={})",
        .diagnostics.moneyness, .diagnostics.intrinsic, .diagnostics.in_the_money
    )]
    OutOfBounds {
        price: f64,
        min_price: f64,
        max_price: f64,
        diagnostics: BoundsDiagnostics,
    },

    #[error("Solver did not converge after {iterations} iterations (last vol {last_vol:.6})")]
    SolverFailed { iterations: usize, last_vol: f64 },
}

/// Pricing and solver parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    /// Risk-free rate.
    pub rate: f64,
    /// Continuous dividend yield.
    pub dividend: f64,
    /// Lower volatility bound.
    pub vol_lower: f64,
    /// Upper volatility bound.
    pub vol_upper: f64,
    /// Convergence tolerance on volatility.
    pub tolerance: f64,
    /// Iteration cap.
    pub max_iterations: usize,
    /// How far below intrinsic a price may sit before it is rejected.
    pub arbitrage_tolerance: f64,
    /// Floor on time to expiry, in years.
    pub min_time_years: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            rate: 0.05,
            dividend: 0.0,
            vol_lower: 0.001,
            vol_upper: 5.0,
            tolerance: 1e-6,
            max_iterations: 100,
            arbitrage_tolerance: 0.01,
            min_time_years: 1.0 / 365.0,
        }
    }
}

impl PricingConfig {
    pub fn black_scholes(&self) -> BlackScholes {
        BlackScholes::new(self.rate, self.dividend)
    }
}

/// Bounded implied volatility solver.
#[derive(Debug, Clone)]
pub struct IvSolver {
    bs: BlackScholes,
    config: PricingConfig,
}

impl Default for IvSolver {
    fn default() -> Self {
        Self::new(PricingConfig::default())
    }
}

impl IvSolver {
    pub fn new(config: PricingConfig) -> Self {
        Self {
            bs: config.black_scholes(),
            config,
        }
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    pub fn black_scholes(&self) -> &BlackScholes {
        &self.bs
    }

    /// Solve for the volatility that reprices the option at `price`.
    ///
    /// `time` is in years and is floored at one day.
    pub fn solve(
        &self,
        price: f64,
        spot: f64,
        strike: f64,
        time: f64,
        opt_type: OptionType,
    ) -> Result<f64, IvError> {
        let intrinsic = if spot.is_finite() && strike.is_finite() {
            opt_type.intrinsic(spot, strike)
        } else {
            0.0
        };

        let invalid = |detail: &str| IvError::ArbitrageViolation {
            price,
            intrinsic,
            detail: detail.to_string(),
        };

        if !price.is_finite() || price <= 0.0 {
            return Err(invalid("price must be positive"));
        }
        if !spot.is_finite() || spot <= 0.0 {
            return Err(invalid("spot must be positive"));
        }
        if !strike.is_finite() || strike <= 0.0 {
            return Err(invalid("strike must be positive"));
        }
        if price - intrinsic < -self.config.arbitrage_tolerance {
            return Err(invalid("price below intrinsic value"));
        }

        let time = if time.is_finite() {
            time.max(self.config.min_time_years)
        } else {
            self.config.min_time_years
        };

        let objective = |vol: f64| self.bs.price(spot, strike, time, vol, opt_type) - price;

        let lower = self.config.vol_lower;
        let upper = self.config.vol_upper;
        let f_lower = objective(lower);
        let f_upper = objective(upper);

        if f_lower == 0.0 {
            return Ok(lower);
        }
        if f_upper == 0.0 {
            return Ok(upper);
        }
        if f_lower > 0.0 || f_upper < 0.0 {
            return Err(IvError::OutOfBounds {
                price,
                min_price: f_lower + price,
                max_price: f_upper + price,
                diagnostics: BoundsDiagnostics {
                    moneyness: spot / strike,
                    intrinsic,
                    in_the_money: intrinsic > 0.0,
                },
            });
        }

        brent(
            objective,
            (lower, f_lower),
            (upper, f_upper),
            self.config.tolerance,
            self.config.max_iterations,
        )
    }
}

/// Brent's root finder on a bracket with a sign change.
fn brent<F: Fn(f64) -> f64>(
    f: F,
    (mut a, mut fa): (f64, f64),
    (mut b, mut fb): (f64, f64),
    tolerance: f64,
    max_iterations: usize,
) -> Result<f64, IvError> {
    let mut c = b;
    let mut fc = fb;
    let mut d = b - a;
    let mut e = d;

    for _ in 0..max_iterations {
        if (fb > 0.0 && fc > 0.0) || (fb < 0.0 && fc < 0.0) {
            c = a;
            fc = fa;
            d = b - a;
            e = d;
        }
        if fc.abs() < fb.abs() {
            a = b;
            b = c;
            c = a;
            fa = fb;
            fb = fc;
            fc = fa;
        }

        let tol1 = 2.0 * f64::EPSILON * b.abs() + 0.5 * tolerance;
        let xm = 0.5 * (c - b);
        if xm.abs() <= tol1 || fb == 0.0 {
            return Ok(b);
        }

        if e.abs() >= tol1 && fa.abs() > fb.abs() {
            // Inverse quadratic interpolation, or secant when only two points.
            let s = fb / fa;
            let (mut p, mut q) = if a == c {
                (2.0 * xm * s, 1.0 - s)
            } else {
                let q0 = fa / fc;
                let r = fb / fc;
                (
                    s * (2.0 * xm * q0 * (q0 - r) - (b - a) * (r - 1.0)),
                    (q0 - 1.0) * (r - 1.0) * (s - 1.0),
                )
            };
            if p > 0.0 {
                q = -q;
            }
            p = p.abs();

            let min1 = 3.0 * xm * q - (tol1 * q).abs();
            let min2 = (e * q).abs();
            if 2.0 * p < min1.min(min2) {
                e = d;
                d = p / q;
            } else {
                d = xm;
                e = d;
            }
        } else {
            d = xm;
            e = d;
        }

        a = b;
        fa = fb;
        b += if d.abs() > tol1 { d } else { tol1.copysign(xm) };
        fb = f(b);
    }

    Err(IvError::SolverFailed {
        iterations: max_iterations,
        last_vol: b,
    })
}

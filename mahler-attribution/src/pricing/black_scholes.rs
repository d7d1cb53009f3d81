//! Black-Scholes pricing and closed-form Greeks.
//!
//! Conventions:
//! - Theta is per calendar day (annual theta / 365)
//! - Vega is per 1 percentage point of volatility
//! - Rho is per 1 percentage point of rate

use std::f64::consts::{PI, SQRT_2};

use statrs::function::erf::erfc;

use crate::data::{Greeks, OptionType};

/// Black-Scholes calculator for options pricing and Greeks.
#[derive(Debug, Clone, Copy)]
pub struct BlackScholes {
    /// Risk-free interest rate
    pub rate: f64,
    /// Dividend yield
    pub dividend: f64,
}

impl Default for BlackScholes {
    fn default() -> Self {
        Self {
            rate: 0.05,
            dividend: 0.0,
        }
    }
}

impl BlackScholes {
    pub fn new(rate: f64, dividend: f64) -> Self {
        Self { rate, dividend }
    }

    /// Calculate d1 parameter.
    fn d1(&self, spot: f64, strike: f64, time: f64, vol: f64) -> f64 {
        let numerator =
            (spot / strike).ln() + (self.rate - self.dividend + 0.5 * vol * vol) * time;
        numerator / (vol * time.sqrt())
    }

    /// Calculate d2 parameter.
    fn d2(&self, spot: f64, strike: f64, time: f64, vol: f64) -> f64 {
        self.d1(spot, strike, time, vol) - vol * time.sqrt()
    }

    /// Standard normal CDF.
    pub fn norm_cdf(x: f64) -> f64 {
        0.5 * erfc(-x / SQRT_2)
    }

    /// Standard normal PDF.
    pub fn norm_pdf(x: f64) -> f64 {
        (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
    }

    fn degenerate(time: f64, vol: f64) -> bool {
        time <= 0.0 || vol <= 0.0
    }

    /// Calculate call option price.
    pub fn call_price(&self, spot: f64, strike: f64, time: f64, vol: f64) -> f64 {
        if Self::degenerate(time, vol) {
            return (spot - strike).max(0.0);
        }

        let d1 = self.d1(spot, strike, time, vol);
        let d2 = self.d2(spot, strike, time, vol);

        spot * (-self.dividend * time).exp() * Self::norm_cdf(d1)
            - strike * (-self.rate * time).exp() * Self::norm_cdf(d2)
    }

    /// Calculate put option price.
    pub fn put_price(&self, spot: f64, strike: f64, time: f64, vol: f64) -> f64 {
        if Self::degenerate(time, vol) {
            return (strike - spot).max(0.0);
        }

        let d1 = self.d1(spot, strike, time, vol);
        let d2 = self.d2(spot, strike, time, vol);

        strike * (-self.rate * time).exp() * Self::norm_cdf(-d2)
            - spot * (-self.dividend * time).exp() * Self::norm_cdf(-d1)
    }

    /// Calculate option price based on type.
    pub fn price(&self, spot: f64, strike: f64, time: f64, vol: f64, opt_type: OptionType) -> f64 {
        match opt_type {
            OptionType::Call => self.call_price(spot, strike, time, vol),
            OptionType::Put => self.put_price(spot, strike, time, vol),
        }
    }

    /// Calculate delta.
    pub fn delta(&self, spot: f64, strike: f64, time: f64, vol: f64, opt_type: OptionType) -> f64 {
        if Self::degenerate(time, vol) {
            return match opt_type {
                OptionType::Call if spot > strike => 1.0,
                OptionType::Put if spot < strike => -1.0,
                _ => 0.0,
            };
        }

        let d1 = self.d1(spot, strike, time, vol);
        let discount = (-self.dividend * time).exp();

        match opt_type {
            OptionType::Call => discount * Self::norm_cdf(d1),
            OptionType::Put => discount * (Self::norm_cdf(d1) - 1.0),
        }
    }

    /// Calculate gamma (same for calls and puts).
    pub fn gamma(&self, spot: f64, strike: f64, time: f64, vol: f64) -> f64 {
        if Self::degenerate(time, vol) {
            return 0.0;
        }

        let d1 = self.d1(spot, strike, time, vol);
        let discount = (-self.dividend * time).exp();

        discount * Self::norm_pdf(d1) / (spot * vol * time.sqrt())
    }

    /// Calculate vega (same for calls and puts), per 1% change in volatility.
    pub fn vega(&self, spot: f64, strike: f64, time: f64, vol: f64) -> f64 {
        if Self::degenerate(time, vol) {
            return 0.0;
        }

        let d1 = self.d1(spot, strike, time, vol);
        let discount = (-self.dividend * time).exp();

        spot * discount * Self::norm_pdf(d1) * time.sqrt() / 100.0
    }

    /// Calculate theta per calendar day.
    pub fn theta(&self, spot: f64, strike: f64, time: f64, vol: f64, opt_type: OptionType) -> f64 {
        if Self::degenerate(time, vol) {
            return 0.0;
        }

        let d1 = self.d1(spot, strike, time, vol);
        let d2 = self.d2(spot, strike, time, vol);
        let discount_d = (-self.dividend * time).exp();
        let discount_r = (-self.rate * time).exp();

        let term1 = -spot * discount_d * Self::norm_pdf(d1) * vol / (2.0 * time.sqrt());

        let annual = match opt_type {
            OptionType::Call => {
                let term2 = self.dividend * spot * discount_d * Self::norm_cdf(d1);
                let term3 = self.rate * strike * discount_r * Self::norm_cdf(d2);
                term1 + term2 - term3
            }
            OptionType::Put => {
                let term2 = self.dividend * spot * discount_d * Self::norm_cdf(-d1);
                let term3 = self.rate * strike * discount_r * Self::norm_cdf(-d2);
                term1 - term2 + term3
            }
        };

        annual / 365.0
    }

    /// Calculate rho, per 1% change in rate.
    pub fn rho(&self, spot: f64, strike: f64, time: f64, vol: f64, opt_type: OptionType) -> f64 {
        if Self::degenerate(time, vol) {
            return 0.0;
        }

        let d2 = self.d2(spot, strike, time, vol);
        let discount = (-self.rate * time).exp();

        match opt_type {
            OptionType::Call => strike * time * discount * Self::norm_cdf(d2) / 100.0,
            OptionType::Put => -strike * time * discount * Self::norm_cdf(-d2) / 100.0,
        }
    }

    /// All per-share Greeks at once.
    pub fn greeks(
        &self,
        spot: f64,
        strike: f64,
        time: f64,
        vol: f64,
        opt_type: OptionType,
    ) -> Greeks {
        Greeks {
            delta: self.delta(spot, strike, time, vol, opt_type),
            gamma: self.gamma(spot, strike, time, vol),
            theta: self.theta(spot, strike, time, vol, opt_type),
            vega: self.vega(spot, strike, time, vol),
            rho: self.rho(spot, strike, time, vol, opt_type),
        }
    }
}

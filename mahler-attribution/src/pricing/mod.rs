//! Option pricing: closed-form Black-Scholes Greeks and the implied
//! volatility solver built on top of them.

pub mod black_scholes;
pub mod implied_vol;

pub use black_scholes::BlackScholes;
pub use implied_vol::{BoundsDiagnostics, IvError, IvSolver, PricingConfig};

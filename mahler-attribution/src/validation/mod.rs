//! Validation of snapshot Greeks against the pricing model.

pub mod greeks;

pub use greeks::{GreeksConsistencyValidator, GreeksValidationReport};

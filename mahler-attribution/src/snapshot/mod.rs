pub mod builder;
pub mod portfolio;

pub use builder::{RecoveryError, SnapshotBuilder, SnapshotError};
pub use portfolio::PortfolioGreeks;

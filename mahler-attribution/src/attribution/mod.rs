//! Greek PnL attribution and slicing.

pub mod engine;
pub mod exit_reason;
pub mod slices;
pub mod types;

pub use engine::{greek_pnl, PnlAttributionEngine, TradeBook};
pub use slices::{iv_rank_bucket, slice, slice_all, SliceClassifier, SliceStats};
pub use types::{
    AttributionBasis, AttributionError, AttributionRun, AttributionSummary, DailyAttribution,
    GreekPnl, PositionDailyAttribution, TradeAttribution, UnattributedDisappearance,
};

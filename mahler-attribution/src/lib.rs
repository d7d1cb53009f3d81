pub mod attribution;
pub mod config;
pub mod data;
pub mod diagnosis;
pub mod metrics;
pub mod pipeline;
pub mod pricing;
pub mod regime;
pub mod snapshot;
pub mod validation;

// Re-export commonly used types
pub use attribution::{
    AttributionError, AttributionRun, DailyAttribution, PnlAttributionEngine,
    PositionDailyAttribution, SliceClassifier, SliceStats, TradeAttribution,
};
pub use config::{AnalysisConfig, ConfigError};
pub use data::{
    DataLoader, Estimate, Greeks, InMemoryMarketData, MarketDataProvider, OptionType,
    PositionSnapshot, RawPositionRecord, TradeRecord,
};
pub use diagnosis::{StrategyDiagnosis, StrategyDiagnosisReport};
pub use metrics::MetricsCalculator;
pub use pipeline::{AnalysisPipeline, AnalysisReport};
pub use pricing::{BlackScholes, IvSolver, PricingConfig};
pub use regime::{DayRegime, RegimeAnalyzer, RegimeStats};
pub use snapshot::{PortfolioGreeks, SnapshotBuilder};
pub use validation::GreeksConsistencyValidator;

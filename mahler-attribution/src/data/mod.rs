pub mod loader;
pub mod market;
pub mod money;
pub mod records;
pub mod types;

pub use loader::{DataLoader, LoaderError};
pub use market::{CachedMarketData, InMemoryMarketData, MacroEvent, MarketDataError, MarketDataProvider};
pub use records::{ExitReasonType, RawPositionRecord, TradeAction, TradeRecord};
pub use types::{
    Estimate, Greeks, OptionType, PortfolioSnapshot, PositionSide, PositionSnapshot,
};

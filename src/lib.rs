pub mod api;
pub mod config;
pub mod datasource;
pub mod domain;
pub mod engine;
pub mod error;
pub mod normalize;
pub mod orchestration;

pub use config::{Config, PnlMode};
pub use datasource::{DataSource, DataSourceError, MockDataSource, PolymarketDataSource};
pub use domain::{Category, Decimal, MarkPrice, MarketId, Side, TimeMs, Trade};
pub use engine::{AccountSummary, ComputationError, PositionAccumulator, ValuationEngine};
pub use error::AppError;
pub use normalize::{MalformedTradeError, Normalizer, RawFill};
pub use orchestration::{RefreshScheduler, Snapshot, SnapshotReader};

//! Pure computation engine(s) for deterministic ledger logic.
//!
//! trades -> [`PositionAccumulator`] -> [`ValuationEngine`] -> [`Aggregator`]

use crate::domain::{Decimal, MarketId, TimeMs};
use thiserror::Error;

pub mod accumulator;
pub mod aggregate;
pub mod valuation;

pub use accumulator::{PositionAccumulator, PositionMap, PositionState};
pub use aggregate::{
    daily_cash_flow, AccountSummary, Aggregator, CategorySubtotal, DailyCashFlow, DailyPnl,
};
pub use valuation::{
    MissingPriceError, Valuation, ValuationEngine, ValuedPosition, ValuedPositionMap,
};

/// An invariant violation inside the engine. Fatal to one refresh cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComputationError {
    #[error("trade {trade_key} has non-positive size {size}")]
    NonPositiveSize { trade_key: String, size: Decimal },
    #[error("trade {trade_key} has price {price} outside [0, 1]")]
    PriceOutOfRange { trade_key: String, price: Decimal },
    #[error("trade {trade_key} has negative fee {fee}")]
    NegativeFee { trade_key: String, fee: Decimal },
    #[error(
        "trade {trade_key} at {} precedes last applied trade at {} in {market_id}",
        time_ms.as_ms(),
        last_ms.as_ms()
    )]
    OutOfOrder {
        market_id: MarketId,
        trade_key: String,
        time_ms: TimeMs,
        last_ms: TimeMs,
    },
    #[error("decimal overflow in {context}")]
    Overflow { context: String },
}

impl ComputationError {
    pub(crate) fn overflow(context: impl Into<String>) -> Self {
        ComputationError::Overflow {
            context: context.into(),
        }
    }
}

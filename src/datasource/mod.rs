//! Data source abstraction for fetching fill history and mark prices.

use crate::domain::{MarkPrice, MarketId};
use crate::normalize::RawFill;
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

pub mod mock;
pub mod polymarket;

pub use mock::MockDataSource;
pub use polymarket::PolymarketDataSource;

/// Position in the paginated fill history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    pub offset: usize,
    pub limit: usize,
}

impl PageCursor {
    pub fn first(limit: usize) -> Self {
        Self { offset: 0, limit }
    }

    pub fn next(&self) -> Self {
        Self {
            offset: self.offset + self.limit,
            limit: self.limit,
        }
    }
}

/// One page of raw fill records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FillPage {
    pub fills: Vec<RawFill>,
    /// Cursor for the following page, `None` when this was the last one.
    pub next: Option<PageCursor>,
}

impl FillPage {
    /// A page shorter than the requested limit is the last one.
    pub fn from_records(fills: Vec<RawFill>, cursor: PageCursor) -> Self {
        let next = if cursor.limit > 0 && fills.len() >= cursor.limit {
            Some(cursor.next())
        } else {
            None
        };
        Self { fills, next }
    }
}

/// Data source trait for fetching fills and mark prices.
///
/// Implementations must handle retry/backoff and rate limiting.
#[async_trait]
pub trait DataSource: Send + Sync + fmt::Debug {
    /// Fetch one page of the account's fill/activity history, oldest first.
    ///
    /// # Arguments
    /// * `user` - Wallet address
    /// * `cursor` - Page position; start with [`PageCursor::first`]
    async fn fetch_fill_page(
        &self,
        user: &str,
        cursor: PageCursor,
    ) -> Result<FillPage, DataSourceError>;

    /// Fetch current marks for the given markets.
    ///
    /// Markets the source cannot price are simply absent from the result.
    async fn fetch_marks(&self, markets: &[MarketId]) -> Result<Vec<MarkPrice>, DataSourceError>;
}

/// Error type for data source operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataSourceError {
    /// Network error (e.g., connection timeout, DNS failure)
    #[error("Network error: {0}")]
    NetworkError(String),
    /// HTTP error (e.g., 5xx server error, 4xx client error)
    #[error("HTTP error {status}: {message}")]
    HttpError { status: u16, message: String },
    /// Invalid JSON or unexpected response shape
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Rate limited")]
    RateLimited,
    #[error("Error: {0}")]
    Other(String),
}

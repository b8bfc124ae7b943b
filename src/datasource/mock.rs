//! Mock data source for testing without network calls.

use super::{DataSource, DataSourceError, FillPage, PageCursor};
use crate::domain::{MarkPrice, MarketId};
use crate::normalize::RawFill;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

/// Mock data source that serves scripted fills and marks.
///
/// Fills are paged by offset/limit like the real activity feed. Data can be
/// replaced between refreshes, and failures injected for the next N calls.
#[derive(Debug, Default)]
pub struct MockDataSource {
    fills: RwLock<Vec<RawFill>>,
    marks: RwLock<Vec<MarkPrice>>,
    fill_failures: AtomicUsize,
    mark_failures: AtomicUsize,
    fill_page_calls: AtomicUsize,
    delay: Option<Duration>,
}

impl MockDataSource {
    /// Create a new mock data source with empty data.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fills(mut self, fills: Vec<RawFill>) -> Self {
        self.fills.get_mut().extend(fills);
        self
    }

    pub fn with_marks(mut self, marks: Vec<MarkPrice>) -> Self {
        self.marks.get_mut().extend(marks);
        self
    }

    /// Sleep this long before answering each fill page request.
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn set_fills(&self, fills: Vec<RawFill>) {
        *self.fills.write().await = fills;
    }

    pub async fn set_marks(&self, marks: Vec<MarkPrice>) {
        *self.marks.write().await = marks;
    }

    /// Fail the next `n` fill page requests with a network error.
    pub fn fail_next_fill_fetches(&self, n: usize) {
        self.fill_failures.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` mark requests with a network error.
    pub fn fail_next_mark_fetches(&self, n: usize) {
        self.mark_failures.store(n, Ordering::SeqCst);
    }

    pub fn fill_page_calls(&self) -> usize {
        self.fill_page_calls.load(Ordering::SeqCst)
    }
}

/// Decrement a pending-failure counter; true if this call should fail.
fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl DataSource for MockDataSource {
    async fn fetch_fill_page(
        &self,
        _user: &str,
        cursor: PageCursor,
    ) -> Result<FillPage, DataSourceError> {
        self.fill_page_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if take_failure(&self.fill_failures) {
            return Err(DataSourceError::NetworkError("injected failure".to_string()));
        }

        let fills = self.fills.read().await;
        let page: Vec<RawFill> = fills
            .iter()
            .skip(cursor.offset)
            .take(cursor.limit)
            .cloned()
            .collect();
        Ok(FillPage::from_records(page, cursor))
    }

    async fn fetch_marks(&self, markets: &[MarketId]) -> Result<Vec<MarkPrice>, DataSourceError> {
        if take_failure(&self.mark_failures) {
            return Err(DataSourceError::NetworkError("injected failure".to_string()));
        }

        Ok(self
            .marks
            .read()
            .await
            .iter()
            .filter(|m| markets.contains(&m.market_id))
            .cloned()
            .collect())
    }
}

use crate::datasource::{DataSource, DataSourceError, PageCursor};
use crate::domain::{MarkPrice, MarketId};
use crate::normalize::RawFill;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Transport-level failure of one refresh. The previous snapshot stays.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("fill history page {page} failed: {source}")]
    Fills {
        page: usize,
        #[source]
        source: DataSourceError,
    },
    #[error("mark price fetch failed: {0}")]
    Marks(#[source] DataSourceError),
}

/// Raw fill pages in fetch order.
#[derive(Debug, Clone, Default)]
pub struct FetchedHistory {
    pub pages: Vec<Vec<RawFill>>,
    /// More pages existed beyond the page limit.
    pub truncated: bool,
}

impl FetchedHistory {
    pub fn record_count(&self) -> usize {
        self.pages.iter().map(Vec::len).sum()
    }
}

/// Pulls the account's fill history and marks from a [`DataSource`].
#[derive(Debug, Clone)]
pub struct Ingestor {
    datasource: Arc<dyn DataSource>,
    user: String,
    page_size: usize,
    max_pages: usize,
}

impl Ingestor {
    pub fn new(
        datasource: Arc<dyn DataSource>,
        user: String,
        page_size: usize,
        max_pages: usize,
    ) -> Self {
        Self {
            datasource,
            user,
            page_size: page_size.max(1),
            max_pages: max_pages.max(1),
        }
    }

    /// Walk the paginated history from the start, up to `max_pages` pages.
    pub async fn fetch_history(&self) -> Result<FetchedHistory, FetchError> {
        let mut history = FetchedHistory::default();
        let mut cursor = Some(PageCursor::first(self.page_size));

        while let Some(current) = cursor {
            if history.pages.len() >= self.max_pages {
                warn!(
                    "Fill history for {} truncated at {} pages",
                    self.user, self.max_pages
                );
                history.truncated = true;
                break;
            }

            let page_index = history.pages.len();
            let page = self
                .datasource
                .fetch_fill_page(&self.user, current)
                .await
                .map_err(|source| FetchError::Fills {
                    page: page_index,
                    source,
                })?;
            debug!(
                "Fetched page {} ({} records) for {}",
                page_index,
                page.fills.len(),
                self.user
            );
            cursor = page.next;
            history.pages.push(page.fills);
        }

        Ok(history)
    }

    pub async fn fetch_marks(&self, markets: &[MarketId]) -> Result<Vec<MarkPrice>, FetchError> {
        if markets.is_empty() {
            return Ok(Vec::new());
        }
        self.datasource
            .fetch_marks(markets)
            .await
            .map_err(FetchError::Marks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::MockDataSource;

    fn fills(n: usize) -> Vec<RawFill> {
        (0..n)
            .map(|i| RawFill {
                id: Some(format!("f{}", i)),
                ..Default::default()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_fetch_history_walks_all_pages() {
        let mock = Arc::new(MockDataSource::new().with_fills(fills(5)));
        let ingestor = Ingestor::new(mock.clone(), "0x1".to_string(), 2, 10);

        let history = ingestor.fetch_history().await.unwrap();
        assert_eq!(history.pages.len(), 3);
        assert_eq!(history.record_count(), 5);
        assert!(!history.truncated);
        assert_eq!(mock.fill_page_calls(), 3);
    }

    #[tokio::test]
    async fn test_fetch_history_stops_at_page_limit() {
        let mock = Arc::new(MockDataSource::new().with_fills(fills(10)));
        let ingestor = Ingestor::new(mock, "0x1".to_string(), 2, 2);

        let history = ingestor.fetch_history().await.unwrap();
        assert_eq!(history.record_count(), 4);
        assert!(history.truncated);
    }

    #[tokio::test]
    async fn test_fetch_error_reports_page() {
        let mock = Arc::new(MockDataSource::new().with_fills(fills(3)));
        mock.fail_next_fill_fetches(1);
        let ingestor = Ingestor::new(mock, "0x1".to_string(), 2, 10);

        match ingestor.fetch_history().await {
            Err(FetchError::Fills { page, .. }) => assert_eq!(page, 0),
            other => panic!("Expected Fills error, got {:?}", other),
        }
    }
}

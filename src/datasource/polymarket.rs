//! Polymarket API client implementation.
//!
//! Fill history comes from the Data API activity feed; marks come from the
//! Gamma markets endpoint.

use super::{DataSource, DataSourceError, FillPage, PageCursor};
use crate::domain::{Decimal, MarkPrice, MarketId, TimeMs};
use crate::normalize::RawFill;
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use futures::future::join_all;
use reqwest::Client;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_DATA_API_URL: &str = "https://data-api.polymarket.com";
pub const DEFAULT_GAMMA_API_URL: &str = "https://gamma-api.polymarket.com";

/// Gamma rejects long id lists; requests are split into batches of this size.
const GAMMA_BATCH_SIZE: usize = 50;

/// Polymarket data source using the public Data and Gamma APIs.
#[derive(Debug, Clone)]
pub struct PolymarketDataSource {
    client: Client,
    data_api_url: String,
    gamma_api_url: String,
}

impl PolymarketDataSource {
    pub fn new(data_api_url: String, gamma_api_url: String) -> Self {
        Self {
            client: Client::new(),
            data_api_url: data_api_url.trim_end_matches('/').to_string(),
            gamma_api_url: gamma_api_url.trim_end_matches('/').to_string(),
        }
    }

    /// Create with the public Polymarket API URLs.
    pub fn default_urls() -> Self {
        Self::new(
            DEFAULT_DATA_API_URL.to_string(),
            DEFAULT_GAMMA_API_URL.to_string(),
        )
    }

    async fn get_json(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<serde_json::Value, DataSourceError> {
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        retry(backoff, || async {
            let response = self
                .client
                .get(url)
                .query(query)
                .timeout(Duration::from_secs(15))
                .send()
                .await
                .map_err(|e| {
                    backoff::Error::transient(DataSourceError::NetworkError(e.to_string()))
                })?;

            let status = response.status();
            if status == 429 {
                warn!("Rate limited by {}, backing off", url);
                return Err(backoff::Error::transient(DataSourceError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(DataSourceError::HttpError {
                    status: status.as_u16(),
                    message: "Server error".to_string(),
                }));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(DataSourceError::HttpError {
                    status: status.as_u16(),
                    message: "Client error".to_string(),
                }));
            }

            response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| backoff::Error::permanent(DataSourceError::ParseError(e.to_string())))
        })
        .await
    }

    async fn fetch_gamma_markets(
        &self,
        condition_ids: &[String],
    ) -> Result<Vec<serde_json::Value>, DataSourceError> {
        // Gamma wants repeated parameters; a comma-joined list returns nothing.
        let query: Vec<(&str, String)> = condition_ids
            .iter()
            .map(|id| ("condition_ids", id.clone()))
            .collect();
        let url = format!("{}/markets", self.gamma_api_url);
        let response = self.get_json(&url, &query).await?;

        response
            .as_array()
            .cloned()
            .ok_or_else(|| DataSourceError::ParseError("Expected array response".to_string()))
    }
}

#[async_trait]
impl DataSource for PolymarketDataSource {
    async fn fetch_fill_page(
        &self,
        user: &str,
        cursor: PageCursor,
    ) -> Result<FillPage, DataSourceError> {
        debug!(
            "Fetching activity for user={}, offset={}, limit={}",
            user, cursor.offset, cursor.limit
        );

        let url = format!("{}/activity", self.data_api_url);
        let query = [
            ("user", user.to_string()),
            ("limit", cursor.limit.to_string()),
            ("offset", cursor.offset.to_string()),
            ("sortBy", "TIMESTAMP".to_string()),
            ("sortDirection", "ASC".to_string()),
        ];
        let response = self.get_json(&url, &query).await?;

        let records = response
            .as_array()
            .ok_or_else(|| DataSourceError::ParseError("Expected array response".to_string()))?;

        Ok(FillPage::from_records(decode_activity(records), cursor))
    }

    async fn fetch_marks(&self, markets: &[MarketId]) -> Result<Vec<MarkPrice>, DataSourceError> {
        let condition_ids: Vec<String> = markets
            .iter()
            .filter(|m| m.outcome().is_some())
            .map(|m| m.condition_id().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if condition_ids.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            "Fetching marks for {} markets in {} conditions",
            markets.len(),
            condition_ids.len()
        );

        let batches = join_all(
            condition_ids
                .chunks(GAMMA_BATCH_SIZE)
                .map(|chunk| self.fetch_gamma_markets(chunk)),
        )
        .await;
        let gamma_markets = merge_batches(batches)?;

        let as_of = TimeMs::now();
        let mut prices: HashMap<(String, String), Decimal> = HashMap::new();
        for market in &gamma_markets {
            for ((condition_id, outcome), price) in parse_outcome_prices(market) {
                prices.insert((condition_id, outcome), price);
            }
        }

        Ok(markets
            .iter()
            .filter_map(|market_id| {
                let outcome = market_id.outcome()?.trim().to_lowercase();
                let key = (market_id.condition_id().to_string(), outcome);
                prices
                    .get(&key)
                    .map(|price| MarkPrice::new(market_id.clone(), *price, as_of))
            })
            .collect())
    }
}

/// Decode one activity page. A record that does not decode stays in the page
/// as an undecodable placeholder so the normalizer reports it.
fn decode_activity(records: &[serde_json::Value]) -> Vec<RawFill> {
    records
        .iter()
        .map(|record| {
            serde_json::from_value::<RawFill>(record.clone()).unwrap_or_else(|e| {
                warn!("Failed to parse activity record: {}", e);
                RawFill::undecodable(record, e.to_string())
            })
        })
        .collect()
}

/// Keep the Gamma batches that came back. Failed batches leave their markets
/// unpriced; only a total failure is an error.
fn merge_batches(
    batches: Vec<Result<Vec<serde_json::Value>, DataSourceError>>,
) -> Result<Vec<serde_json::Value>, DataSourceError> {
    let total = batches.len();
    let mut markets = Vec::new();
    let mut last_error = None;
    let mut failed = 0;
    for batch in batches {
        match batch {
            Ok(batch) => markets.extend(batch),
            Err(e) => {
                failed += 1;
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(e) if failed == total => Err(e),
        Some(e) => {
            warn!(
                "{} of {} Gamma batches failed, last error: {}",
                failed, total, e
            );
            Ok(markets)
        }
        None => Ok(markets),
    }
}

/// Read `(condition id, lowercased outcome) -> price` pairs from a Gamma
/// market object. `outcomes` and `outcomePrices` are JSON arrays, usually
/// encoded as strings.
fn parse_outcome_prices(market: &serde_json::Value) -> Vec<((String, String), Decimal)> {
    let Some(condition_id) = market.get("conditionId").and_then(|v| v.as_str()) else {
        return Vec::new();
    };
    let (Some(outcomes), Some(prices)) = (
        market.get("outcomes").and_then(json_list),
        market.get("outcomePrices").and_then(json_list),
    ) else {
        warn!("Market {} has no outcome prices", condition_id);
        return Vec::new();
    };

    outcomes
        .into_iter()
        .zip(prices)
        .filter_map(|(outcome, price)| match Decimal::from_str_canonical(&price) {
            Ok(price) => Some((
                (condition_id.to_string(), outcome.trim().to_lowercase()),
                price,
            )),
            Err(e) => {
                warn!(
                    "Invalid price {:?} for {}:{}: {}",
                    price, condition_id, outcome, e
                );
                None
            }
        })
        .collect()
}

fn json_list(value: &serde_json::Value) -> Option<Vec<String>> {
    let items = match value {
        serde_json::Value::String(s) => serde_json::from_str::<Vec<serde_json::Value>>(s).ok()?,
        serde_json::Value::Array(items) => items.clone(),
        _ => return None,
    };
    Some(
        items
            .into_iter()
            .map(|item| match item {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
    )
}

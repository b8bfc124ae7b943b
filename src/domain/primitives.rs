//! Domain primitives: TimeMs, MarketId, Category, Side.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Time in milliseconds since Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeMs(pub i64);

impl TimeMs {
    pub fn new(ms: i64) -> Self {
        TimeMs(ms)
    }

    pub fn now() -> Self {
        TimeMs(Utc::now().timestamp_millis())
    }

    pub fn as_ms(&self) -> i64 {
        self.0
    }

    /// UTC calendar day this instant falls on.
    pub fn utc_date(&self) -> Option<NaiveDate> {
        DateTime::<Utc>::from_timestamp_millis(self.0).map(|dt| dt.date_naive())
    }
}

/// Canonical identifier of a tradeable position: one outcome of one market.
///
/// Formatted as `<condition_id>:<outcome>`; the bare condition id is used when
/// the record carries no outcome (market-wide settlements).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MarketId(pub String);

impl MarketId {
    pub fn new(id: impl Into<String>) -> Self {
        MarketId(id.into())
    }

    pub fn for_outcome(condition_id: &str, outcome: Option<&str>) -> Self {
        match outcome.map(str::trim).filter(|o| !o.is_empty()) {
            Some(outcome) => MarketId(format!("{}:{}", condition_id.trim(), outcome)),
            None => MarketId(condition_id.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn condition_id(&self) -> &str {
        self.0.split_once(':').map(|(c, _)| c).unwrap_or(&self.0)
    }

    pub fn outcome(&self) -> Option<&str> {
        self.0.split_once(':').map(|(_, o)| o)
    }
}

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Market classification used for the category rollup.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Category(pub String);

impl Category {
    pub const UNCATEGORIZED: &'static str = "Uncategorized";

    pub fn new(name: impl Into<String>) -> Self {
        Category(name.into())
    }

    pub fn uncategorized() -> Self {
        Category(Self::UNCATEGORIZED.to_string())
    }

    /// Category from a market slug: the text before the first `-`.
    ///
    /// `nba-lakers-vs-celtics` is `nba`; an empty slug has no category.
    pub fn from_slug(slug: &str) -> Option<Self> {
        let prefix = slug.trim().split('-').next().unwrap_or("").trim();
        if prefix.is_empty() {
            None
        } else {
            Some(Category(prefix.to_lowercase()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Category {
    fn default() -> Self {
        Category::uncategorized()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trade side: Buy or Sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Parse the side encodings used across the market APIs.
    pub fn parse(raw: &str) -> Option<Side> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "BUY" | "B" | "BID" | "LONG" => Some(Side::Buy),
            "SELL" | "S" | "A" | "ASK" | "SHORT" => Some(Side::Sell),
            _ => None,
        }
    }

    pub fn sign(&self) -> i32 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

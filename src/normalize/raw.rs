//! Raw fill records as delivered by the market APIs.
//!
//! The activity feed and the order-book trade feed name the same things
//! differently (`conditionId` vs `market`, `timestamp` vs `match_time`) and
//! encode numbers either as JSON numbers or numeric strings. [`RawFill`]
//! accepts all of them; the normalizer resolves which field wins.

use crate::domain::Decimal;
use serde::{Deserialize, Serialize};

/// A number that may arrive as a JSON number or as a numeric string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawNumber {
    Number(serde_json::Number),
    Text(String),
}

impl RawNumber {
    pub fn to_decimal(&self) -> Option<Decimal> {
        match self {
            RawNumber::Number(n) => Decimal::from_str_canonical(&n.to_string()).ok(),
            RawNumber::Text(s) => Decimal::from_str_canonical(s).ok(),
        }
    }

    pub fn to_i64(&self) -> Option<i64> {
        match self {
            RawNumber::Number(n) => n.as_i64(),
            RawNumber::Text(s) => s.trim().parse::<i64>().ok(),
        }
    }

    pub fn raw_text(&self) -> String {
        match self {
            RawNumber::Number(n) => n.to_string(),
            RawNumber::Text(s) => s.clone(),
        }
    }
}

impl From<&str> for RawNumber {
    fn from(value: &str) -> Self {
        RawNumber::Text(value.to_string())
    }
}

impl From<i64> for RawNumber {
    fn from(value: i64) -> Self {
        RawNumber::Number(value.into())
    }
}

/// One untyped fill/activity record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawFill {
    pub id: Option<String>,
    #[serde(alias = "transactionHash")]
    pub transaction_hash: Option<String>,
    /// Activity type: `TRADE`, `REDEEM`, ...
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(alias = "conditionId")]
    pub condition_id: Option<String>,
    pub market: Option<String>,
    pub outcome: Option<String>,
    pub side: Option<String>,
    pub size: Option<RawNumber>,
    pub price: Option<RawNumber>,
    #[serde(alias = "usdcSize")]
    pub usdc_size: Option<RawNumber>,
    pub fee: Option<RawNumber>,
    #[serde(alias = "feeRateBps")]
    pub fee_rate_bps: Option<RawNumber>,
    pub timestamp: Option<RawNumber>,
    #[serde(alias = "matchTime")]
    pub match_time: Option<RawNumber>,
    pub time: Option<RawNumber>,
    pub status: Option<String>,
    pub sequence: Option<RawNumber>,
    pub slug: Option<String>,
    pub title: Option<String>,
    /// Set when the upstream record could not be decoded at all.
    #[serde(skip)]
    pub decode_error: Option<String>,
}

impl RawFill {
    /// Placeholder for a record that failed to decode, keeping whatever
    /// identifier it carried so the rejection can be traced.
    pub fn undecodable(value: &serde_json::Value, reason: String) -> Self {
        let text = |key: &str| {
            value
                .get(key)
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        };
        RawFill {
            id: text("id"),
            transaction_hash: text("transactionHash").or_else(|| text("transaction_hash")),
            decode_error: Some(reason),
            ..RawFill::default()
        }
    }

    /// Identifier of the record for error reporting and trade keys.
    pub fn record_id(&self) -> Option<&str> {
        self.transaction_hash
            .as_deref()
            .or(self.id.as_deref())
            .filter(|s| !s.trim().is_empty())
    }

    pub fn condition(&self) -> Option<&str> {
        self.condition_id
            .as_deref()
            .or(self.market.as_deref())
            .filter(|s| !s.trim().is_empty())
    }

    pub fn raw_timestamp(&self) -> Option<&RawNumber> {
        self.timestamp
            .as_ref()
            .or(self.match_time.as_ref())
            .or(self.time.as_ref())
    }
}

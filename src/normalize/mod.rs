//! Trade ledger normalizer.
//!
//! Converts raw fill records into canonical [`Trade`] values sorted into replay
//! order. Bad records are dropped and reported; they never fail the batch.

use crate::domain::{
    sort_trades_deterministic, Category, CategoryMap, Decimal, MarketId, Side, TimeMs, TitleMap,
    Trade, TradeKind,
};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

pub mod raw;

pub use raw::{RawFill, RawNumber};

/// Timestamps below this value are Unix seconds, above it milliseconds.
const SECONDS_THRESHOLD: i64 = 100_000_000_000;

const BPS: i64 = 10_000;

/// Order-book statuses that represent a settled execution.
const SETTLED_STATUSES: [&str; 3] = ["MATCHED", "MINED", "CONFIRMED"];

/// Why a raw record was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedTradeError {
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("invalid number in {field}: {value}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("size must be positive, got {0}")]
    NonPositiveSize(Decimal),
    #[error("price {0} outside [0, 1]")]
    PriceOutOfRange(Decimal),
    #[error("unrecognized side: {0}")]
    UnknownSide(String),
    #[error("negative fee: {0}")]
    NegativeFee(Decimal),
    #[error("unsettled trade status: {0}")]
    Unsettled(String),
    #[error("unsupported activity type: {0}")]
    UnsupportedKind(String),
    #[error("{0} overflows the decimal range")]
    Overflow(&'static str),
    #[error("undecodable record: {0}")]
    InvalidRecord(String),
}

/// A dropped record and the reason it was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedFill {
    pub ingestion_seq: u64,
    pub record_id: Option<String>,
    pub error: MalformedTradeError,
}

/// Output of one normalization run.
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    /// Trades sorted by (time, api sequence, ingestion sequence, key).
    pub trades: Vec<Trade>,
    pub rejected: Vec<RejectedFill>,
    /// Categories seen on the records, layered over configured overrides.
    pub categories: CategoryMap,
    /// Market titles seen on the records, by condition id.
    pub titles: TitleMap,
}

#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    category_overrides: HashMap<String, Category>,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_category_overrides(category_overrides: HashMap<String, Category>) -> Self {
        Self { category_overrides }
    }

    /// Normalize a single page.
    pub fn normalize(&self, raw: &[RawFill]) -> NormalizedBatch {
        self.normalize_records(raw.iter())
    }

    /// Fold pages, in fetch order, into one ordered trade sequence.
    pub fn normalize_pages(&self, pages: &[Vec<RawFill>]) -> NormalizedBatch {
        self.normalize_records(pages.iter().flatten())
    }

    fn normalize_records<'a>(&self, records: impl Iterator<Item = &'a RawFill>) -> NormalizedBatch {
        let mut batch = NormalizedBatch {
            trades: Vec::new(),
            rejected: Vec::new(),
            categories: CategoryMap::with_overrides(self.category_overrides.clone()),
            titles: TitleMap::new(),
        };

        for (ingestion_seq, record) in (0u64..).zip(records) {
            match self.normalize_fill(record, ingestion_seq) {
                Ok(trade) => {
                    if let Some(category) = record.slug.as_deref().and_then(Category::from_slug) {
                        batch.categories.insert_derived(&trade.market_id, category);
                    }
                    let title = record.title.as_deref().map(str::trim);
                    if let Some(title) = title.filter(|t| !t.is_empty()) {
                        batch
                            .titles
                            .entry(trade.market_id.condition_id().to_string())
                            .or_insert_with(|| title.to_string());
                    }
                    batch.trades.push(trade);
                }
                Err(error) => {
                    warn!(
                        "Dropping record #{} ({}): {}",
                        ingestion_seq,
                        record.record_id().unwrap_or("no id"),
                        error
                    );
                    batch.rejected.push(RejectedFill {
                        ingestion_seq,
                        record_id: record.record_id().map(str::to_string),
                        error,
                    });
                }
            }
        }

        sort_trades_deterministic(&mut batch.trades);
        debug!(
            "Normalized {} trades, {} rejected",
            batch.trades.len(),
            batch.rejected.len()
        );
        batch
    }

    /// Convert one raw record into a canonical trade.
    pub fn normalize_fill(
        &self,
        raw: &RawFill,
        ingestion_seq: u64,
    ) -> Result<Trade, MalformedTradeError> {
        if let Some(reason) = &raw.decode_error {
            return Err(MalformedTradeError::InvalidRecord(reason.clone()));
        }
        let kind = parse_kind(raw.kind.as_deref())?;

        if let Some(status) = raw.status.as_deref() {
            let status = status.trim().to_ascii_uppercase();
            if !SETTLED_STATUSES.contains(&status.as_str()) {
                return Err(MalformedTradeError::Unsettled(status));
            }
        }

        let condition = raw
            .condition()
            .ok_or(MalformedTradeError::MissingField("conditionId"))?;
        let market_id = MarketId::for_outcome(condition, raw.outcome.as_deref());

        let time_ms = parse_timestamp(
            raw.raw_timestamp()
                .ok_or(MalformedTradeError::MissingField("timestamp"))?,
        )?;

        let size = required_decimal(raw.size.as_ref(), "size")?;
        if !size.is_positive() {
            return Err(MalformedTradeError::NonPositiveSize(size));
        }

        let (side, price) = match kind {
            TradeKind::Fill => {
                let raw_side = raw
                    .side
                    .as_deref()
                    .ok_or(MalformedTradeError::MissingField("side"))?;
                let side = Side::parse(raw_side)
                    .ok_or_else(|| MalformedTradeError::UnknownSide(raw_side.to_string()))?;
                (side, required_decimal(raw.price.as_ref(), "price")?)
            }
            // A claim is a sale of the redeemed shares at payout / shares.
            TradeKind::Redeem => {
                let price = match raw.usdc_size.as_ref() {
                    Some(payout) => {
                        let payout = required_decimal(Some(payout), "usdcSize")?;
                        payout
                            .checked_div(size)
                            .ok_or(MalformedTradeError::Overflow("usdcSize"))?
                    }
                    None => required_decimal(raw.price.as_ref(), "price")?,
                };
                (Side::Sell, price)
            }
        };
        if !price.is_unit_interval() {
            return Err(MalformedTradeError::PriceOutOfRange(price));
        }

        let fee = match (raw.fee.as_ref(), raw.fee_rate_bps.as_ref()) {
            (Some(fee), _) => required_decimal(Some(fee), "fee")?,
            (None, Some(bps)) => {
                let bps = required_decimal(Some(bps), "fee_rate_bps")?;
                price
                    .checked_mul(size)
                    .and_then(|notional| notional.checked_mul(bps))
                    .and_then(|scaled| scaled.checked_div(Decimal::from_i64(BPS)))
                    .ok_or(MalformedTradeError::Overflow("fee_rate_bps"))?
            }
            (None, None) => Decimal::zero(),
        };
        if fee.is_negative() {
            return Err(MalformedTradeError::NegativeFee(fee));
        }
        // The trade's cash flow must be representable.
        if price
            .checked_mul(size)
            .and_then(|notional| notional.checked_add(fee))
            .is_none()
        {
            return Err(MalformedTradeError::Overflow("fee"));
        }

        let api_sequence = raw.sequence.as_ref().and_then(RawNumber::to_i64);
        let trade_key = Trade::compute_trade_key(
            raw.record_id(),
            &market_id,
            time_ms,
            side,
            &price,
            &size,
            &fee,
            ingestion_seq,
        );

        Ok(Trade {
            trade_key,
            market_id,
            time_ms,
            api_sequence,
            ingestion_seq,
            side,
            size,
            price,
            fee,
            kind,
        })
    }
}

fn parse_kind(raw: Option<&str>) -> Result<TradeKind, MalformedTradeError> {
    match raw.map(|k| k.trim().to_ascii_uppercase()) {
        None => Ok(TradeKind::Fill),
        Some(k) if k.is_empty() || k == "TRADE" => Ok(TradeKind::Fill),
        Some(k) if k == "REDEEM" => Ok(TradeKind::Redeem),
        Some(other) => Err(MalformedTradeError::UnsupportedKind(other)),
    }
}

fn required_decimal(
    value: Option<&RawNumber>,
    field: &'static str,
) -> Result<Decimal, MalformedTradeError> {
    let value = value.ok_or(MalformedTradeError::MissingField(field))?;
    value
        .to_decimal()
        .ok_or_else(|| MalformedTradeError::InvalidNumber {
            field,
            value: value.raw_text(),
        })
}

fn parse_timestamp(raw: &RawNumber) -> Result<TimeMs, MalformedTradeError> {
    let invalid = || MalformedTradeError::InvalidTimestamp(raw.raw_text());
    let value = raw
        .to_i64()
        .or_else(|| {
            raw.to_decimal()
                .and_then(|d| d.inner().trunc().to_string().parse::<i64>().ok())
        })
        .ok_or_else(invalid)?;
    if value <= 0 {
        return Err(invalid());
    }
    if value < SECONDS_THRESHOLD {
        value.checked_mul(1000).map(TimeMs::new).ok_or_else(invalid)
    } else {
        Ok(TimeMs::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn raw(value: serde_json::Value) -> RawFill {
        serde_json::from_value(value).unwrap()
    }

    fn activity(hash: &str, side: &str, size: &str, price: &str, ts: i64) -> RawFill {
        raw(json!({
            "type": "TRADE",
            "conditionId": "0xabc",
            "outcome": "Yes",
            "side": side,
            "size": size,
            "price": price,
            "timestamp": ts,
            "transactionHash": hash,
            "slug": "nba-finals-game-1"
        }))
    }

    #[test]
    fn test_activity_trade_normalizes() {
        let trade = Normalizer::new()
            .normalize_fill(&activity("0x1", "BUY", "10", "0.4", 1_700_000_000), 0)
            .unwrap();

        assert_eq!(trade.market_id, MarketId::new("0xabc:Yes"));
        assert_eq!(trade.time_ms, TimeMs::new(1_700_000_000_000));
        assert_eq!(trade.side, Side::Buy);
        assert_eq!(trade.size, d("10"));
        assert_eq!(trade.price, d("0.4"));
        assert_eq!(trade.fee, Decimal::zero());
        assert_eq!(trade.kind, TradeKind::Fill);
        assert_eq!(trade.trade_key, "id:0x1:0xabc:Yes:0");
    }

    #[test]
    fn test_millisecond_timestamps_are_kept() {
        let trade = Normalizer::new()
            .normalize_fill(&activity("0x1", "BUY", "1", "0.4", 1_700_000_000_123), 0)
            .unwrap();
        assert_eq!(trade.time_ms, TimeMs::new(1_700_000_000_123));
    }

    #[test]
    fn test_fee_from_rate_bps() {
        let record = raw(json!({
            "market": "0xabc",
            "outcome": "No",
            "side": "sell",
            "size": "100",
            "price": "0.5",
            "fee_rate_bps": "20",
            "status": "MATCHED",
            "match_time": "1700000000"
        }));
        let trade = Normalizer::new().normalize_fill(&record, 3).unwrap();
        assert_eq!(trade.side, Side::Sell);
        assert_eq!(trade.fee, d("0.1"));
        assert!(trade.trade_key.starts_with("hash:"));
    }

    #[test]
    fn test_redeem_becomes_sell_at_payout_price() {
        let record = raw(json!({
            "type": "REDEEM",
            "conditionId": "0xabc",
            "size": 20,
            "usdcSize": 10,
            "timestamp": 1_700_000_100,
            "transactionHash": "0xr"
        }));
        let trade = Normalizer::new().normalize_fill(&record, 0).unwrap();
        assert_eq!(trade.kind, TradeKind::Redeem);
        assert_eq!(trade.side, Side::Sell);
        assert_eq!(trade.price, d("0.5"));
        assert_eq!(trade.market_id, MarketId::new("0xabc"));
    }

    #[test]
    fn test_rejections() {
        let n = Normalizer::new();
        let cases = vec![
            (
                activity("0x1", "BUY", "0", "0.4", 1_700_000_000),
                MalformedTradeError::NonPositiveSize(Decimal::zero()),
            ),
            (
                activity("0x1", "BUY", "-2", "0.4", 1_700_000_000),
                MalformedTradeError::NonPositiveSize(d("-2")),
            ),
            (
                activity("0x1", "BUY", "1", "1.2", 1_700_000_000),
                MalformedTradeError::PriceOutOfRange(d("1.2")),
            ),
            (
                activity("0x1", "HOLD", "1", "0.2", 1_700_000_000),
                MalformedTradeError::UnknownSide("HOLD".to_string()),
            ),
            (
                activity("0x1", "BUY", "abc", "0.2", 1_700_000_000),
                MalformedTradeError::InvalidNumber {
                    field: "size",
                    value: "abc".to_string(),
                },
            ),
            (
                activity("0x1", "BUY", "1", "0.2", -5),
                MalformedTradeError::InvalidTimestamp("-5".to_string()),
            ),
        ];
        for (record, expected) in cases {
            assert_eq!(n.normalize_fill(&record, 0), Err(expected));
        }
    }

    #[test]
    fn test_unsettled_and_unsupported_records_rejected() {
        let n = Normalizer::new();
        let failed = raw(json!({
            "market": "0xabc", "side": "BUY", "size": "1", "price": "0.5",
            "status": "FAILED", "match_time": "1700000000"
        }));
        assert_eq!(
            n.normalize_fill(&failed, 0),
            Err(MalformedTradeError::Unsettled("FAILED".to_string()))
        );

        let split = raw(json!({
            "type": "SPLIT", "conditionId": "0xabc", "size": 1, "timestamp": 1700000000
        }));
        assert_eq!(
            n.normalize_fill(&split, 0),
            Err(MalformedTradeError::UnsupportedKind("SPLIT".to_string()))
        );

        let no_market = raw(json!({"side": "BUY", "size": 1, "price": 0.5, "timestamp": 1}));
        assert_eq!(
            n.normalize_fill(&no_market, 0),
            Err(MalformedTradeError::MissingField("conditionId"))
        );
    }

    #[test]
    fn test_batch_drops_bad_records_and_sorts() {
        let page = vec![
            activity("0x3", "SELL", "5", "0.6", 1_700_000_300),
            activity("0x2", "BUY", "0", "0.4", 1_700_000_200),
            activity("0x1", "BUY", "10", "0.4", 1_700_000_100),
        ];
        let batch = Normalizer::new().normalize(&page);

        assert_eq!(batch.trades.len(), 2);
        assert_eq!(batch.rejected.len(), 1);
        assert_eq!(batch.rejected[0].ingestion_seq, 1);
        assert_eq!(batch.rejected[0].record_id.as_deref(), Some("0x2"));
        assert_eq!(batch.trades[0].side, Side::Buy);
        assert_eq!(batch.trades[1].side, Side::Sell);
        assert_eq!(
            batch.categories.get(&MarketId::new("0xabc:Yes")),
            Category::new("nba")
        );
    }

    #[test]
    fn test_pages_fold_with_global_ingestion_sequence() {
        let pages = vec![
            vec![
                activity("0x1", "BUY", "1", "0.4", 1_700_000_000),
                activity("0x2", "BUY", "1", "0.5", 1_700_000_000),
            ],
            vec![activity("0x3", "SELL", "1", "0.6", 1_700_000_000)],
        ];
        let batch = Normalizer::new().normalize_pages(&pages);

        let seqs: Vec<u64> = batch.trades.iter().map(|t| t.ingestion_seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        assert_eq!(batch.trades[2].side, Side::Sell);
    }

    #[test]
    fn test_category_overrides_applied() {
        let mut overrides = HashMap::new();
        overrides.insert("0xabc".to_string(), Category::new("sports"));
        let batch = Normalizer::with_category_overrides(overrides)
            .normalize(&[activity("0x1", "BUY", "1", "0.4", 1_700_000_000)]);
        assert_eq!(
            batch.categories.get(&MarketId::new("0xabc:Yes")),
            Category::new("sports")
        );
    }

    #[test]
    fn test_overflowing_record_rejected() {
        let huge = raw(json!({
            "conditionId": "0xabc", "outcome": "Yes", "side": "BUY",
            "size": "79228162514264337593543950335", "price": "1",
            "fee_rate_bps": "20", "timestamp": 1_700_000_000
        }));
        let batch = Normalizer::new().normalize(&[huge]);
        assert!(batch.trades.is_empty());
        assert_eq!(
            batch.rejected[0].error,
            MalformedTradeError::Overflow("fee_rate_bps")
        );

        let huge_fee = raw(json!({
            "conditionId": "0xabc", "outcome": "Yes", "side": "SELL",
            "size": "79228162514264337593543950335", "price": "1",
            "fee": "1", "timestamp": 1_700_000_000
        }));
        assert_eq!(
            Normalizer::new().normalize_fill(&huge_fee, 0),
            Err(MalformedTradeError::Overflow("fee"))
        );
    }

    #[test]
    fn test_undecodable_record_is_rejected_with_id() {
        let value = json!({"transactionHash": "0xbad", "side": 5});
        let record = RawFill::undecodable(&value, "invalid type".to_string());
        let batch = Normalizer::new().normalize(&[
            record,
            activity("0x1", "BUY", "1", "0.4", 1_700_000_000),
        ]);

        assert_eq!(batch.trades.len(), 1);
        assert_eq!(batch.rejected.len(), 1);
        assert_eq!(batch.rejected[0].record_id.as_deref(), Some("0xbad"));
        assert_eq!(
            batch.rejected[0].error,
            MalformedTradeError::InvalidRecord("invalid type".to_string())
        );
    }

    #[test]
    fn test_titles_collected_by_condition() {
        let mut first = activity("0x1", "BUY", "1", "0.4", 1_700_000_000);
        first.title = Some(" NBA Finals: Game 1 ".to_string());
        let mut second = activity("0x2", "BUY", "1", "0.4", 1_700_000_100);
        second.title = Some("Renamed".to_string());

        let batch = Normalizer::new().normalize(&[first, second]);
        assert_eq!(batch.titles.len(), 1);
        assert_eq!(batch.titles["0xabc"], "NBA Finals: Game 1");
    }
}

//! Stable trade ordering for deterministic replay.

use crate::domain::Trade;

/// Stable ordering key for trades.
///
/// Ordering: time_ms -> api_sequence -> ingestion_seq -> trade_key.
/// Same-timestamp trades without an API sequence keep the order in which they
/// were fetched.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TradeOrderingKey {
    pub time_ms: i64,
    pub api_sequence: Option<i64>,
    pub ingestion_seq: u64,
    pub trade_key: String,
}

impl TradeOrderingKey {
    pub fn from_trade(trade: &Trade) -> Self {
        TradeOrderingKey {
            time_ms: trade.time_ms.as_ms(),
            api_sequence: trade.api_sequence,
            ingestion_seq: trade.ingestion_seq,
            trade_key: trade.trade_key.clone(),
        }
    }

    /// Returns true if `a` should be replayed before `b`.
    pub fn should_come_before(a: &Trade, b: &Trade) -> bool {
        Self::from_trade(a) < Self::from_trade(b)
    }
}

/// Sort trades into replay order.
pub fn sort_trades_deterministic(trades: &mut [Trade]) {
    trades.sort_by_cached_key(TradeOrderingKey::from_trade);
}

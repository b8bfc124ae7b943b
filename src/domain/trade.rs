//! Canonical trade representation produced by the normalizer.

use crate::domain::{Decimal, MarketId, Side, TimeMs};
use serde::{Deserialize, Serialize};

/// How a trade came about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TradeKind {
    /// An executed fill on the order book.
    #[default]
    Fill,
    /// A settlement claim, booked as a sale at the payout price.
    Redeem,
}

/// A single normalized trade. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// Stable unique identifier for this trade.
    pub trade_key: String,
    pub market_id: MarketId,
    pub time_ms: TimeMs,
    /// Sequence number supplied by the API, if any.
    pub api_sequence: Option<i64>,
    /// Position of the record in the fetched stream (pages in fetch order).
    pub ingestion_seq: u64,
    pub side: Side,
    /// Quantity, always > 0.
    pub size: Decimal,
    /// Unit price in `[0, 1]`.
    pub price: Decimal,
    pub fee: Decimal,
    pub kind: TradeKind,
}

impl Trade {
    /// Signed quantity: Buy = +size, Sell = -size.
    pub fn signed_size(&self) -> Decimal {
        match self.side {
            Side::Buy => self.size,
            Side::Sell => -self.size,
        }
    }

    /// Gross value of the trade, `price * size`.
    pub fn notional(&self) -> Decimal {
        self.price * self.size
    }

    /// Net cash flow of the trade: a sale receives `notional - fee`, a
    /// purchase spends `notional + fee`.
    pub fn cash_flow(&self) -> Decimal {
        match self.side {
            Side::Sell => self.notional() - self.fee,
            Side::Buy => -(self.notional() + self.fee),
        }
    }

    /// [`cash_flow`](Self::cash_flow), or `None` when it leaves the decimal
    /// range.
    pub fn checked_cash_flow(&self) -> Option<Decimal> {
        let notional = self.price.checked_mul(self.size)?;
        match self.side {
            Side::Sell => notional.checked_sub(self.fee),
            Side::Buy => notional.checked_add(self.fee).map(|spent| -spent),
        }
    }

    /// Generate a stable key for a record.
    ///
    /// Priority: API identifier (qualified by market and stream position, since
    /// one transaction can carry several fills) > hash of deterministic fields.
    #[allow(clippy::too_many_arguments)]
    pub fn compute_trade_key(
        api_id: Option<&str>,
        market_id: &MarketId,
        time_ms: TimeMs,
        side: Side,
        price: &Decimal,
        size: &Decimal,
        fee: &Decimal,
        ingestion_seq: u64,
    ) -> String {
        if let Some(id) = api_id.map(str::trim).filter(|id| !id.is_empty()) {
            return format!("id:{}:{}:{}", id, market_id, ingestion_seq);
        }

        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(market_id.as_str());
        hasher.update(time_ms.as_ms().to_le_bytes());
        hasher.update(if side == Side::Buy { b"B" } else { b"S" });
        hasher.update(price.to_canonical_string());
        hasher.update(size.to_canonical_string());
        hasher.update(fee.to_canonical_string());
        hasher.update(ingestion_seq.to_le_bytes());
        let hash = hasher.finalize();
        format!("hash:{}", hex::encode(&hash[..16]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn trade(side: Side, size: &str, price: &str, fee: &str) -> Trade {
        Trade {
            trade_key: "t".to_string(),
            market_id: MarketId::new("m"),
            time_ms: TimeMs::new(1000),
            api_sequence: None,
            ingestion_seq: 0,
            side,
            size: d(size),
            price: d(price),
            fee: d(fee),
            kind: TradeKind::Fill,
        }
    }

    #[test]
    fn test_signed_size_and_cash_flow() {
        let buy = trade(Side::Buy, "10", "0.4", "0.1");
        assert_eq!(buy.signed_size(), d("10"));
        assert_eq!(buy.cash_flow(), d("-4.1"));

        let sell = trade(Side::Sell, "5", "0.6", "0.05");
        assert_eq!(sell.signed_size(), d("-5"));
        assert_eq!(sell.cash_flow(), d("2.95"));
        assert_eq!(sell.checked_cash_flow(), Some(d("2.95")));

        let mut huge = trade(Side::Buy, "79228162514264337593543950335", "1", "1");
        assert_eq!(huge.checked_cash_flow(), None);
        huge.fee = Decimal::zero();
        assert!(huge.checked_cash_flow().is_some());
    }

    #[test]
    fn test_trade_key_prefers_api_id() {
        let market = MarketId::new("0xabc:Yes");
        let key = Trade::compute_trade_key(
            Some("0xdeadbeef"),
            &market,
            TimeMs::new(1000),
            Side::Buy,
            &d("0.4"),
            &d("10"),
            &d("0"),
            7,
        );
        assert_eq!(key, "id:0xdeadbeef:0xabc:Yes:7");
    }

    #[test]
    fn test_trade_key_hash_is_deterministic() {
        let market = MarketId::new("0xabc:Yes");
        let make = |px: &str| {
            Trade::compute_trade_key(
                None,
                &market,
                TimeMs::new(1000),
                Side::Sell,
                &d(px),
                &d("10"),
                &d("0"),
                3,
            )
        };
        let a = make("0.4");
        assert!(a.starts_with("hash:"));
        assert_eq!(a.len(), 5 + 32);
        assert_eq!(a, make("0.4"));
        assert_ne!(a, make("0.41"));
    }
}

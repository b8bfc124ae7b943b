//! Externally sourced mark prices.

use crate::domain::{Decimal, MarketId, TimeMs};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Current price of one market outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkPrice {
    pub market_id: MarketId,
    pub price: Decimal,
    pub as_of: TimeMs,
}

impl MarkPrice {
    pub fn new(market_id: MarketId, price: Decimal, as_of: TimeMs) -> Self {
        Self {
            market_id,
            price,
            as_of,
        }
    }
}

pub type MarkMap = HashMap<MarketId, MarkPrice>;

/// Index marks by market. A later entry for the same market replaces an
/// earlier one only if it is at least as recent.
pub fn index_marks(marks: impl IntoIterator<Item = MarkPrice>) -> MarkMap {
    let mut map = MarkMap::new();
    for mark in marks {
        match map.get(&mark.market_id) {
            Some(existing) if existing.as_of > mark.as_of => {}
            _ => {
                map.insert(mark.market_id.clone(), mark);
            }
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_marks_keeps_latest() {
        let m = MarketId::new("0xa:Yes");
        let marks = vec![
            MarkPrice::new(m.clone(), Decimal::from_str_canonical("0.5").unwrap(), TimeMs::new(2000)),
            MarkPrice::new(m.clone(), Decimal::from_str_canonical("0.4").unwrap(), TimeMs::new(1000)),
        ];
        let map = index_marks(marks);
        assert_eq!(map.len(), 1);
        assert_eq!(map[&m].price, Decimal::from_str_canonical("0.5").unwrap());
    }
}

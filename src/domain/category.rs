//! Market-to-category classification.

use crate::domain::{Category, MarketId};
use std::collections::HashMap;

/// Market titles keyed by condition id.
pub type TitleMap = HashMap<String, String>;

/// Category lookup for markets.
///
/// Resolution order: configured override for the full market id, configured
/// override for its condition id, API-derived category for the market id, then
/// for the condition id, and finally `Uncategorized`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryMap {
    overrides: HashMap<String, Category>,
    derived: HashMap<String, Category>,
}

impl CategoryMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a map that starts out with static overrides, keyed by market id or
    /// condition id.
    pub fn with_overrides(overrides: HashMap<String, Category>) -> Self {
        Self {
            overrides,
            derived: HashMap::new(),
        }
    }

    /// Record an API-derived category. The first category seen for a key wins.
    pub fn insert_derived(&mut self, market_id: &MarketId, category: Category) {
        self.derived
            .entry(market_id.as_str().to_string())
            .or_insert_with(|| category.clone());
        self.derived
            .entry(market_id.condition_id().to_string())
            .or_insert(category);
    }

    pub fn get(&self, market_id: &MarketId) -> Category {
        let full = market_id.as_str();
        let condition = market_id.condition_id();
        self.overrides
            .get(full)
            .or_else(|| self.overrides.get(condition))
            .or_else(|| self.derived.get(full))
            .or_else(|| self.derived.get(condition))
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty() && self.derived.is_empty()
    }
}

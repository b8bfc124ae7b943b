//! One pass of the reconciliation pipeline:
//! raw pages -> normalize -> accumulate -> value -> aggregate.

use crate::config::{Config, PnlMode};
use crate::domain::{index_marks, MarkPrice, MarketId, TimeMs, Trade};
use crate::engine::{
    daily_cash_flow, AccountSummary, Aggregator, ComputationError, DailyCashFlow,
    MissingPriceError, PositionAccumulator, ValuationEngine, ValuedPositionMap,
};
use crate::normalize::{NormalizedBatch, Normalizer, RawFill, RejectedFill};
use std::collections::BTreeSet;
use tracing::debug;

/// Immutable result of one refresh cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub generation: u64,
    pub computed_at: TimeMs,
    pub pnl_mode: PnlMode,
    pub summary: AccountSummary,
    pub positions: ValuedPositionMap,
    pub daily: DailyCashFlow,
    pub trade_count: usize,
    pub rejected: Vec<RejectedFill>,
    pub missing_prices: Vec<MissingPriceError>,
    /// The fill history hit the page limit; older or newer fills may be missing.
    pub history_truncated: bool,
    /// Marks could not be fetched; open positions are valued as stale.
    pub mark_fetch_error: Option<String>,
}

impl Snapshot {
    /// Some input was dropped or could not be priced.
    pub fn is_degraded(&self) -> bool {
        self.summary.is_degraded()
            || !self.rejected.is_empty()
            || self.history_truncated
            || self.mark_fetch_error.is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    normalizer: Normalizer,
    aggregator: Aggregator,
    pnl_mode: PnlMode,
}

impl Pipeline {
    pub fn new(normalizer: Normalizer, pnl_mode: PnlMode) -> Self {
        Self {
            normalizer,
            aggregator: Aggregator::new(pnl_mode),
            pnl_mode,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Normalizer::with_category_overrides(config.category_overrides.clone()),
            config.pnl_mode,
        )
    }

    pub fn normalize(&self, pages: &[Vec<RawFill>]) -> NormalizedBatch {
        self.normalizer.normalize_pages(pages)
    }

    /// Build a snapshot from a normalized batch and the current marks.
    ///
    /// # Errors
    /// A [`ComputationError`] from the accumulator or the rollups fails the
    /// whole cycle; a missing mark only degrades its own market.
    pub fn compute(
        &self,
        batch: NormalizedBatch,
        marks: Vec<MarkPrice>,
        generation: u64,
        computed_at: TimeMs,
    ) -> Result<Snapshot, ComputationError> {
        let positions =
            PositionAccumulator::accumulate(&batch.trades, &batch.categories, &batch.titles)?;
        let valuation = ValuationEngine::value(&positions, &index_marks(marks));
        let summary = self.aggregator.summarize(&valuation.positions)?;
        let daily = daily_cash_flow(&batch.trades)?;

        debug!(
            "Computed generation {}: {} trades, {} positions, {} open",
            generation,
            batch.trades.len(),
            valuation.positions.len(),
            summary.open_positions
        );

        Ok(Snapshot {
            generation,
            computed_at,
            pnl_mode: self.pnl_mode,
            summary,
            positions: valuation.positions,
            daily,
            trade_count: batch.trades.len(),
            rejected: batch.rejected,
            missing_prices: valuation.missing_prices,
            history_truncated: false,
            mark_fetch_error: None,
        })
    }

    /// Normalize and compute in one step.
    pub fn run(
        &self,
        pages: &[Vec<RawFill>],
        marks: Vec<MarkPrice>,
        generation: u64,
        computed_at: TimeMs,
    ) -> Result<Snapshot, ComputationError> {
        self.compute(self.normalize(pages), marks, generation, computed_at)
    }
}

/// Outcome markets referenced by the trades, the ones that can carry a mark.
pub fn priced_markets(trades: &[Trade]) -> Vec<MarketId> {
    trades
        .iter()
        .filter(|t| t.market_id.outcome().is_some())
        .map(|t| t.market_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Decimal;
    use serde_json::json;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn raw(value: serde_json::Value) -> RawFill {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_priced_markets_are_distinct_outcome_markets() {
        let batch = Normalizer::new().normalize(&[
            raw(json!({"conditionId": "c1", "outcome": "Yes", "side": "BUY", "size": 1, "price": 0.5, "timestamp": 1})),
            raw(json!({"conditionId": "c1", "outcome": "Yes", "side": "BUY", "size": 1, "price": 0.5, "timestamp": 2})),
            raw(json!({"type": "REDEEM", "conditionId": "c2", "size": 1, "usdcSize": 1, "timestamp": 3})),
        ]);
        assert_eq!(priced_markets(&batch.trades), vec![MarketId::new("c1:Yes")]);
    }

    #[test]
    fn test_run_builds_snapshot() {
        let pages = vec![vec![
            raw(json!({"conditionId": "c1", "outcome": "Yes", "side": "BUY", "size": 10, "price": 0.4, "timestamp": 1_700_000_000, "slug": "politics-x"})),
            raw(json!({"conditionId": "c1", "outcome": "Yes", "side": "BUY", "size": 0, "price": 0.4, "timestamp": 1_700_000_001})),
        ]];
        let marks = vec![MarkPrice::new(MarketId::new("c1:Yes"), d("0.5"), TimeMs::new(1))];

        let snapshot = Pipeline::default()
            .run(&pages, marks, 7, TimeMs::new(42))
            .unwrap();

        assert_eq!(snapshot.generation, 7);
        assert_eq!(snapshot.trade_count, 1);
        assert_eq!(snapshot.rejected.len(), 1);
        assert!(snapshot.is_degraded());
        assert_eq!(snapshot.summary.total_market_value, d("5"));
        assert_eq!(snapshot.summary.total_unrealized_pnl, d("1"));
        assert_eq!(snapshot.daily.total, d("-4"));
    }
}

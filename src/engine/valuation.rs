use crate::domain::{Decimal, MarkMap, MarketId, TimeMs};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;

use super::{PositionMap, PositionState};

pub type ValuedPositionMap = BTreeMap<MarketId, ValuedPosition>;

/// A market whose open position could not be marked.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MissingPriceError {
    #[error("no mark price for {0}")]
    NoMark(MarketId),
    #[error("mark price {price} for {market_id} outside [0, 1]")]
    InvalidMark { market_id: MarketId, price: Decimal },
}

impl MissingPriceError {
    pub fn market_id(&self) -> &MarketId {
        match self {
            MissingPriceError::NoMark(id) => id,
            MissingPriceError::InvalidMark { market_id, .. } => market_id,
        }
    }
}

/// A position marked to its current price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValuedPosition {
    pub position: PositionState,
    pub mark: Option<Decimal>,
    pub mark_as_of: Option<TimeMs>,
    /// `signed_size * (mark - average_cost)`; zero when flat or stale.
    pub unrealized_pnl: Decimal,
    /// `signed_size * mark`; zero when flat or stale.
    pub market_value: Decimal,
    /// Open position without a usable mark.
    pub stale: bool,
}

impl ValuedPosition {
    pub fn is_open(&self) -> bool {
        !self.position.is_flat()
    }

    /// Payout of a long position if its outcome resolves at 1.00.
    pub fn to_win(&self) -> Decimal {
        if self.position.is_long() {
            self.position.signed_size
        } else {
            Decimal::zero()
        }
    }

    /// Open, marked, and worth no more than `threshold`.
    pub fn is_dust(&self, threshold: Decimal) -> bool {
        self.is_open() && !self.stale && self.market_value.abs() <= threshold
    }
}

/// Result of valuing a position map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Valuation {
    pub positions: ValuedPositionMap,
    pub missing_prices: Vec<MissingPriceError>,
}

pub struct ValuationEngine;

impl ValuationEngine {
    /// Mark every position. A missing or unusable mark degrades that market to
    /// stale; it never fails the valuation of the others.
    pub fn value(positions: &PositionMap, marks: &MarkMap) -> Valuation {
        let mut valuation = Valuation::default();

        for (market_id, position) in positions {
            if position.is_flat() {
                valuation.positions.insert(
                    market_id.clone(),
                    ValuedPosition {
                        position: position.clone(),
                        mark: marks.get(market_id).map(|m| m.price),
                        mark_as_of: marks.get(market_id).map(|m| m.as_of),
                        unrealized_pnl: Decimal::zero(),
                        market_value: Decimal::zero(),
                        stale: false,
                    },
                );
                continue;
            }

            let valued = match marks.get(market_id) {
                Some(mark) if mark.price.is_unit_interval() => {
                    let market_value = position.signed_size * mark.price;
                    // Equal to signed_size * (mark - average_cost), without the
                    // division behind average_cost.
                    let unrealized_pnl =
                        market_value - position.signed_size.signum() * position.cost_basis;
                    ValuedPosition {
                        position: position.clone(),
                        mark: Some(mark.price),
                        mark_as_of: Some(mark.as_of),
                        unrealized_pnl,
                        market_value,
                        stale: false,
                    }
                }
                other => {
                    let error = match other {
                        Some(mark) => MissingPriceError::InvalidMark {
                            market_id: market_id.clone(),
                            price: mark.price,
                        },
                        None => MissingPriceError::NoMark(market_id.clone()),
                    };
                    warn!("Valuing {} as stale: {}", market_id, error);
                    valuation.missing_prices.push(error);
                    ValuedPosition {
                        position: position.clone(),
                        mark: None,
                        mark_as_of: None,
                        unrealized_pnl: Decimal::zero(),
                        market_value: Decimal::zero(),
                        stale: true,
                    }
                }
            };
            valuation.positions.insert(market_id.clone(), valued);
        }

        valuation
    }
}

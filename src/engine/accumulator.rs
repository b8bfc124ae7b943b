use crate::domain::{
    Category, CategoryMap, Decimal, MarketId, TimeMs, TitleMap, Trade, TradeKind,
};
use serde::Serialize;
use std::collections::BTreeMap;

use super::ComputationError;

/// Per-market position state, keyed by market id.
pub type PositionMap = BTreeMap<MarketId, PositionState>;

/// Running position in one market outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionState {
    pub market_id: MarketId,
    pub category: Category,
    /// Human-readable market question, when the feed carried one.
    pub title: Option<String>,

    /// Positive = long, negative = short, zero = flat.
    pub signed_size: Decimal,

    /// Total cost of the open units; zero when flat.
    pub cost_basis: Decimal,

    /// Trading P&L locked in by closing volume. Fees are tracked separately.
    pub realized_pnl: Decimal,

    pub fees_paid: Decimal,
    /// Sum of price * size over BUY volume.
    pub bought_volume: Decimal,
    /// Sum of price * size over SELL volume.
    pub sold_volume: Decimal,
    pub trade_count: u32,

    /// Start of the current open run (None if flat).
    pub opened_at: Option<TimeMs>,
    pub last_trade_at: Option<TimeMs>,
}

impl PositionState {
    pub fn new(market_id: MarketId, category: Category) -> Self {
        Self {
            market_id,
            category,
            title: None,
            signed_size: Decimal::zero(),
            cost_basis: Decimal::zero(),
            realized_pnl: Decimal::zero(),
            fees_paid: Decimal::zero(),
            bought_volume: Decimal::zero(),
            sold_volume: Decimal::zero(),
            trade_count: 0,
            opened_at: None,
            last_trade_at: None,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.signed_size.is_zero()
    }

    pub fn is_long(&self) -> bool {
        self.signed_size.is_positive()
    }

    pub fn is_short(&self) -> bool {
        self.signed_size.is_negative()
    }

    /// Cost basis per unit of open size; undefined when flat.
    pub fn average_cost(&self) -> Option<Decimal> {
        if self.is_flat() {
            None
        } else {
            self.cost_basis.checked_div(self.signed_size.abs())
        }
    }

    /// Realized P&L after fees.
    pub fn net_realized_pnl(&self) -> Decimal {
        self.realized_pnl - self.fees_paid
    }

    fn check_order(&self, trade: &Trade) -> Result<(), ComputationError> {
        match self.last_trade_at {
            Some(last) if trade.time_ms < last => Err(ComputationError::OutOfOrder {
                market_id: self.market_id.clone(),
                trade_key: trade.trade_key.clone(),
                time_ms: trade.time_ms,
                last_ms: last,
            }),
            _ => Ok(()),
        }
    }

    fn record_activity(
        &mut self,
        ops: &Checked<'_>,
        trade: &Trade,
        fee: Decimal,
        notional: Decimal,
    ) -> Result<(), ComputationError> {
        self.fees_paid = ops.add(self.fees_paid, fee)?;
        if trade.signed_size().is_positive() {
            self.bought_volume = ops.add(self.bought_volume, notional)?;
        } else {
            self.sold_volume = ops.add(self.sold_volume, notional)?;
        }
        self.trade_count += 1;
        self.last_trade_at = Some(trade.time_ms);
        Ok(())
    }

    /// Fold one trade into the position.
    fn process_trade(&mut self, trade: &Trade) -> Result<(), ComputationError> {
        let ops = Checked::for_trade(trade);
        self.record_activity(&ops, trade, trade.fee, ops.mul(trade.price, trade.size)?)?;

        let old_size = self.signed_size;
        let direction = trade.signed_size().signum();

        if old_size.is_zero() || old_size.signum() == direction {
            return self.handle_open(&ops, trade.size, trade.price, direction, trade.time_ms);
        }

        let closing = trade.size.min(old_size.abs());
        self.handle_close(&ops, closing, trade.price)?;

        let remainder = trade.size - closing;
        if remainder.is_positive() {
            // Flip: the remainder opens a fresh position at the trade price.
            self.handle_open(&ops, remainder, trade.price, direction, trade.time_ms)?;
        }
        Ok(())
    }

    /// Opening or same-direction volume: blends into the cost basis.
    fn handle_open(
        &mut self,
        ops: &Checked<'_>,
        qty: Decimal,
        price: Decimal,
        direction: Decimal,
        at: TimeMs,
    ) -> Result<(), ComputationError> {
        if self.is_flat() {
            self.cost_basis = Decimal::zero();
            self.opened_at = Some(at);
        }
        self.cost_basis = ops.add(self.cost_basis, ops.mul(qty, price)?)?;
        self.signed_size = ops.add(self.signed_size, direction * qty)?;
        Ok(())
    }

    /// Closing volume: realizes P&L against the average cost, leaving the
    /// average cost of the remainder unchanged.
    fn handle_close(
        &mut self,
        ops: &Checked<'_>,
        qty: Decimal,
        price: Decimal,
    ) -> Result<(), ComputationError> {
        let open_abs = self.signed_size.abs();
        let position_sign = self.signed_size.signum();

        let released_cost = if qty == open_abs {
            self.cost_basis
        } else {
            ops.pro_rata(self.cost_basis, qty, open_abs)?
        };
        let trading_pnl = ops.sub(ops.mul(qty, price)?, released_cost)?;
        self.realized_pnl = ops.add(self.realized_pnl, position_sign * trading_pnl)?;
        self.cost_basis -= released_cost;
        self.signed_size -= position_sign * qty;

        if self.is_flat() {
            self.cost_basis = Decimal::zero();
            self.opened_at = None;
        }
        Ok(())
    }

    /// Settle the whole open position at a payout allocated by the caller.
    fn settle(
        &mut self,
        ops: &Checked<'_>,
        trade: &Trade,
        payout: Decimal,
        fee: Decimal,
    ) -> Result<(), ComputationError> {
        self.record_activity(ops, trade, fee, payout)?;
        self.realized_pnl = ops.add(self.realized_pnl, ops.sub(payout, self.cost_basis)?)?;
        self.cost_basis = Decimal::zero();
        self.signed_size = Decimal::zero();
        self.opened_at = None;
        Ok(())
    }
}

/// Overflow-checked arithmetic, reported against the trade being applied.
struct Checked<'a> {
    trade_key: &'a str,
}

impl<'a> Checked<'a> {
    fn for_trade(trade: &'a Trade) -> Self {
        Self {
            trade_key: &trade.trade_key,
        }
    }

    fn overflow(&self) -> ComputationError {
        ComputationError::overflow(format!("trade {}", self.trade_key))
    }

    fn add(&self, a: Decimal, b: Decimal) -> Result<Decimal, ComputationError> {
        a.checked_add(b).ok_or_else(|| self.overflow())
    }

    fn sub(&self, a: Decimal, b: Decimal) -> Result<Decimal, ComputationError> {
        a.checked_sub(b).ok_or_else(|| self.overflow())
    }

    fn mul(&self, a: Decimal, b: Decimal) -> Result<Decimal, ComputationError> {
        a.checked_mul(b).ok_or_else(|| self.overflow())
    }

    /// `amount * part / whole`, dividing first when the product does not fit.
    fn pro_rata(
        &self,
        amount: Decimal,
        part: Decimal,
        whole: Decimal,
    ) -> Result<Decimal, ComputationError> {
        match amount.checked_mul(part) {
            Some(scaled) => scaled.checked_div(whole),
            None => part
                .checked_div(whole)
                .and_then(|ratio| amount.checked_mul(ratio)),
        }
        .ok_or_else(|| self.overflow())
    }
}

/// Folds an ordered trade sequence into per-market position state.
///
/// The fold is resumable: calling [`apply`](Self::apply) with consecutive
/// chunks of a sequence gives the same result as one call with the whole
/// sequence.
#[derive(Debug, Clone, Default)]
pub struct PositionAccumulator {
    categories: CategoryMap,
    titles: TitleMap,
    states: PositionMap,
}

impl PositionAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_categories(categories: CategoryMap) -> Self {
        Self {
            categories,
            titles: TitleMap::new(),
            states: PositionMap::new(),
        }
    }

    /// Attach market titles, keyed by condition id, to the positions created
    /// from here on.
    pub fn with_titles(mut self, titles: TitleMap) -> Self {
        self.titles = titles;
        self
    }

    /// Replay a full sequence from scratch.
    pub fn accumulate(
        trades: &[Trade],
        categories: &CategoryMap,
        titles: &TitleMap,
    ) -> Result<PositionMap, ComputationError> {
        let mut accumulator =
            Self::with_categories(categories.clone()).with_titles(titles.clone());
        accumulator.apply(trades)?;
        Ok(accumulator.into_states())
    }

    /// Apply the next chunk of the ordered sequence.
    pub fn apply(&mut self, trades: &[Trade]) -> Result<(), ComputationError> {
        for trade in trades {
            self.apply_trade(trade)?;
        }
        Ok(())
    }

    /// Apply a single trade.
    ///
    /// # Errors
    /// Returns a [`ComputationError`] if the trade violates an input invariant
    /// (non-positive size, price outside `[0, 1]`, negative fee), is older
    /// than the last trade already applied to its market, or pushes a running
    /// figure past the decimal range.
    pub fn apply_trade(&mut self, trade: &Trade) -> Result<(), ComputationError> {
        validate_trade(trade)?;

        if trade.kind == TradeKind::Redeem && trade.market_id.outcome().is_none() {
            return self.settle_condition(trade);
        }

        let state = self.state_mut(&trade.market_id);
        state.check_order(trade)?;
        state.process_trade(trade)
    }

    /// A redeem without an outcome settles every open long of its condition.
    ///
    /// The payout is split pro-rata by open size; the last position takes the
    /// remainder so the parts sum exactly to the payout.
    fn settle_condition(&mut self, trade: &Trade) -> Result<(), ComputationError> {
        let condition = trade.market_id.condition_id();
        let open: Vec<MarketId> = self
            .states
            .values()
            .filter(|s| {
                s.market_id.outcome().is_some()
                    && s.market_id.condition_id() == condition
                    && s.is_long()
            })
            .map(|s| s.market_id.clone())
            .collect();

        let ops = Checked::for_trade(trade);
        let payout = ops.mul(trade.price, trade.size)?;

        if open.is_empty() {
            let state = self.state_mut(&trade.market_id);
            state.check_order(trade)?;
            return state.settle(&ops, trade, payout, trade.fee);
        }

        for market_id in &open {
            if let Some(state) = self.states.get(market_id) {
                state.check_order(trade)?;
            }
        }

        let total_open = open
            .iter()
            .filter_map(|id| self.states.get(id))
            .try_fold(Decimal::zero(), |total, s| ops.add(total, s.signed_size))?;
        let mut payout_left = payout;
        let mut fee_left = trade.fee;

        for (i, market_id) in open.iter().enumerate() {
            let Some(state) = self.states.get_mut(market_id) else {
                continue;
            };
            let (share, fee) = if i + 1 == open.len() {
                (payout_left, fee_left)
            } else {
                (
                    ops.pro_rata(payout, state.signed_size, total_open)?,
                    ops.pro_rata(trade.fee, state.signed_size, total_open)?,
                )
            };
            payout_left -= share;
            fee_left -= fee;
            state.settle(&ops, trade, share, fee)?;
        }
        Ok(())
    }

    fn state_mut(&mut self, market_id: &MarketId) -> &mut PositionState {
        let categories = &self.categories;
        let titles = &self.titles;
        self.states.entry(market_id.clone()).or_insert_with(|| {
            let mut state = PositionState::new(market_id.clone(), categories.get(market_id));
            state.title = titles.get(market_id.condition_id()).cloned();
            state
        })
    }

    pub fn get(&self, market_id: &MarketId) -> Option<&PositionState> {
        self.states.get(market_id)
    }

    pub fn states(&self) -> &PositionMap {
        &self.states
    }

    pub fn into_states(self) -> PositionMap {
        self.states
    }
}

fn validate_trade(trade: &Trade) -> Result<(), ComputationError> {
    if !trade.size.is_positive() {
        return Err(ComputationError::NonPositiveSize {
            trade_key: trade.trade_key.clone(),
            size: trade.size,
        });
    }
    if !trade.price.is_unit_interval() {
        return Err(ComputationError::PriceOutOfRange {
            trade_key: trade.trade_key.clone(),
            price: trade.price,
        });
    }
    if trade.fee.is_negative() {
        return Err(ComputationError::NegativeFee {
            trade_key: trade.trade_key.clone(),
            fee: trade.fee,
        });
    }
    if trade.checked_cash_flow().is_none() {
        return Err(Checked::for_trade(trade).overflow());
    }
    Ok(())
}

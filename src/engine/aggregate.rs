//! Account and category rollups over valued positions.
//!
//! Per-position figures are summed exactly into category subtotals; each
//! subtotal is rounded once to [`OUTPUT_DP`](crate::domain::decimal::OUTPUT_DP)
//! places and the account totals are the sums of those rounded subtotals.

use crate::config::PnlMode;
use crate::domain::{Category, Decimal, Trade};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

use super::{ComputationError, ValuedPosition, ValuedPositionMap};

fn checked_sum(a: Decimal, b: Decimal, context: &str) -> Result<Decimal, ComputationError> {
    a.checked_add(b)
        .ok_or_else(|| ComputationError::overflow(context))
}

/// Figures for one category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategorySubtotal {
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub market_value: Decimal,
    pub fees: Decimal,
    pub volume: Decimal,
    pub open_positions: usize,
    pub stale_positions: usize,
}

impl CategorySubtotal {
    fn add_position(
        &mut self,
        valued: &ValuedPosition,
        pnl_mode: PnlMode,
    ) -> Result<(), ComputationError> {
        let position = &valued.position;
        let context = position.category.as_str();
        let realized = match pnl_mode {
            PnlMode::Net => position
                .realized_pnl
                .checked_sub(position.fees_paid)
                .ok_or_else(|| ComputationError::overflow(position.market_id.as_str()))?,
            PnlMode::Gross => position.realized_pnl,
        };
        self.realized_pnl = checked_sum(self.realized_pnl, realized, context)?;
        self.fees = checked_sum(self.fees, position.fees_paid, context)?;
        self.volume = checked_sum(self.volume, position.bought_volume, context)?;

        if valued.is_open() {
            self.unrealized_pnl =
                checked_sum(self.unrealized_pnl, valued.unrealized_pnl, context)?;
            self.market_value = checked_sum(self.market_value, valued.market_value, context)?;
            self.open_positions += 1;
            if valued.stale {
                self.stale_positions += 1;
            }
        }
        Ok(())
    }

    fn rounded(self) -> Self {
        Self {
            realized_pnl: self.realized_pnl.round_output(),
            unrealized_pnl: self.unrealized_pnl.round_output(),
            market_value: self.market_value.round_output(),
            fees: self.fees.round_output(),
            volume: self.volume.round_output(),
            ..self
        }
    }
}

/// Account-level rollup. Always rebuilt from the full set of valued positions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AccountSummary {
    /// Realized P&L over every position, flat or open, per the P&L mode.
    pub total_realized_pnl: Decimal,
    pub total_unrealized_pnl: Decimal,
    pub total_market_value: Decimal,
    pub total_fees: Decimal,
    /// Bought volume (price * size over BUY trades).
    pub total_volume: Decimal,
    pub open_positions: usize,
    pub stale_positions: usize,
    pub per_category: BTreeMap<Category, CategorySubtotal>,
}

impl AccountSummary {
    /// At least one open position could not be marked.
    pub fn is_degraded(&self) -> bool {
        self.stale_positions > 0
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Aggregator {
    pnl_mode: PnlMode,
}

impl Aggregator {
    pub fn new(pnl_mode: PnlMode) -> Self {
        Self { pnl_mode }
    }

    /// Roll valued positions up into category subtotals and account totals.
    ///
    /// # Errors
    /// [`ComputationError::Overflow`] when a total leaves the decimal range.
    pub fn summarize(
        &self,
        positions: &ValuedPositionMap,
    ) -> Result<AccountSummary, ComputationError> {
        let mut exact: BTreeMap<Category, CategorySubtotal> = BTreeMap::new();
        for valued in positions.values() {
            exact
                .entry(valued.position.category.clone())
                .or_default()
                .add_position(valued, self.pnl_mode)?;
        }

        const TOTALS: &str = "account totals";
        let mut summary = AccountSummary::default();
        for (category, subtotal) in exact {
            let subtotal = subtotal.rounded();
            summary.total_realized_pnl =
                checked_sum(summary.total_realized_pnl, subtotal.realized_pnl, TOTALS)?;
            summary.total_unrealized_pnl =
                checked_sum(summary.total_unrealized_pnl, subtotal.unrealized_pnl, TOTALS)?;
            summary.total_market_value =
                checked_sum(summary.total_market_value, subtotal.market_value, TOTALS)?;
            summary.total_fees = checked_sum(summary.total_fees, subtotal.fees, TOTALS)?;
            summary.total_volume = checked_sum(summary.total_volume, subtotal.volume, TOTALS)?;
            summary.open_positions += subtotal.open_positions;
            summary.stale_positions += subtotal.stale_positions;
            summary.per_category.insert(category, subtotal);
        }
        Ok(summary)
    }
}

/// Net cash flow of one UTC calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyPnl {
    pub date: NaiveDate,
    pub cash_flow: Decimal,
    pub trade_count: usize,
}

/// Per-day cash flow, newest day first, with the all-time total.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DailyCashFlow {
    pub days: Vec<DailyPnl>,
    pub total: Decimal,
}

/// Group trades by UTC day. Sales bring in `notional - fee`, purchases spend
/// `notional + fee`.
pub fn daily_cash_flow(trades: &[Trade]) -> Result<DailyCashFlow, ComputationError> {
    let mut by_day: BTreeMap<NaiveDate, (Decimal, usize)> = BTreeMap::new();
    for trade in trades {
        let Some(date) = trade.time_ms.utc_date() else {
            continue;
        };
        let context = date.to_string();
        let cash_flow = trade
            .checked_cash_flow()
            .ok_or_else(|| ComputationError::overflow(format!("trade {}", trade.trade_key)))?;
        let entry = by_day.entry(date).or_insert((Decimal::zero(), 0));
        entry.0 = checked_sum(entry.0, cash_flow, &context)?;
        entry.1 += 1;
    }

    let days: Vec<DailyPnl> = by_day
        .into_iter()
        .rev()
        .map(|(date, (cash_flow, trade_count))| DailyPnl {
            date,
            cash_flow: cash_flow.round_output(),
            trade_count,
        })
        .collect();
    let total = days
        .iter()
        .try_fold(Decimal::zero(), |total, d| {
            checked_sum(total, d.cash_flow, "daily total")
        })?;
    Ok(DailyCashFlow { days, total })
}

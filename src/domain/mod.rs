//! Domain types and determinism layer for the account ledger.
//!
//! This module provides:
//! - Lossless numeric handling via Decimal wrapper
//! - Domain primitives: TimeMs, MarketId, Category, Side
//! - Market-to-category classification
//! - The canonical Trade and externally sourced MarkPrice
//! - Stable trade ordering key helper for deterministic replay

pub mod category;
pub mod decimal;
pub mod mark;
pub mod ordering;
pub mod primitives;
pub mod trade;

pub use category::{CategoryMap, TitleMap};
pub use decimal::Decimal;
pub use mark::{index_marks, MarkMap, MarkPrice};
pub use ordering::{sort_trades_deterministic, TradeOrderingKey};
pub use primitives::{Category, MarketId, Side, TimeMs};
pub use trade::{Trade, TradeKind};

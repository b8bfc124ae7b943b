use crate::api::AppState;
use crate::config::PnlMode;
use crate::engine::CategorySubtotal;
use crate::error::AppError;
use axum::extract::State;
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResponse {
    pub generation: u64,
    pub computed_at: i64,
    pub pnl_mode: PnlMode,
    pub total_realized_pnl: String,
    pub total_unrealized_pnl: String,
    pub total_market_value: String,
    pub total_fees: String,
    pub total_volume: String,
    pub open_positions: usize,
    pub stale_positions: usize,
    pub trade_count: usize,
    pub rejected_records: usize,
    pub missing_prices: Vec<String>,
    pub history_truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mark_fetch_error: Option<String>,
    pub degraded: bool,
    pub categories: Vec<CategoryDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryDto {
    pub category: String,
    pub realized_pnl: String,
    pub unrealized_pnl: String,
    pub market_value: String,
    pub fees: String,
    pub volume: String,
    pub open_positions: usize,
    pub stale_positions: usize,
}

impl CategoryDto {
    fn new(category: &str, subtotal: &CategorySubtotal) -> Self {
        Self {
            category: category.to_string(),
            realized_pnl: subtotal.realized_pnl.to_canonical_string(),
            unrealized_pnl: subtotal.unrealized_pnl.to_canonical_string(),
            market_value: subtotal.market_value.to_canonical_string(),
            fees: subtotal.fees.to_canonical_string(),
            volume: subtotal.volume.to_canonical_string(),
            open_positions: subtotal.open_positions,
            stale_positions: subtotal.stale_positions,
        }
    }
}

pub async fn get_summary(State(state): State<AppState>) -> Result<Json<SummaryResponse>, AppError> {
    let snapshot = state.snapshot()?;
    let summary = &snapshot.summary;

    Ok(Json(SummaryResponse {
        generation: snapshot.generation,
        computed_at: snapshot.computed_at.as_ms(),
        pnl_mode: snapshot.pnl_mode,
        total_realized_pnl: summary.total_realized_pnl.to_canonical_string(),
        total_unrealized_pnl: summary.total_unrealized_pnl.to_canonical_string(),
        total_market_value: summary.total_market_value.to_canonical_string(),
        total_fees: summary.total_fees.to_canonical_string(),
        total_volume: summary.total_volume.to_canonical_string(),
        open_positions: summary.open_positions,
        stale_positions: summary.stale_positions,
        trade_count: snapshot.trade_count,
        rejected_records: snapshot.rejected.len(),
        missing_prices: snapshot
            .missing_prices
            .iter()
            .map(|m| m.market_id().to_string())
            .collect(),
        history_truncated: snapshot.history_truncated,
        mark_fetch_error: snapshot.mark_fetch_error.clone(),
        degraded: snapshot.is_degraded(),
        categories: summary
            .per_category
            .iter()
            .map(|(category, subtotal)| CategoryDto::new(category.as_str(), subtotal))
            .collect(),
    }))
}

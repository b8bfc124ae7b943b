use crate::api::AppState;
use crate::error::AppError;
use axum::extract::State;
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyPnlResponse {
    pub generation: u64,
    /// Newest day first.
    pub days: Vec<DailyPnlDto>,
    pub total: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyPnlDto {
    /// UTC calendar day, `YYYY-MM-DD`.
    pub date: String,
    pub cash_flow: String,
    pub trade_count: usize,
}

pub async fn get_daily_pnl(
    State(state): State<AppState>,
) -> Result<Json<DailyPnlResponse>, AppError> {
    let snapshot = state.snapshot()?;

    Ok(Json(DailyPnlResponse {
        generation: snapshot.generation,
        days: snapshot
            .daily
            .days
            .iter()
            .map(|day| DailyPnlDto {
                date: day.date.format("%Y-%m-%d").to_string(),
                cash_flow: day.cash_flow.to_canonical_string(),
                trade_count: day.trade_count,
            })
            .collect(),
        total: snapshot.daily.total.to_canonical_string(),
    }))
}

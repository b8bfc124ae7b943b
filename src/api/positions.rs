use crate::api::AppState;
use crate::domain::Decimal;
use crate::engine::ValuedPosition;
use crate::error::AppError;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionsQuery {
    pub category: Option<String>,
    pub include_flat: Option<bool>,
    pub include_dust: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionsResponse {
    pub generation: u64,
    pub positions: Vec<PositionDto>,
    /// Open positions left out as dust.
    pub hidden_dust: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionDto {
    pub market_id: String,
    pub condition_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub signed_size: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_cost: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mark: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mark_as_of: Option<i64>,
    pub unrealized_pnl: String,
    pub market_value: String,
    pub to_win: String,
    pub realized_pnl: String,
    pub net_realized_pnl: String,
    pub fees_paid: String,
    pub bought_volume: String,
    pub sold_volume: String,
    pub trade_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opened_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_trade_at: Option<i64>,
    pub stale: bool,
}

fn output(value: Decimal) -> String {
    value.round_output().to_canonical_string()
}

impl From<&ValuedPosition> for PositionDto {
    fn from(valued: &ValuedPosition) -> Self {
        let position = &valued.position;
        Self {
            market_id: position.market_id.to_string(),
            condition_id: position.market_id.condition_id().to_string(),
            outcome: position.market_id.outcome().map(str::to_string),
            category: position.category.to_string(),
            title: position.title.clone(),
            signed_size: output(position.signed_size),
            average_cost: position.average_cost().map(output),
            mark: valued.mark.map(output),
            mark_as_of: valued.mark_as_of.map(|t| t.as_ms()),
            unrealized_pnl: output(valued.unrealized_pnl),
            market_value: output(valued.market_value),
            to_win: output(valued.to_win()),
            realized_pnl: output(position.realized_pnl),
            net_realized_pnl: output(position.net_realized_pnl()),
            fees_paid: output(position.fees_paid),
            bought_volume: output(position.bought_volume),
            sold_volume: output(position.sold_volume),
            trade_count: position.trade_count,
            opened_at: position.opened_at.map(|t| t.as_ms()),
            last_trade_at: position.last_trade_at.map(|t| t.as_ms()),
            stale: valued.stale,
        }
    }
}

/// Valued positions, most recently traded first. Flat positions and dust are
/// hidden unless asked for; totals in `/v1/summary` always include them.
///
/// A blank or malformed filter is a 400; a category the account never traded
/// is a 404.
pub async fn get_positions(
    params: Result<Query<PositionsQuery>, QueryRejection>,
    State(state): State<AppState>,
) -> Result<Json<PositionsResponse>, AppError> {
    let Query(params) = params.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let snapshot = state.snapshot()?;

    let category = match params.category.as_deref().map(str::trim) {
        None => None,
        Some("") => {
            return Err(AppError::BadRequest(
                "category filter must not be blank".to_string(),
            ))
        }
        Some(c) => {
            let known = snapshot
                .summary
                .per_category
                .keys()
                .any(|k| k.as_str().eq_ignore_ascii_case(c));
            if !known {
                return Err(AppError::NotFound(format!("no positions in category {}", c)));
            }
            Some(c)
        }
    };
    let include_flat = params.include_flat.unwrap_or(false);
    let include_dust = params.include_dust.unwrap_or(false);

    let mut hidden_dust = 0;
    let mut selected: Vec<&ValuedPosition> = snapshot
        .positions
        .values()
        .filter(|v| category.map_or(true, |c| v.position.category.as_str().eq_ignore_ascii_case(c)))
        .filter(|v| include_flat || v.is_open())
        .filter(|v| {
            let dust = v.is_dust(state.dust_threshold);
            if dust && !include_dust {
                hidden_dust += 1;
                false
            } else {
                true
            }
        })
        .collect();

    selected.sort_by(|a, b| {
        b.position
            .last_trade_at
            .cmp(&a.position.last_trade_at)
            .then_with(|| a.position.market_id.cmp(&b.position.market_id))
    });

    Ok(Json(PositionsResponse {
        generation: snapshot.generation,
        positions: selected.into_iter().map(PositionDto::from).collect(),
        hidden_dust,
    }))
}

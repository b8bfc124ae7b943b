pub mod health;
pub mod pnl;
pub mod positions;
pub mod refresh;
pub mod summary;

use crate::domain::Decimal;
use crate::error::AppError;
use crate::orchestration::{RefreshTrigger, Snapshot, SnapshotReader};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub reader: SnapshotReader,
    pub trigger: RefreshTrigger,
    pub dust_threshold: Decimal,
}

impl AppState {
    pub fn new(reader: SnapshotReader, trigger: RefreshTrigger, dust_threshold: Decimal) -> Self {
        Self {
            reader,
            trigger,
            dust_threshold,
        }
    }

    /// The latest Ready snapshot, or 503 until the first refresh completes.
    pub fn snapshot(&self) -> Result<Arc<Snapshot>, AppError> {
        self.reader
            .latest()
            .ok_or_else(|| AppError::Unavailable("no snapshot computed yet".to_string()))
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/summary", get(summary::get_summary))
        .route("/v1/positions", get(positions::get_positions))
        .route("/v1/pnl/daily", get(pnl::get_daily_pnl))
        .route("/v1/refresh", post(refresh::post_refresh))
        .layer(cors)
        .with_state(state)
}

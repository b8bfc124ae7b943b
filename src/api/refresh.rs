use crate::api::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

/// Ask the scheduler for an immediate refresh. The current snapshot keeps
/// being served until the new one is ready.
pub async fn post_refresh(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    state.trigger.trigger();
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "status": "accepted",
            "generation": state.reader.status().generation,
        })),
    )
}

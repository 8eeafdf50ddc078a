use super::json_error::JsonError;
use crate::app::AppState;
use axum::{extract::State, Json};
use inspector_json::Frame;

// Manual captures share the acquisition queue with the periodic refresh, so
// they wait for the capture in progress.
pub async fn get_frame(State(state): State<AppState>) -> Result<Json<Frame>, JsonError> {
    let frame = state.acquisition().capture().await?;
    tracing::debug!(sequence = frame.sequence, "manual capture");
    Ok(Json(frame.to_json(state.presentation().sampling_frequency())))
}

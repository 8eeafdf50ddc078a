use super::json_error::JsonError;
use crate::app::AppState;
use axum::{extract::State, Json};
use inspector_json::Registers;

pub async fn get_registers(State(state): State<AppState>) -> Result<Json<Registers>, JsonError> {
    Ok(Json(state.acquisition().registers().await?))
}

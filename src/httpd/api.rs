use super::{inspector::inspector_settings_json, json_error::JsonError};
use crate::app::AppState;
use axum::{extract::State, Json};

pub async fn get_api(
    State(state): State<AppState>,
) -> Result<Json<inspector_json::Api>, JsonError> {
    let registers = state.acquisition().registers().await?;
    Ok(Json(inspector_json::Api {
        inspector: inspector_settings_json(&state),
        registers,
    }))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing;

    #[tokio::test]
    async fn whole_configuration() {
        let state = testing::app_state();
        let Json(api) = get_api(State(state)).await.unwrap();
        assert_eq!(api.inspector.packet_size, 64);
        assert_eq!(api.registers.packetsize, 64);
        assert_eq!((api.registers.reset, api.registers.enable), (1, 0));
    }
}

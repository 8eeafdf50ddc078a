use super::json_error::JsonError;
use crate::app::AppState;
use anyhow::Context;
use axum::{extract::State, Json};
use inspector_json::{Inspector, PatchInspector, RefreshState};
use std::time::Duration;

pub fn inspector_settings_json(state: &AppState) -> Inspector {
    let settings = state.acquisition().settings();
    let refresh = state.refresh();
    let presentation = state.presentation();
    Inspector {
        packet_size: settings.packet_size,
        max_packet_size: settings.max_packet_size,
        fractional_bits: settings.fractional_bits,
        autoscale: settings.autoscale,
        refresh: if refresh.is_running() {
            RefreshState::Running
        } else {
            RefreshState::Stopped
        },
        plotting_rate: refresh.interval().as_secs_f64(),
        sampling_frequency: presentation.sampling_frequency(),
        axis_range: presentation.axis_range(),
    }
}

pub async fn get_inspector(State(state): State<AppState>) -> Json<Inspector> {
    Json(inspector_settings_json(&state))
}

async fn update_inspector(state: &AppState, patch: &PatchInspector) -> Result<(), JsonError> {
    if let Some(packet_size) = patch.packet_size {
        state.acquisition().set_packet_size(packet_size).await?;
    }
    if let Some(fractional_bits) = patch.fractional_bits {
        state
            .acquisition()
            .set_fractional_bits(fractional_bits)
            .await?;
    }
    if let Some(autoscale) = patch.autoscale {
        state.acquisition().set_autoscale(autoscale).await?;
    }
    if let Some(plotting_rate) = patch.plotting_rate {
        let interval = Duration::try_from_secs_f64(plotting_rate)
            .context("invalid plotting rate")
            .map_err(JsonError::client_error)?;
        state.refresh().set_interval(interval)?;
    }
    if let Some(sampling_frequency) = patch.sampling_frequency {
        state
            .presentation()
            .set_sampling_frequency(sampling_frequency)
            .map_err(JsonError::client_error)?;
    }
    if let Some(axis_range) = patch.axis_range {
        state
            .presentation()
            .set_axis_range(axis_range)
            .map_err(JsonError::client_error)?;
    }
    // Applied last, so that a refresh started by this request already uses
    // the other settings.
    match patch.refresh {
        Some(RefreshState::Running) => state.refresh().start(),
        Some(RefreshState::Stopped) => state.refresh().stop(),
        None => (),
    }
    Ok(())
}

pub async fn patch_inspector(
    State(state): State<AppState>,
    Json(patch): Json<PatchInspector>,
) -> Result<Json<Inspector>, JsonError> {
    update_inspector(&state, &patch).await?;
    Ok(Json(inspector_settings_json(&state)))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn initial_settings() {
        let Json(inspector) = get_inspector(State(testing::app_state())).await;
        assert_eq!(
            inspector,
            Inspector {
                packet_size: 64,
                max_packet_size: 2048,
                fractional_bits: 14,
                autoscale: false,
                refresh: RefreshState::Stopped,
                plotting_rate: 0.5,
                sampling_frequency: 100e3,
                axis_range: 1.0,
            }
        );
    }

    #[tokio::test]
    async fn patch() {
        let state = testing::app_state();
        let patch = PatchInspector {
            packet_size: Some(256),
            fractional_bits: Some(12),
            autoscale: Some(true),
            refresh: Some(RefreshState::Running),
            plotting_rate: Some(0.25),
            sampling_frequency: Some(1e6),
            axis_range: Some(2.0),
        };
        let Json(inspector) = patch_inspector(State(state.clone()), Json(patch))
            .await
            .unwrap();
        assert_eq!(
            inspector,
            Inspector {
                packet_size: 256,
                max_packet_size: 2048,
                fractional_bits: 12,
                autoscale: true,
                refresh: RefreshState::Running,
                plotting_rate: 0.25,
                sampling_frequency: 1e6,
                axis_range: 2.0,
            }
        );
        let registers = state.acquisition().registers().await.unwrap();
        assert_eq!(registers.packetsize, 256);
    }

    #[tokio::test]
    async fn invalid_patch() {
        let state = testing::app_state();
        for patch in [
            PatchInspector {
                packet_size: Some(0),
                ..Default::default()
            },
            PatchInspector {
                plotting_rate: Some(0.0),
                ..Default::default()
            },
            PatchInspector {
                plotting_rate: Some(-1.0),
                ..Default::default()
            },
            PatchInspector {
                plotting_rate: Some(1e19),
                ..Default::default()
            },
            PatchInspector {
                packet_size: Some(2049),
                ..Default::default()
            },
            PatchInspector {
                fractional_bits: Some(16),
                ..Default::default()
            },
            PatchInspector {
                axis_range: Some(0.0),
                ..Default::default()
            },
        ] {
            let error = patch_inspector(State(state.clone()), Json(patch))
                .await
                .unwrap_err();
            assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
        }
        let Json(inspector) = get_inspector(State(state)).await;
        assert_eq!(inspector.packet_size, 64);
        assert_eq!(inspector.fractional_bits, 14);
        assert_eq!(inspector.plotting_rate, 0.5);
    }
}

//! inspector-json contains the JSON schemas used by the RFSoC data inspector
//! HTTP API.

#![warn(missing_docs)]

use serde::{Deserialize, Serialize};

/// API JSON schema.
///
/// This JSON schema corresponds to GET requests on `/api`. It contains the
/// settings of the full data inspector.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Api {
    /// Data inspector settings.
    pub inspector: Inspector,
    /// Current value of the IP core control registers.
    pub registers: Registers,
}

/// Data inspector JSON schema.
///
/// This JSON schema corresponds to GET requests on `/api/inspector`. It
/// contains the acquisition settings and the settings used by plotting
/// clients.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Inspector {
    /// Number of complex samples in each frame.
    pub packet_size: u32,
    /// Largest packet size supported by the DMA memory (read-only).
    pub max_packet_size: u32,
    /// Number of fractional bits of the fixed-point samples.
    pub fractional_bits: u32,
    /// Normalize each frame to its maximum sample.
    pub autoscale: bool,
    /// Periodic refresh state.
    pub refresh: RefreshState,
    /// Time between periodic frame captures, in seconds.
    pub plotting_rate: f64,
    /// Sampling frequency of the inspected signal in samples per second.
    pub sampling_frequency: f64,
    /// Amplitude range shown by the time and constellation plots.
    pub axis_range: f64,
}

/// Data inspector PATCH JSON schema.
///
/// This JSON schema corresponds to PATCH requests on `/api/inspector`. It
/// contains a subset of the settings of the data inspector.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct PatchInspector {
    /// Number of complex samples in each frame.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packet_size: Option<u32>,
    /// Number of fractional bits of the fixed-point samples.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fractional_bits: Option<u32>,
    /// Normalize each frame to its maximum sample.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autoscale: Option<bool>,
    /// Periodic refresh state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh: Option<RefreshState>,
    /// Time between periodic frame captures, in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plotting_rate: Option<f64>,
    /// Sampling frequency of the inspected signal in samples per second.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling_frequency: Option<f64>,
    /// Amplitude range shown by the time and constellation plots.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub axis_range: Option<f64>,
}

/// Periodic refresh state.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum RefreshState {
    /// Frames are only captured on request.
    Stopped,
    /// Frames are captured periodically and streamed to clients.
    Running,
}

impl std::fmt::Display for RefreshState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(
            f,
            "{}",
            match self {
                RefreshState::Stopped => "Stopped",
                RefreshState::Running => "Running",
            }
        )
    }
}

/// Control registers JSON schema.
///
/// This JSON schema corresponds to GET requests on `/api/registers`. It
/// contains the values read from the data inspector IP core registers.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Registers {
    /// Reset register.
    pub reset: u32,
    /// Enable register.
    pub enable: u32,
    /// Packet size register.
    pub packetsize: u32,
}

/// Frame JSON schema.
///
/// This JSON schema corresponds to GET requests on `/api/frame`. It contains
/// a single frame of complex samples captured on request.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Frame {
    /// Capture sequence number.
    pub sequence: u64,
    /// Sampling frequency of the inspected signal in samples per second.
    pub sampling_frequency: f64,
    /// Real part of the samples.
    pub re: Vec<f64>,
    /// Imaginary part of the samples.
    pub im: Vec<f64>,
}

//! rfsoc-inspector CLI arguments.
//!
//! This module contains the definition of the CLI arguments for the
//! rfsoc-inspector application.

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

/// rfsoc-inspector CLI arguments.
#[derive(Parser, Debug, Clone, PartialEq)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// Listen address for the HTTP server
    #[clap(long, default_value = "0.0.0.0:8000")]
    pub listen: SocketAddr,
    /// Name of the UIO device of the data inspector IP core
    #[clap(long, default_value = "data_inspector")]
    pub inspector_uio: String,
    /// Name of the UIO device of the AXI DMA core
    #[clap(long, default_value = "axi_dma")]
    pub dma_uio: String,
    /// Name of the u-dma-buf device used for the acquisition buffer
    #[clap(long, default_value = "udmabuf0")]
    pub udmabuf: String,
    /// Initial number of complex samples per frame
    #[clap(long, default_value_t = crate::inspector::DEFAULT_PACKET_SIZE)]
    pub packet_size: u32,
    /// Time between periodic frame captures in seconds
    #[clap(long, default_value_t = 0.5)]
    pub plotting_rate: f64,
    /// Number of fractional bits of the fixed-point samples
    #[clap(long, default_value_t = crate::frame::FRACTIONAL_BITS)]
    pub fractional_bits: u32,
    /// Normalize each frame to its maximum sample
    #[clap(long)]
    pub autoscale: bool,
    /// Sampling frequency of the inspected signal in samples per second
    #[clap(long, default_value_t = 100e3)]
    pub sampling_frequency: f64,
    /// Amplitude range shown by the plotting clients
    #[clap(long, default_value_t = 1.0)]
    pub axis_range: f64,
    /// Maximum time to wait for a DMA transfer in milliseconds
    #[clap(long, default_value_t = 1000)]
    pub dma_timeout_ms: u64,
    /// Do not start the periodic refresh until requested through the API
    #[clap(long)]
    pub stopped: bool,
    /// Run on a simulated peripheral instead of the FPGA
    #[clap(long)]
    pub simulate: bool,
}

impl Args {
    /// Returns the DMA transfer timeout.
    pub fn dma_timeout(&self) -> Duration {
        Duration::from_millis(self.dma_timeout_ms)
    }
}

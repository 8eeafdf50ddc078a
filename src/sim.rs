//! Simulated peripheral.
//!
//! Allows running the driver and the HTTP server without the FPGA. The
//! simulated DMA channel fills the buffer with a complex tone in the data
//! inspector fixed-point format and completes the transfer after a fixed
//! latency.

use crate::buffer::{DmaBuffer, HeapAllocator};
use crate::dma::DmaChannel;
use crate::error::Error;
use crate::frame::FRACTIONAL_BITS;
use crate::inspector::{Config, Inspector};
use crate::registers::Registers;
use std::f64::consts::TAU;
use std::time::Duration;
use tokio::time::Instant;

/// Simulated S2MM DMA channel.
#[derive(Debug, Clone)]
pub struct SimulatedDma {
    latency: Option<Duration>,
    deadline: Option<Instant>,
    // tone frequency in cycles per sample
    frequency: f64,
    amplitude: f64,
    phase: f64,
}

impl SimulatedDma {
    /// Creates a channel whose transfers complete after `latency`.
    pub fn new(latency: Duration) -> SimulatedDma {
        SimulatedDma {
            latency: Some(latency),
            deadline: None,
            frequency: 1.0 / 16.0,
            amplitude: 0.5,
            phase: 0.0,
        }
    }

    /// Creates a channel whose transfers never complete.
    pub fn stalled() -> SimulatedDma {
        SimulatedDma {
            latency: None,
            ..SimulatedDma::new(Duration::ZERO)
        }
    }

    /// Sets the tone frequency, in cycles per sample, and its amplitude,
    /// relative to the fixed-point full scale.
    #[cfg(test)]
    pub fn with_tone(self, frequency: f64, amplitude: f64) -> SimulatedDma {
        SimulatedDma {
            frequency,
            amplitude,
            ..self
        }
    }
}

impl DmaChannel for SimulatedDma {
    fn start(&mut self, buffer: &mut DmaBuffer) -> Result<(), Error> {
        if self.deadline.is_some() {
            return Err(Error::ChannelBusy);
        }
        let scale = self.amplitude * f64::from(1u32 << FRACTIONAL_BITS);
        for iq in buffer.as_mut_slice().chunks_exact_mut(2) {
            iq[0] = (scale * self.phase.cos()).round() as i16;
            iq[1] = (scale * self.phase.sin()).round() as i16;
            self.phase = (self.phase + TAU * self.frequency) % TAU;
        }
        self.deadline = Some(match self.latency {
            Some(latency) => Instant::now() + latency,
            // far enough in the future to never be reached
            None => Instant::now() + Duration::from_secs(86400 * 365 * 30),
        });
        Ok(())
    }

    fn poll_done(&mut self) -> Result<bool, Error> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                self.deadline = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn abort(&mut self) {
        self.deadline = None;
    }
}

/// Data inspector running on the simulated peripheral.
pub type SimulatedInspector = Inspector<Registers, SimulatedDma, HeapAllocator>;

/// Creates a data inspector on the simulated peripheral.
///
/// Buffers of up to `capacity` 16-bit values can be allocated.
pub fn inspector(
    dma: SimulatedDma,
    capacity: usize,
    config: &Config,
) -> Result<SimulatedInspector, Error> {
    Inspector::new(
        Registers::in_memory(),
        dma,
        HeapAllocator::new(capacity),
        config,
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::buffer::DmaAllocator;

    #[tokio::test(start_paused = true)]
    async fn completes_after_latency() {
        let mut dma = SimulatedDma::new(Duration::from_millis(10));
        let mut buffer = HeapAllocator::new(8).allocate(8).unwrap();
        dma.start(&mut buffer).unwrap();
        assert!(!dma.poll_done().unwrap());
        assert!(matches!(dma.start(&mut buffer), Err(Error::ChannelBusy)));
        tokio::time::advance(Duration::from_millis(10)).await;
        assert!(dma.poll_done().unwrap());
        assert!(!dma.poll_done().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_never_completes() {
        let mut dma = SimulatedDma::stalled();
        let mut buffer = HeapAllocator::new(8).allocate(8).unwrap();
        dma.start(&mut buffer).unwrap();
        tokio::time::advance(Duration::from_secs(3600)).await;
        assert!(!dma.poll_done().unwrap());
        dma.abort();
        dma.start(&mut buffer).unwrap();
    }

    #[test]
    fn tone() {
        let mut dma = SimulatedDma::new(Duration::ZERO).with_tone(0.25, 0.5);
        let mut buffer = HeapAllocator::new(8).allocate(8).unwrap();
        dma.start(&mut buffer).unwrap();
        assert_eq!(
            buffer.as_slice(),
            &[8192, 0, 0, 8192, -8192, 0, 0, -8192]
        );
    }
}

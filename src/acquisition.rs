//! Acquisition task.
//!
//! The register sequence of a capture is not reentrant, so a single task owns
//! the [`Inspector`] and serializes every capture and reconfiguration. Other
//! parts of the application send requests through an [`AcquisitionHandle`]
//! and queue behind the capture in progress.

use crate::buffer::DmaAllocator;
use crate::dma::DmaChannel;
use crate::error::Error;
use crate::frame::Frame;
use crate::inspector::Inspector;
use crate::registers::{ControlRegisters, Register};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};

// Number of requests that can be queued behind the capture in progress.
const QUEUE_SIZE: usize = 16;

/// Acquisition settings.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Settings {
    /// Number of complex samples per frame.
    pub packet_size: u32,
    /// Largest packet size that fits in the DMA memory.
    pub max_packet_size: u32,
    /// Number of fractional bits of the fixed-point samples.
    pub fractional_bits: u32,
    /// Normalize each frame to its maximum sample.
    pub autoscale: bool,
    /// Maximum time to wait for a DMA transfer.
    pub timeout: Duration,
}

#[derive(Debug)]
enum Request {
    Capture(oneshot::Sender<Result<Arc<Frame>, Error>>),
    SetPacketSize(u32, oneshot::Sender<Result<(), Error>>),
    SetFractionalBits(u32, oneshot::Sender<Result<(), Error>>),
    SetAutoscale(bool, oneshot::Sender<()>),
    SetTimeout(Duration, oneshot::Sender<()>),
    Registers(oneshot::Sender<inspector_json::Registers>),
}

/// Acquisition task.
///
/// Owns the data inspector. It must be run with [`Acquisition::run`].
#[derive(Debug)]
pub struct Acquisition<R, D, A> {
    inspector: Inspector<R, D, A>,
    requests: mpsc::Receiver<Request>,
    settings: watch::Sender<Settings>,
}

/// Handle to the acquisition task.
///
/// Cheaply clonable. Requests are processed in order, one at a time.
#[derive(Debug, Clone)]
pub struct AcquisitionHandle {
    requests: mpsc::Sender<Request>,
    settings: watch::Receiver<Settings>,
}

impl<R, D, A> Acquisition<R, D, A>
where
    R: ControlRegisters,
    D: DmaChannel,
    A: DmaAllocator,
{
    /// Creates the acquisition task for an inspector.
    ///
    /// Captures wait at most `timeout` for the DMA transfer. Fails if
    /// `timeout` is zero.
    pub fn new(
        inspector: Inspector<R, D, A>,
        timeout: Duration,
    ) -> Result<(Acquisition<R, D, A>, AcquisitionHandle), Error> {
        check_timeout(timeout)?;
        let (request_sender, requests) = mpsc::channel(QUEUE_SIZE);
        let (settings, settings_receiver) = watch::channel(Settings {
            packet_size: inspector.packet_size(),
            max_packet_size: inspector.max_packet_size(),
            fractional_bits: inspector.fractional_bits(),
            autoscale: inspector.autoscale(),
            timeout,
        });
        let acquisition = Acquisition {
            inspector,
            requests,
            settings,
        };
        let handle = AcquisitionHandle {
            requests: request_sender,
            settings: settings_receiver,
        };
        Ok((acquisition, handle))
    }

    /// Runs the acquisition task.
    ///
    /// Returns when all the handles have been dropped.
    #[tracing::instrument(name = "acquisition", skip_all)]
    pub async fn run(mut self) -> Result<()> {
        while let Some(request) = self.requests.recv().await {
            match request {
                Request::Capture(reply) => {
                    let timeout = self.settings.borrow().timeout;
                    let frame = self.inspector.capture_frame(timeout).await.map(Arc::new);
                    // the requester might have gone away
                    let _ = reply.send(frame);
                }
                Request::SetPacketSize(packet_size, reply) => {
                    let result = self.inspector.set_packet_size(packet_size);
                    if result.is_ok() {
                        tracing::info!(packet_size, "packet size changed");
                        self.settings
                            .send_modify(|settings| settings.packet_size = packet_size);
                    }
                    let _ = reply.send(result);
                }
                Request::SetFractionalBits(fractional_bits, reply) => {
                    let result = self.inspector.set_fractional_bits(fractional_bits);
                    if result.is_ok() {
                        tracing::info!(fractional_bits, "fractional bits changed");
                        self.settings
                            .send_modify(|settings| settings.fractional_bits = fractional_bits);
                    }
                    let _ = reply.send(result);
                }
                Request::SetAutoscale(autoscale, reply) => {
                    self.inspector.set_autoscale(autoscale);
                    self.settings
                        .send_modify(|settings| settings.autoscale = autoscale);
                    let _ = reply.send(());
                }
                Request::SetTimeout(timeout, reply) => {
                    tracing::debug!(?timeout, "DMA timeout changed");
                    self.settings
                        .send_modify(|settings| settings.timeout = timeout);
                    let _ = reply.send(());
                }
                Request::Registers(reply) => {
                    let registers = self.inspector.registers();
                    let _ = reply.send(inspector_json::Registers {
                        reset: registers.get(Register::Reset),
                        enable: registers.get(Register::Enable),
                        packetsize: registers.get(Register::PacketSize),
                    });
                }
            }
        }
        tracing::debug!("all acquisition handles dropped");
        Ok(())
    }
}

impl AcquisitionHandle {
    async fn request<T>(
        &self,
        request: impl FnOnce(oneshot::Sender<T>) -> Request,
    ) -> Result<T, Error> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(request(reply))
            .await
            .map_err(|_| Error::AcquisitionStopped)?;
        response.await.map_err(|_| Error::AcquisitionStopped)
    }

    /// Captures a frame.
    pub async fn capture(&self) -> Result<Arc<Frame>, Error> {
        self.request(Request::Capture).await?
    }

    /// Sets the number of complex samples per frame.
    pub async fn set_packet_size(&self, packet_size: u32) -> Result<(), Error> {
        self.request(|reply| Request::SetPacketSize(packet_size, reply))
            .await?
    }

    /// Sets the number of fractional bits of the fixed-point samples.
    ///
    /// The change applies to the captures requested after this call.
    pub async fn set_fractional_bits(&self, fractional_bits: u32) -> Result<(), Error> {
        self.request(|reply| Request::SetFractionalBits(fractional_bits, reply))
            .await?
    }

    /// Enables or disables frame normalization.
    ///
    /// The change applies to the captures requested after this call.
    pub async fn set_autoscale(&self, autoscale: bool) -> Result<(), Error> {
        self.request(|reply| Request::SetAutoscale(autoscale, reply))
            .await
    }

    /// Sets the maximum time to wait for a DMA transfer.
    ///
    /// Fails if `timeout` is zero.
    pub async fn set_timeout(&self, timeout: Duration) -> Result<(), Error> {
        check_timeout(timeout)?;
        self.request(|reply| Request::SetTimeout(timeout, reply))
            .await
    }

    /// Reads the control registers.
    pub async fn registers(&self) -> Result<inspector_json::Registers, Error> {
        self.request(Request::Registers).await
    }

    /// Returns the current acquisition settings.
    ///
    /// Changes whose request has not returned yet might not be reflected.
    pub fn settings(&self) -> Settings {
        *self.settings.borrow()
    }
}

fn check_timeout(timeout: Duration) -> Result<(), Error> {
    if timeout.is_zero() {
        return Err(Error::InvalidTimeout(timeout));
    }
    Ok(())
}

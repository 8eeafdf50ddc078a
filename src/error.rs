//! Driver errors.

use std::time::Duration;

/// Errors produced by the data inspector driver.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The DMA transfer did not complete within the allowed time.
    #[error("DMA transfer did not complete in {0:?}")]
    TransferTimeout(Duration),
    /// The DMA channel reported an error.
    #[error("DMA transfer failed (S2MM status {status:#010x})")]
    TransferFailed {
        /// Value of the S2MM status register.
        status: u32,
    },
    /// The DMA channel is halted and could not be started.
    #[error("DMA channel is halted")]
    ChannelHalted,
    /// A transfer was requested while the previous one is still in flight.
    #[error("DMA channel is busy")]
    ChannelBusy,
    /// The buffer does not fit in the DMA length register.
    #[error("DMA transfer of {bytes} bytes exceeds the maximum of {max} bytes")]
    TransferTooLarge {
        /// Requested transfer size.
        bytes: usize,
        /// Maximum transfer size.
        max: usize,
    },
    /// Allocation of the acquisition buffer failed.
    #[error("failed to allocate DMA buffer of {length} samples: {reason}")]
    Allocation {
        /// Requested buffer length in 16-bit samples.
        length: usize,
        /// Cause of the failure.
        reason: String,
    },
    /// The packet size was rejected before touching the hardware.
    #[error("invalid packet size {0}")]
    InvalidPacketSize(u32),
    /// The refresh interval is zero or too long.
    #[error("invalid refresh interval {0:?}")]
    InvalidInterval(Duration),
    /// The DMA timeout must be greater than zero.
    #[error("invalid DMA timeout {0:?}")]
    InvalidTimeout(Duration),
    /// The samples cannot have that many fractional bits.
    #[error("invalid number of fractional bits {0}")]
    InvalidFractionalBits(u32),
    /// There is no acquisition buffer, because a previous reshape failed.
    #[error("acquisition buffer not allocated")]
    BufferUnavailable,
    /// The acquisition task has stopped.
    #[error("acquisition task stopped")]
    AcquisitionStopped,
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` if the error was caused by the caller's arguments.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidPacketSize(_)
                | Error::InvalidInterval(_)
                | Error::InvalidTimeout(_)
                | Error::InvalidFractionalBits(_)
                | Error::TransferTooLarge { .. }
        )
    }
}

//! DMA receive channel.
//!
//! The samples produced by the data inspector are sent over AXI4-Stream to
//! the S2MM channel of a Xilinx AXI DMA core in simple (non scatter-gather)
//! mode. This module contains the [`DmaChannel`] abstraction used by the frame
//! acquisition and its implementation for the AXI DMA.

use crate::buffer::DmaBuffer;
use crate::error::Error;
use crate::registers::RegisterMemory;
use crate::uio::Uio;
use anyhow::Context;
use inspector_pac::axi_dma::{dmacr, dmasr, RegisterBlock};

/// Inbound DMA channel.
pub trait DmaChannel: Send {
    /// Starts a transfer that fills `buffer`.
    ///
    /// The buffer must stay allocated until [`DmaChannel::poll_done`] returns
    /// `Ok(true)` or the transfer is aborted.
    fn start(&mut self, buffer: &mut DmaBuffer) -> Result<(), Error>;

    /// Checks whether the transfer in flight has completed.
    fn poll_done(&mut self) -> Result<bool, Error>;

    /// Aborts the transfer in flight, leaving the channel ready for a new
    /// transfer.
    fn abort(&mut self);
}

// The S2MM length register is 26 bits wide when the core is built with the
// maximum buffer length width.
const MAX_TRANSFER_BYTES: usize = (1 << 26) - 1;

// Number of status register reads to wait for a soft reset to complete.
const RESET_POLLS: usize = 1000;

/// S2MM channel of an AXI DMA core.
pub struct AxiDma {
    registers: RegisterMemory<RegisterBlock>,
    in_flight: bool,
}

impl AxiDma {
    /// Opens the AXI DMA core through its UIO device.
    ///
    /// The channel is reset and started.
    pub async fn open(uio_name: &str) -> anyhow::Result<AxiDma> {
        let uio = Uio::from_name(uio_name)
            .await
            .context("failed to open AXI DMA UIO")?;
        let mapping = uio
            .map_mapping(0)
            .await
            .context("failed to map AXI DMA UIO")?;
        let phys_addr = uio.map_addr(0).await?;
        tracing::info!(
            "opened AXI DMA {} at physical address {phys_addr:#08x}",
            uio.name()
        );
        let mut dma = AxiDma {
            registers: RegisterMemory::Mapped(mapping),
            in_flight: false,
        };
        dma.abort();
        Ok(dma)
    }

    #[cfg(test)]
    fn in_memory() -> AxiDma {
        AxiDma {
            registers: RegisterMemory::Owned(Box::default()),
            in_flight: false,
        }
    }

    fn status(&self) -> u32 {
        self.registers.s2mm_dmasr.get()
    }

    // The interrupt bits are write-one-to-clear. They are set even though
    // the interrupts are not enabled, and must be cleared before the next
    // transfer.
    fn acknowledge(&self, status: u32) {
        let pending = status & (dmasr::IOC_IRQ | dmasr::ERR_IRQ);
        if pending != 0 {
            self.registers.s2mm_dmasr.set(pending);
        }
    }

    fn run(&self) -> Result<(), Error> {
        if self.status() & dmasr::HALTED != 0 {
            let control = self.registers.s2mm_dmacr.get();
            self.registers.s2mm_dmacr.set(control | dmacr::RS);
            if self.status() & dmasr::HALTED != 0 {
                return Err(Error::ChannelHalted);
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for AxiDma {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        f.debug_struct("AxiDma")
            .field("s2mm_dmasr", &format_args!("{:#010x}", self.status()))
            .field("in_flight", &self.in_flight)
            .finish()
    }
}

impl DmaChannel for AxiDma {
    fn start(&mut self, buffer: &mut DmaBuffer) -> Result<(), Error> {
        if self.in_flight {
            return Err(Error::ChannelBusy);
        }
        let bytes = buffer.size_bytes();
        if bytes > MAX_TRANSFER_BYTES {
            return Err(Error::TransferTooLarge {
                bytes,
                max: MAX_TRANSFER_BYTES,
            });
        }
        self.run()?;
        let addr = buffer.phys_addr();
        self.registers.s2mm_da.set(addr as u32);
        self.registers.s2mm_da_msb.set((addr >> 32) as u32);
        // writing the length starts the transfer
        self.registers.s2mm_length.set(bytes as u32);
        self.in_flight = true;
        tracing::trace!(addr, bytes, "S2MM transfer started");
        Ok(())
    }

    fn poll_done(&mut self) -> Result<bool, Error> {
        let status = self.status();
        if status & dmasr::ERROR_MASK != 0 {
            self.acknowledge(status);
            self.in_flight = false;
            return Err(Error::TransferFailed { status });
        }
        let done = status & dmasr::IDLE != 0;
        if done {
            self.acknowledge(status);
            self.in_flight = false;
        }
        Ok(done)
    }

    fn abort(&mut self) {
        self.registers.s2mm_dmacr.set(dmacr::RESET);
        let reset_done =
            (0..RESET_POLLS).any(|_| self.registers.s2mm_dmacr.get() & dmacr::RESET == 0);
        if !reset_done {
            tracing::warn!("AXI DMA soft reset did not complete");
        }
        self.registers.s2mm_dmacr.set(dmacr::RS);
        self.in_flight = false;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::buffer::{DmaAllocator, HeapAllocator};

    #[test]
    fn start_programs_address_and_length() {
        let mut dma = AxiDma::in_memory();
        let mut buffer = HeapAllocator::new(128).allocate(128).unwrap();
        dma.start(&mut buffer).unwrap();
        let addr = buffer.phys_addr();
        assert_eq!(dma.registers.s2mm_da.get(), addr as u32);
        assert_eq!(dma.registers.s2mm_da_msb.get(), (addr >> 32) as u32);
        assert_eq!(dma.registers.s2mm_length.get(), 256);
        assert!(!dma.poll_done().unwrap());
        // a second transfer cannot be started while the first is in flight
        assert!(matches!(dma.start(&mut buffer), Err(Error::ChannelBusy)));
        dma.registers.s2mm_dmasr.set(dmasr::IDLE);
        assert!(dma.poll_done().unwrap());
        dma.start(&mut buffer).unwrap();
    }

    #[test]
    fn error_status() {
        let mut dma = AxiDma::in_memory();
        let mut buffer = HeapAllocator::new(16).allocate(16).unwrap();
        dma.start(&mut buffer).unwrap();
        dma.registers
            .s2mm_dmasr
            .set(dmasr::IDLE | dmasr::DMA_SLV_ERR);
        match dma.poll_done() {
            Err(Error::TransferFailed { status }) => {
                assert_eq!(status, dmasr::IDLE | dmasr::DMA_SLV_ERR)
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn completion_is_acknowledged() {
        let mut dma = AxiDma::in_memory();
        let mut buffer = HeapAllocator::new(16).allocate(16).unwrap();
        dma.start(&mut buffer).unwrap();
        // the interrupt bit alone does not complete the transfer
        dma.registers.s2mm_dmasr.set(dmasr::IOC_IRQ);
        assert!(!dma.poll_done().unwrap());
        dma.registers.s2mm_dmasr.set(dmasr::IDLE | dmasr::IOC_IRQ);
        assert!(dma.poll_done().unwrap());
        // the in-memory register keeps the value written to clear the bit
        assert_eq!(dma.registers.s2mm_dmasr.get(), dmasr::IOC_IRQ);

        dma.start(&mut buffer).unwrap();
        dma.registers
            .s2mm_dmasr
            .set(dmasr::DMA_DEC_ERR | dmasr::ERR_IRQ);
        assert!(dma.poll_done().is_err());
        assert_eq!(dma.registers.s2mm_dmasr.get(), dmasr::ERR_IRQ);
    }

    #[test]
    fn halted_channel() {
        let mut dma = AxiDma::in_memory();
        let mut buffer = HeapAllocator::new(16).allocate(16).unwrap();
        // nothing clears the halted bit of the in-memory register block
        dma.registers.s2mm_dmasr.set(dmasr::HALTED);
        assert!(matches!(dma.start(&mut buffer), Err(Error::ChannelHalted)));
        assert_eq!(dma.registers.s2mm_dmacr.get() & dmacr::RS, dmacr::RS);
    }

    #[test]
    fn abort_restarts_channel() {
        let mut dma = AxiDma::in_memory();
        let mut buffer = HeapAllocator::new(16).allocate(16).unwrap();
        dma.start(&mut buffer).unwrap();
        dma.abort();
        // the in-memory reset bit never self-clears; the channel is still
        // set to run afterwards
        assert_eq!(dma.registers.s2mm_dmacr.get(), dmacr::RS);
        dma.start(&mut buffer).unwrap();
    }
}

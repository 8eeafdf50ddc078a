//! Data inspector driver.
//!
//! [`Inspector`] owns the control registers, the DMA channel and the
//! acquisition buffer of one data inspector instance, and captures frames.
//!
//! A capture follows a fixed register sequence:
//!
//! 1. Deassert `reset`.
//! 2. Start a DMA transfer of the whole acquisition buffer.
//! 3. Assert `enable`, which lets the core stream samples into the DMA.
//! 4. Wait for the transfer to complete, at most for the given timeout.
//! 5. Deassert `enable` and assert `reset`.
//!
//! Step 5 is done on every exit path, so the core is left in reset even when
//! the transfer fails or times out. A transfer that fails or times out is
//! aborted before returning.

use crate::buffer::{AcquisitionBuffer, DmaAllocator, DmaBuffer, UDmaBuf};
use crate::dma::{AxiDma, DmaChannel};
use crate::error::Error;
use crate::frame::{self, Frame, FRACTIONAL_BITS, MAX_FRACTIONAL_BITS};
use crate::registers::{ControlRegisters, Registers};
use crate::uio::Uio;
use anyhow::Context;
use std::time::Duration;

/// Default number of complex samples per frame.
pub const DEFAULT_PACKET_SIZE: u32 = 64;

/// Data inspector configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Number of complex samples per frame.
    pub packet_size: u32,
    /// Number of fractional bits of the fixed-point samples.
    pub fractional_bits: u32,
    /// Normalize each frame to its maximum sample.
    pub autoscale: bool,
    /// Interval at which the DMA channel is polled for completion.
    pub poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            packet_size: DEFAULT_PACKET_SIZE,
            fractional_bits: FRACTIONAL_BITS,
            autoscale: false,
            poll_interval: Duration::from_millis(1),
        }
    }
}

/// Data inspector.
#[derive(Debug)]
pub struct Inspector<R, D, A> {
    registers: R,
    dma: D,
    buffer: AcquisitionBuffer<A>,
    fractional_bits: u32,
    autoscale: bool,
    poll_interval: Duration,
    sequence: u64,
}

/// Data inspector on the FPGA.
pub type HardwareInspector = Inspector<Registers, AxiDma, UDmaBuf>;

impl HardwareInspector {
    /// Opens the data inspector on the FPGA.
    ///
    /// `inspector_uio` and `dma_uio` are the names of the UIO devices of the
    /// data inspector IP core and of the AXI DMA core, and `udmabuf` the name
    /// of the u-dma-buf device used for the acquisition buffer.
    pub async fn open(
        inspector_uio: &str,
        dma_uio: &str,
        udmabuf: &str,
        config: &Config,
    ) -> anyhow::Result<HardwareInspector> {
        let uio = Uio::from_name(inspector_uio)
            .await
            .context("failed to open data inspector UIO")?;
        let mapping = uio
            .map_mapping(0)
            .await
            .context("failed to map data inspector UIO")?;
        let phys_addr = uio.map_addr(0).await?;
        tracing::info!("opened data inspector IP core at physical address {phys_addr:#08x}");
        let dma = AxiDma::open(dma_uio).await?;
        let allocator = UDmaBuf::new(udmabuf)
            .await
            .context("failed to open u-dma-buf")?;
        Ok(Inspector::new(
            Registers::from_mapping(mapping),
            dma,
            allocator,
            config,
        )?)
    }
}

impl<R, D, A> Inspector<R, D, A>
where
    R: ControlRegisters,
    D: DmaChannel,
    A: DmaAllocator,
{
    /// Creates a data inspector.
    ///
    /// The core is put in reset with `enable` cleared, and a buffer for
    /// `config.packet_size` complex samples is allocated.
    pub fn new(
        mut registers: R,
        dma: D,
        allocator: A,
        config: &Config,
    ) -> Result<Inspector<R, D, A>, Error> {
        if config.packet_size == 0 {
            return Err(Error::InvalidPacketSize(0));
        }
        check_fractional_bits(config.fractional_bits)?;
        registers.set_enable(false);
        registers.set_reset(true);
        let mut buffer = AcquisitionBuffer::new(allocator);
        buffer.reshape(2 * config.packet_size as usize, &mut registers)?;
        Ok(Inspector {
            registers,
            dma,
            buffer,
            fractional_bits: config.fractional_bits,
            autoscale: config.autoscale,
            poll_interval: config.poll_interval,
            sequence: 0,
        })
    }

    /// Returns the packet size, as read from the `packetsize` register.
    pub fn packet_size(&self) -> u32 {
        self.registers.packet_size()
    }

    /// Sets the number of complex samples per frame.
    ///
    /// The acquisition buffer is reallocated. Zero and sizes that do not fit
    /// in the DMA memory are rejected without modifying the hardware.
    pub fn set_packet_size(&mut self, packet_size: u32) -> Result<(), Error> {
        let len = 2 * packet_size as usize;
        if packet_size == 0 || len > self.buffer.capacity() {
            return Err(Error::InvalidPacketSize(packet_size));
        }
        self.buffer.reshape(len, &mut self.registers)
    }

    /// Returns the maximum packet size supported by the DMA memory.
    pub fn max_packet_size(&self) -> u32 {
        u32::try_from(self.buffer.capacity() / 2).unwrap_or(u32::MAX)
    }

    /// Returns `true` if frames are normalized.
    pub fn autoscale(&self) -> bool {
        self.autoscale
    }

    /// Enables or disables frame normalization.
    pub fn set_autoscale(&mut self, autoscale: bool) {
        self.autoscale = autoscale;
    }

    /// Returns the number of fractional bits of the fixed-point samples.
    pub fn fractional_bits(&self) -> u32 {
        self.fractional_bits
    }

    /// Sets the number of fractional bits of the fixed-point samples.
    ///
    /// Applies to the frames captured after this call.
    pub fn set_fractional_bits(&mut self, fractional_bits: u32) -> Result<(), Error> {
        check_fractional_bits(fractional_bits)?;
        self.fractional_bits = fractional_bits;
        Ok(())
    }

    /// Gives access to the control registers.
    pub fn registers(&self) -> &R {
        &self.registers
    }

    /// Captures a frame.
    ///
    /// The transfer is given `timeout` to complete. On expiry the transfer is
    /// aborted and [`Error::TransferTimeout`] is returned.
    pub async fn capture_frame(&mut self, timeout: Duration) -> Result<Frame, Error> {
        let Inspector {
            registers,
            dma,
            buffer,
            fractional_bits,
            autoscale,
            poll_interval,
            sequence,
        } = self;
        let buffer = buffer.get_mut().ok_or(Error::BufferUnavailable)?;

        registers.set_reset(false);
        let transfer = transfer(registers, dma, buffer, *poll_interval, timeout).await;
        registers.set_enable(false);
        registers.set_reset(true);
        if let Err(error) = &transfer {
            tracing::warn!(%error, "frame capture failed");
        }
        transfer?;

        let mut samples = frame::decode(buffer.as_slice(), *fractional_bits);
        if *autoscale {
            frame::autoscale(&mut samples);
        }
        *sequence += 1;
        tracing::trace!(sequence = *sequence, len = samples.len(), "frame captured");
        Ok(Frame {
            sequence: *sequence,
            samples,
        })
    }
}

fn check_fractional_bits(fractional_bits: u32) -> Result<(), Error> {
    if fractional_bits > MAX_FRACTIONAL_BITS {
        return Err(Error::InvalidFractionalBits(fractional_bits));
    }
    Ok(())
}

async fn transfer<R: ControlRegisters, D: DmaChannel>(
    registers: &mut R,
    dma: &mut D,
    buffer: &mut DmaBuffer,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<(), Error> {
    dma.start(buffer)?;
    registers.set_enable(true);
    let wait = async {
        while !dma.poll_done()? {
            tokio::time::sleep(poll_interval).await;
        }
        Ok::<_, Error>(())
    };
    let result = match tokio::time::timeout(timeout, wait).await {
        Ok(result) => result,
        Err(_) => Err(Error::TransferTimeout(timeout)),
    };
    if result.is_err() {
        dma.abort();
    }
    result
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::buffer::HeapAllocator;
    use crate::registers::Register;
    use crate::testing::{Behaviour, Event, Log, LoggedRegisters, TestDma};
    use num_complex::Complex;

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn inspector(
        behaviour: Behaviour,
        config: &Config,
    ) -> (Inspector<LoggedRegisters, TestDma, HeapAllocator>, Log) {
        let log = Log::default();
        let inspector = Inspector::new(
            LoggedRegisters::new(&log),
            TestDma::new(&log, behaviour),
            HeapAllocator::new(4096),
            config,
        )
        .unwrap();
        (inspector, log)
    }

    fn assert_idle(registers: &LoggedRegisters) {
        assert!(registers.reset());
        assert!(!registers.enable());
    }

    #[test]
    fn initial_state() {
        let (inspector, log) = inspector(Behaviour::Complete, &Config::default());
        assert_eq!(
            log.take(),
            vec![
                Event::Set(Register::Enable, 0),
                Event::Set(Register::Reset, 1),
                Event::Set(Register::PacketSize, 64),
            ]
        );
        assert_eq!(inspector.packet_size(), 64);
        assert_eq!(inspector.buffer.get().unwrap().len(), 128);
        assert_eq!(inspector.fractional_bits(), 14);
        assert_idle(inspector.registers());
    }

    #[test]
    fn zero_packet_size_rejected() {
        let config = Config {
            packet_size: 0,
            ..Default::default()
        };
        let log = Log::default();
        let result = Inspector::new(
            LoggedRegisters::new(&log),
            TestDma::new(&log, Behaviour::Complete),
            HeapAllocator::new(4096),
            &config,
        );
        assert!(matches!(result, Err(Error::InvalidPacketSize(0))));
        assert!(log.take().is_empty());
    }

    #[tokio::test]
    async fn capture_sequence() {
        let (mut inspector, log) = inspector(Behaviour::Complete, &Config::default());
        log.take();
        let frame = inspector.capture_frame(TIMEOUT).await.unwrap();
        assert_eq!(
            log.take(),
            vec![
                Event::Set(Register::Reset, 0),
                Event::Start(128),
                Event::Set(Register::Enable, 1),
                Event::Set(Register::Enable, 0),
                Event::Set(Register::Reset, 1),
            ]
        );
        assert_idle(inspector.registers());
        assert_eq!(frame.len(), 64);
        assert_eq!(frame.sequence, 1);
        let lsb = 1.0 / 16384.0;
        assert!(frame
            .samples
            .iter()
            .all(|&x| x == Complex::new(3.0 * lsb, -3.0 * lsb)));
        let frame = inspector.capture_frame(TIMEOUT).await.unwrap();
        assert_eq!(frame.sequence, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_leaves_core_in_reset() {
        let (mut inspector, log) = inspector(Behaviour::Stall, &Config::default());
        log.take();
        let start = tokio::time::Instant::now();
        let result = inspector.capture_frame(TIMEOUT).await;
        assert!(matches!(result, Err(Error::TransferTimeout(t)) if t == TIMEOUT));
        assert!(start.elapsed() >= TIMEOUT);
        assert_eq!(
            log.take(),
            vec![
                Event::Set(Register::Reset, 0),
                Event::Start(128),
                Event::Set(Register::Enable, 1),
                Event::Abort,
                Event::Set(Register::Enable, 0),
                Event::Set(Register::Reset, 1),
            ]
        );
        assert_idle(inspector.registers());
    }

    #[tokio::test]
    async fn transfer_error_aborts() {
        let (mut inspector, log) = inspector(Behaviour::Fail(0x10), &Config::default());
        log.take();
        let result = inspector.capture_frame(TIMEOUT).await;
        assert!(matches!(
            result,
            Err(Error::TransferFailed { status: 0x10 })
        ));
        assert!(log.take().contains(&Event::Abort));
        assert_idle(inspector.registers());
    }

    #[tokio::test]
    async fn refused_start_never_enables() {
        let (mut inspector, log) = inspector(Behaviour::Refuse, &Config::default());
        log.take();
        let result = inspector.capture_frame(TIMEOUT).await;
        assert!(matches!(result, Err(Error::ChannelHalted)));
        assert_eq!(
            log.take(),
            vec![
                Event::Set(Register::Reset, 0),
                Event::Set(Register::Enable, 0),
                Event::Set(Register::Reset, 1),
            ]
        );
    }

    #[tokio::test]
    async fn reshape_then_capture() {
        let (mut inspector, log) = inspector(Behaviour::Complete, &Config::default());
        inspector.set_packet_size(16).unwrap();
        assert_eq!(inspector.packet_size(), 16);
        log.take();
        let frame = inspector.capture_frame(TIMEOUT).await.unwrap();
        assert_eq!(frame.len(), 16);
        assert!(log.take().contains(&Event::Start(32)));
    }

    #[test]
    fn invalid_packet_sizes() {
        let (mut inspector, log) = inspector(Behaviour::Complete, &Config::default());
        log.take();
        assert_eq!(inspector.max_packet_size(), 2048);
        assert!(matches!(
            inspector.set_packet_size(0),
            Err(Error::InvalidPacketSize(0))
        ));
        assert!(matches!(
            inspector.set_packet_size(2049),
            Err(Error::InvalidPacketSize(2049))
        ));
        assert!(log.take().is_empty());
        assert_eq!(inspector.packet_size(), 64);
        inspector.set_packet_size(2048).unwrap();
    }

    #[tokio::test]
    async fn fractional_bits() {
        let (mut inspector, log) = inspector(Behaviour::Complete, &Config::default());
        assert!(matches!(
            inspector.set_fractional_bits(16),
            Err(Error::InvalidFractionalBits(16))
        ));
        assert_eq!(inspector.fractional_bits(), 14);
        inspector.set_fractional_bits(8).unwrap();
        log.take();
        let frame = inspector.capture_frame(TIMEOUT).await.unwrap();
        assert_eq!(frame.samples[0], Complex::new(3.0 / 256.0, -3.0 / 256.0));
        // only the decoding changes, not the register sequence
        assert_eq!(log.take().len(), 5);
    }

    #[tokio::test]
    async fn autoscale() {
        let config = Config {
            autoscale: true,
            ..Default::default()
        };
        let (mut inspector, _log) = inspector(Behaviour::Complete, &config);
        let frame = inspector.capture_frame(TIMEOUT).await.unwrap();
        assert!(frame
            .samples
            .iter()
            .all(|x| (x.norm() - 1.0).abs() < 1e-12));
        inspector.set_autoscale(false);
        let frame = inspector.capture_frame(TIMEOUT).await.unwrap();
        assert!(frame.samples[0].norm() < 1e-3);
    }
}

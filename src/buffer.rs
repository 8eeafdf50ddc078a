//! Acquisition buffer.
//!
//! The acquisition buffer is the DMA destination of the data inspector. It
//! holds `2 * packetsize` signed 16-bit values (interleaved I and Q) and is
//! reallocated whenever the packet size changes.
//!
//! DMA-capable memory is obtained from a [u-dma-buf] kernel device, which
//! provides a physically contiguous region that can be memory mapped. The
//! device is opened with `O_SYNC`, which makes the CPU mapping uncached, so
//! the samples written by the DMA are visible without cache maintenance.
//!
//! [u-dma-buf]: https://github.com/ikwzm/udmabuf

use crate::error::Error;
use crate::registers::ControlRegisters;
use anyhow::Context;
use std::os::unix::io::{AsRawFd, OwnedFd};

/// DMA buffer of signed 16-bit samples.
///
/// Dropping the buffer releases its memory.
#[derive(Debug)]
pub struct DmaBuffer {
    samples: *mut i16,
    len: usize,
    phys_addr: u64,
    backing: Backing,
}

#[derive(Debug)]
enum Backing {
    Mapped { base: *mut libc::c_void, map_size: usize },
    Heap(#[allow(dead_code)] Box<[i16]>),
}

unsafe impl Send for DmaBuffer {}

impl DmaBuffer {
    /// Number of 16-bit values in the buffer.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the buffer has no samples.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size of the buffer in bytes.
    pub fn size_bytes(&self) -> usize {
        self.len * std::mem::size_of::<i16>()
    }

    /// Physical (bus) address of the buffer, as seen by the DMA.
    pub fn phys_addr(&self) -> u64 {
        self.phys_addr
    }

    /// Returns the contents of the buffer.
    ///
    /// The contents are only meaningful after a transfer into the buffer has
    /// completed.
    pub fn as_slice(&self) -> &[i16] {
        unsafe { std::slice::from_raw_parts(self.samples, self.len) }
    }

    /// Returns the contents of the buffer for writing.
    pub fn as_mut_slice(&mut self) -> &mut [i16] {
        unsafe { std::slice::from_raw_parts_mut(self.samples, self.len) }
    }
}

impl Drop for DmaBuffer {
    fn drop(&mut self) {
        if let Backing::Mapped { base, map_size } = self.backing {
            unsafe {
                libc::munmap(base, map_size);
            }
        }
    }
}

/// Allocator of DMA buffers.
pub trait DmaAllocator: Send {
    /// Allocates a buffer of `len` 16-bit values.
    fn allocate(&mut self, len: usize) -> Result<DmaBuffer, Error>;

    /// Maximum number of 16-bit values that can be allocated.
    fn capacity(&self) -> usize;
}

/// u-dma-buf device.
///
/// Only one buffer can be allocated at a time, since every buffer maps the
/// start of the device memory. The [`AcquisitionBuffer`] always releases the
/// previous buffer before allocating a new one.
#[derive(Debug)]
pub struct UDmaBuf {
    fd: OwnedFd,
    phys_addr: u64,
    size: usize,
}

impl UDmaBuf {
    /// Opens a u-dma-buf device.
    ///
    /// The name corresponds to the filename of the character device in
    /// `/dev`, for instance `udmabuf0`.
    pub async fn new(name: &str) -> anyhow::Result<UDmaBuf> {
        let file = tokio::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(format!("/dev/{name}"))
            .await
            .with_context(|| format!("failed to open /dev/{name}"))?;
        let sysfs = format!("/sys/class/u-dma-buf/{name}");
        let phys_addr = crate::uio::parse_hex(
            &tokio::fs::read_to_string(format!("{sysfs}/phys_addr")).await?,
        )? as u64;
        let size = tokio::fs::read_to_string(format!("{sysfs}/size"))
            .await?
            .trim_end()
            .parse::<usize>()?;
        tracing::info!(
            "opened u-dma-buf {name} with {size} bytes at physical address {phys_addr:#08x}"
        );
        Ok(UDmaBuf {
            fd: file.into_std().await.into(),
            phys_addr,
            size,
        })
    }
}

impl DmaAllocator for UDmaBuf {
    fn allocate(&mut self, len: usize) -> Result<DmaBuffer, Error> {
        let bytes = len * std::mem::size_of::<i16>();
        if len == 0 || bytes > self.size {
            return Err(Error::Allocation {
                length: len,
                reason: format!("u-dma-buf size is {} bytes", self.size),
            });
        }
        let map_size = bytes.next_multiple_of(page_size::get());
        let base = unsafe {
            libc::mmap(
                std::ptr::null_mut::<libc::c_void>(),
                map_size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                self.fd.as_raw_fd(),
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(Error::Allocation {
                length: len,
                reason: std::io::Error::last_os_error().to_string(),
            });
        }
        Ok(DmaBuffer {
            samples: base as *mut i16,
            len,
            phys_addr: self.phys_addr,
            backing: Backing::Mapped { base, map_size },
        })
    }

    fn capacity(&self) -> usize {
        self.size / std::mem::size_of::<i16>()
    }
}

/// Allocator of buffers in ordinary memory.
///
/// These buffers cannot be the target of a hardware DMA. They are used by the
/// simulated peripheral. The physical address reported is the virtual
/// address of the buffer.
#[derive(Debug, Clone)]
pub struct HeapAllocator {
    capacity: usize,
}

impl HeapAllocator {
    /// Creates an allocator that hands out buffers of up to `capacity`
    /// 16-bit values.
    pub fn new(capacity: usize) -> HeapAllocator {
        HeapAllocator { capacity }
    }
}

impl DmaAllocator for HeapAllocator {
    fn allocate(&mut self, len: usize) -> Result<DmaBuffer, Error> {
        if len == 0 || len > self.capacity {
            return Err(Error::Allocation {
                length: len,
                reason: format!("capacity is {} samples", self.capacity),
            });
        }
        let mut memory = vec![0i16; len].into_boxed_slice();
        let samples = memory.as_mut_ptr();
        Ok(DmaBuffer {
            samples,
            len,
            phys_addr: samples as u64,
            backing: Backing::Heap(memory),
        })
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Acquisition buffer manager.
///
/// Owns the allocator and the buffer currently used as DMA destination.
#[derive(Debug)]
pub struct AcquisitionBuffer<A> {
    allocator: A,
    buffer: Option<DmaBuffer>,
}

impl<A: DmaAllocator> AcquisitionBuffer<A> {
    /// Creates a buffer manager with no buffer allocated.
    pub fn new(allocator: A) -> AcquisitionBuffer<A> {
        AcquisitionBuffer {
            allocator,
            buffer: None,
        }
    }

    /// Allocates a buffer of `len` 16-bit values.
    ///
    /// Any previously held buffer is released first.
    pub fn allocate(&mut self, len: usize) -> Result<&mut DmaBuffer, Error> {
        // release before allocating, since u-dma-buf can only hold one buffer
        self.buffer = None;
        let buffer = self.allocator.allocate(len)?;
        Ok(self.buffer.insert(buffer))
    }

    /// Replaces the buffer by one of `len` 16-bit values and updates the
    /// `packetsize` register to the number of complex samples that it holds.
    ///
    /// `len` is validated before anything is released or written to the
    /// hardware. If the allocation itself fails, the manager is left without
    /// a buffer and the register is not modified.
    pub fn reshape<R: ControlRegisters>(
        &mut self,
        len: usize,
        registers: &mut R,
    ) -> Result<(), Error> {
        let packet_size = u32::try_from(len / 2)
            .map_err(|_| Error::InvalidPacketSize(u32::MAX))?;
        if len == 0 || len % 2 != 0 || len > self.allocator.capacity() {
            return Err(Error::InvalidPacketSize(packet_size));
        }
        self.allocate(len)?;
        registers.set_packet_size(packet_size);
        tracing::debug!(packet_size, "acquisition buffer reshaped");
        Ok(())
    }

    /// Returns the current buffer, if any.
    pub fn get(&self) -> Option<&DmaBuffer> {
        self.buffer.as_ref()
    }

    /// Returns the current buffer for use as DMA destination.
    pub fn get_mut(&mut self) -> Option<&mut DmaBuffer> {
        self.buffer.as_mut()
    }

    /// Maximum number of 16-bit values that a buffer can hold.
    pub fn capacity(&self) -> usize {
        self.allocator.capacity()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::registers::Registers;

    #[test]
    fn reshape_sets_length_and_packet_size() {
        let mut registers = Registers::in_memory();
        let mut buffer = AcquisitionBuffer::new(HeapAllocator::new(1 << 16));
        for n in [1, 2, 64, 1000, 1 << 15] {
            buffer.reshape(2 * n, &mut registers).unwrap();
            assert_eq!(buffer.get().unwrap().len(), 2 * n);
            assert_eq!(registers.packet_size(), n as u32);
        }
    }

    #[test]
    fn reshape_rejects_before_touching_registers() {
        let mut registers = Registers::in_memory();
        let mut buffer = AcquisitionBuffer::new(HeapAllocator::new(256));
        buffer.reshape(128, &mut registers).unwrap();
        assert!(matches!(
            buffer.reshape(0, &mut registers),
            Err(Error::InvalidPacketSize(0))
        ));
        assert!(matches!(
            buffer.reshape(512, &mut registers),
            Err(Error::InvalidPacketSize(256))
        ));
        assert!(matches!(
            buffer.reshape(7, &mut registers),
            Err(Error::InvalidPacketSize(3))
        ));
        // the previous buffer and register value are kept
        assert_eq!(buffer.get().unwrap().len(), 128);
        assert_eq!(registers.packet_size(), 64);
    }

    #[test]
    fn reshape_releases_previous_buffer() {
        let mut registers = Registers::in_memory();
        let mut buffer = AcquisitionBuffer::new(HeapAllocator::new(1024));
        buffer.reshape(128, &mut registers).unwrap();
        buffer.get_mut().unwrap().as_mut_slice().fill(7);
        buffer.reshape(256, &mut registers).unwrap();
        let new = buffer.get().unwrap();
        assert_eq!(new.len(), 256);
        assert!(new.as_slice().iter().all(|&x| x == 0));
    }

    #[test]
    fn heap_allocation_failure() {
        let mut allocator = HeapAllocator::new(16);
        assert!(matches!(
            allocator.allocate(32),
            Err(Error::Allocation { length: 32, .. })
        ));
        assert!(allocator.allocate(0).is_err());
        let buffer = allocator.allocate(16).unwrap();
        assert_eq!(buffer.size_bytes(), 32);
        assert!(!buffer.is_empty());
    }
}

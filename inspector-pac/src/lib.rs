//! inspector-pac describes the memory layout of the FPGA peripherals used by
//! the RFSoC data inspector: the data inspector IP core control block and the
//! receive (S2MM) channel of the Xilinx AXI DMA core that moves its samples
//! into host memory.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

/// Data inspector IP core.
pub mod data_inspector {
    use vcell::VolatileCell;

    /// Register block of the data inspector IP core.
    #[repr(C)]
    pub struct RegisterBlock {
        /// Reset register (offset 0x0).
        ///
        /// Writing 1 holds the core in reset.
        pub reset: VolatileCell<u32>,
        /// Enable register (offset 0x4).
        ///
        /// Writing 1 lets the core stream samples into the DMA.
        pub enable: VolatileCell<u32>,
        /// Packet size register (offset 0x8).
        ///
        /// Number of complex samples (I/Q pairs) in each packet sent to the
        /// DMA.
        pub packetsize: VolatileCell<u32>,
    }

    impl Default for RegisterBlock {
        fn default() -> RegisterBlock {
            RegisterBlock {
                reset: VolatileCell::new(0),
                enable: VolatileCell::new(0),
                packetsize: VolatileCell::new(0),
            }
        }
    }
}

/// Xilinx AXI DMA (PG021), simple mode, S2MM channel only.
pub mod axi_dma {
    use vcell::VolatileCell;

    /// Register block of the AXI DMA core.
    ///
    /// The MM2S registers are not used and are left reserved.
    #[repr(C)]
    pub struct RegisterBlock {
        _reserved0: [u32; 12],
        /// S2MM DMA control register (offset 0x30).
        pub s2mm_dmacr: VolatileCell<u32>,
        /// S2MM DMA status register (offset 0x34).
        pub s2mm_dmasr: VolatileCell<u32>,
        _reserved1: [u32; 4],
        /// S2MM destination address, lower 32 bits (offset 0x48).
        pub s2mm_da: VolatileCell<u32>,
        /// S2MM destination address, upper 32 bits (offset 0x4c).
        pub s2mm_da_msb: VolatileCell<u32>,
        _reserved2: [u32; 2],
        /// S2MM buffer length in bytes (offset 0x58).
        ///
        /// Writing this register starts the transfer.
        pub s2mm_length: VolatileCell<u32>,
    }

    impl Default for RegisterBlock {
        fn default() -> RegisterBlock {
            RegisterBlock {
                _reserved0: [0; 12],
                s2mm_dmacr: VolatileCell::new(0),
                s2mm_dmasr: VolatileCell::new(0),
                _reserved1: [0; 4],
                s2mm_da: VolatileCell::new(0),
                s2mm_da_msb: VolatileCell::new(0),
                _reserved2: [0; 2],
                s2mm_length: VolatileCell::new(0),
            }
        }
    }

    /// Bits of the S2MM DMA control register.
    pub mod dmacr {
        /// Run/stop.
        pub const RS: u32 = 1 << 0;
        /// Soft reset. Self-clearing once the reset has completed.
        pub const RESET: u32 = 1 << 2;
    }

    /// Bits of the S2MM DMA status register.
    pub mod dmasr {
        /// Channel halted.
        pub const HALTED: u32 = 1 << 0;
        /// Channel idle. Set when the programmed length has been transferred.
        pub const IDLE: u32 = 1 << 1;
        /// DMA internal error.
        pub const DMA_INT_ERR: u32 = 1 << 4;
        /// DMA slave error.
        pub const DMA_SLV_ERR: u32 = 1 << 5;
        /// DMA decode error.
        pub const DMA_DEC_ERR: u32 = 1 << 6;
        /// Interrupt on complete. Write 1 to clear.
        pub const IOC_IRQ: u32 = 1 << 12;
        /// Error interrupt. Write 1 to clear.
        pub const ERR_IRQ: u32 = 1 << 14;
        /// Any of the error bits.
        pub const ERROR_MASK: u32 = DMA_INT_ERR | DMA_SLV_ERR | DMA_DEC_ERR;
    }
}

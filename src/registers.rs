//! Data inspector control registers.
//!
//! The IP core has three 32-bit registers. [`Register`] gives the fixed table
//! of names and byte offsets, and [`ControlRegisters`] the access methods.
//! Every access goes to the hardware; nothing is cached.

use crate::uio::Mapping;
use inspector_pac::data_inspector::RegisterBlock;
use vcell::VolatileCell;

/// Data inspector register.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Register {
    /// Holds the core in reset when 1.
    Reset,
    /// Lets the core stream samples when 1.
    Enable,
    /// Number of complex samples per packet.
    PacketSize,
}

impl Register {
    /// All the registers, in address order.
    pub const ALL: [Register; 3] = [Register::Reset, Register::Enable, Register::PacketSize];

    /// Byte offset of the register in the IP core address space.
    pub const fn offset(self) -> usize {
        match self {
            Register::Reset => 0x0,
            Register::Enable => 0x4,
            Register::PacketSize => 0x8,
        }
    }

    /// Name of the register.
    pub const fn name(self) -> &'static str {
        match self {
            Register::Reset => "reset",
            Register::Enable => "enable",
            Register::PacketSize => "packetsize",
        }
    }
}

impl std::str::FromStr for Register {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        Register::ALL
            .into_iter()
            .find(|r| r.name() == s)
            .ok_or(())
    }
}

impl std::fmt::Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        f.write_str(self.name())
    }
}

macro_rules! bit_accessors {
    ($($reg:ident => $variant:ident),*) => {
        paste::paste! {
            $(
                #[doc = concat!("Returns `true` if the `", stringify!($reg),
                                "` register is asserted.")]
                fn $reg(&self) -> bool {
                    self.get(Register::$variant) & 1 != 0
                }

                #[doc = concat!("Asserts or deasserts the `", stringify!($reg),
                                "` register.")]
                fn [<set_ $reg>](&mut self, value: bool) {
                    self.set(Register::$variant, u32::from(value))
                }
            )*
        }
    };
}

/// Access to the data inspector control registers.
pub trait ControlRegisters: Send {
    /// Reads a register.
    fn get(&self, register: Register) -> u32;

    /// Writes a register.
    fn set(&mut self, register: Register, value: u32);

    bit_accessors!(reset => Reset, enable => Enable);

    /// Returns the value of the `packetsize` register.
    fn packet_size(&self) -> u32 {
        self.get(Register::PacketSize)
    }

    /// Writes the `packetsize` register.
    ///
    /// The value is not validated.
    fn set_packet_size(&mut self, value: u32) {
        self.set(Register::PacketSize, value)
    }
}

/// Backing memory of a register block.
///
/// Register blocks are normally the memory mapping of an UIO device. An owned
/// block in ordinary memory is used to run without hardware.
#[derive(Debug)]
pub(crate) enum RegisterMemory<T> {
    Mapped(Mapping),
    Owned(Box<T>),
}

impl<T> std::ops::Deref for RegisterMemory<T> {
    type Target = T;
    fn deref(&self) -> &T {
        match self {
            RegisterMemory::Mapped(mapping) => unsafe { &*(mapping.addr() as *const T) },
            RegisterMemory::Owned(block) => block,
        }
    }
}

unsafe impl<T: Send> Send for RegisterMemory<T> {}

/// Data inspector IP core registers.
pub struct Registers(RegisterMemory<RegisterBlock>);

impl Registers {
    /// Creates the registers from the mapping of the IP core UIO device.
    pub fn from_mapping(mapping: Mapping) -> Registers {
        Registers(RegisterMemory::Mapped(mapping))
    }

    /// Creates a register block in ordinary memory.
    pub fn in_memory() -> Registers {
        Registers(RegisterMemory::Owned(Box::default()))
    }

    fn cell(&self, register: Register) -> &VolatileCell<u32> {
        match register {
            Register::Reset => &self.0.reset,
            Register::Enable => &self.0.enable,
            Register::PacketSize => &self.0.packetsize,
        }
    }
}

impl std::fmt::Debug for Registers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        f.debug_struct("Registers")
            .field("reset", &self.get(Register::Reset))
            .field("enable", &self.get(Register::Enable))
            .field("packetsize", &self.get(Register::PacketSize))
            .finish()
    }
}

impl ControlRegisters for Registers {
    fn get(&self, register: Register) -> u32 {
        self.cell(register).get()
    }

    fn set(&mut self, register: Register, value: u32) {
        tracing::trace!(%register, offset = register.offset(), value, "register write");
        self.cell(register).set(value)
    }
}

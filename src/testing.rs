//! Test doubles that record the hardware accesses of the driver.

use crate::acquisition::Acquisition;
use crate::app::AppState;
use crate::buffer::DmaBuffer;
use crate::dma::DmaChannel;
use crate::error::Error;
use crate::inspector::Config;
use crate::presentation::PresentationConfig;
use crate::refresh::RefreshControl;
use crate::registers::{ControlRegisters, Register, Registers};
use crate::sim::{self, SimulatedDma};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Set(Register, u32),
    Start(usize),
    Abort,
}

#[derive(Debug, Clone, Default)]
pub struct Log(Arc<Mutex<Vec<Event>>>);

impl Log {
    pub fn push(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }

    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut self.0.lock().unwrap())
    }
}

#[derive(Debug)]
pub struct LoggedRegisters {
    registers: Registers,
    log: Log,
}

impl LoggedRegisters {
    pub fn new(log: &Log) -> LoggedRegisters {
        LoggedRegisters {
            registers: Registers::in_memory(),
            log: log.clone(),
        }
    }
}

impl ControlRegisters for LoggedRegisters {
    fn get(&self, register: Register) -> u32 {
        self.registers.get(register)
    }

    fn set(&mut self, register: Register, value: u32) {
        self.log.push(Event::Set(register, value));
        self.registers.set(register, value);
    }
}

#[derive(Debug, Copy, Clone)]
pub enum Behaviour {
    Complete,
    Stall,
    Fail(u32),
    Refuse,
}

/// DMA channel that fills the buffer with `3, -3, 3, -3, ...`.
#[derive(Debug)]
pub struct TestDma {
    log: Log,
    behaviour: Behaviour,
}

impl TestDma {
    pub fn new(log: &Log, behaviour: Behaviour) -> TestDma {
        TestDma {
            log: log.clone(),
            behaviour,
        }
    }
}

impl DmaChannel for TestDma {
    fn start(&mut self, buffer: &mut DmaBuffer) -> Result<(), Error> {
        if let Behaviour::Refuse = self.behaviour {
            return Err(Error::ChannelHalted);
        }
        self.log.push(Event::Start(buffer.len()));
        for (n, x) in buffer.as_mut_slice().iter_mut().enumerate() {
            *x = if n % 2 == 0 { 3 } else { -3 };
        }
        Ok(())
    }

    fn poll_done(&mut self) -> Result<bool, Error> {
        match self.behaviour {
            Behaviour::Complete | Behaviour::Refuse => Ok(true),
            Behaviour::Stall => Ok(false),
            Behaviour::Fail(status) => Err(Error::TransferFailed { status }),
        }
    }

    fn abort(&mut self) {
        self.log.push(Event::Abort);
    }
}

/// Application state on the simulated peripheral, with the periodic refresh
/// stopped. Spawns the acquisition task, so it must be called within a
/// runtime.
pub fn app_state() -> AppState {
    let inspector = sim::inspector(SimulatedDma::new(Duration::ZERO), 4096, &Config::default())
        .unwrap();
    let (acquisition, handle) = Acquisition::new(inspector, Duration::from_secs(1)).unwrap();
    tokio::spawn(acquisition.run());
    AppState::new(
        handle,
        RefreshControl::new(Duration::from_millis(500), false).unwrap(),
        PresentationConfig::new(100e3, 1.0).unwrap(),
    )
}

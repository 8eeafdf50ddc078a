//! rfsoc-inspector drives the data inspector IP core of an RFSoC design. The
//! data inspector streams a packet of 16-bit fixed-point IQ samples into
//! memory through an AXI DMA S2MM channel. This crate captures those packets
//! as frames of complex samples, optionally normalizes them, and delivers
//! them to consumers periodically.
//!
//! The application provides a RESTful API to control the capture and the
//! plotting settings, and streams the frames to clients in real time using
//! WebSockets. It can also run on a simulated peripheral, without the FPGA.

#![warn(missing_docs)]

pub mod acquisition;
pub mod app;
pub mod args;
pub mod buffer;
pub mod dma;
pub mod error;
pub mod frame;
pub mod httpd;
pub mod inspector;
pub mod presentation;
pub mod refresh;
pub mod registers;
pub mod sim;
pub mod uio;

#[cfg(test)]
mod testing;

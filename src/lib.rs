//! Interrupt-driven, half-duplex [bit banging] UART built on the
//! [`embedded-hal`] traits.
//!
//! [bit banging]: https://en.wikipedia.org/wiki/Bit_banging
//! [`embedded-hal`]: https://github.com/rust-embedded/embedded-hal
//!
//! For microcontrollers without a spare UART. The line runs 8N1 at a fixed
//! baud rate and is timed entirely by one timer compare channel; a falling
//! edge interrupt on the receive pin catches the start bit. Receive and
//! transmit take turns on the shared compare channel, so only one direction
//! is active at a time and at most one byte is in flight each way.
//!
//! - [`timing`]: bit period and sample offset for a clock/baud pair
//! - [`hal`]: the timer and edge-interrupt capabilities the driver needs
//! - [`frame`]: 8N1 shift registers
//! - [`serial`]: the interrupt handlers and the transmit entry point
//! - [`shared`]: critical-section handle for use from `static`s
//! - [`app`]: command table and echo loop

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

pub mod app;
pub mod frame;
pub mod hal;
pub mod serial;
pub mod shared;
pub mod timing;

#[cfg(test)]
mod testing;

pub use hal::{BitClock, EdgeInterrupt};
pub use serial::{Error, Event, Session, Transceiver};
pub use shared::SharedSerial;
pub use timing::{LineTiming, BIT_TIME, HALF_BIT_TIME};

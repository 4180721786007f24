//! Connection lifecycle core of the LED Button Service peripheral.
//!
//! Everything that decides *what* the firmware does over BLE lives here:
//! advertising state, the single connection slot, link parameter
//! negotiation, button notifications and event routing. None of it touches
//! hardware, so it builds for the nRF52840 and for the host alike.
//!
//! Usage: `cargo test` (unit tests next to each module, end-to-end
//! scenarios in `tests/integration.rs`).
//!
//! Note: The embedded binary (`src/main.rs`, feature `embedded`) wires this
//! library to the SoftDevice, the GATT server and the board's LEDs and
//! buttons.

#![cfg_attr(not(test), no_std)]

// Must come first so the logging macros are visible to every module.
#[macro_use]
mod fmt;

pub mod ble;
pub mod config;
pub mod error;

pub use error::{DispatchError, Error};

//! Application-wide constants and compile-time configuration.
//!
//! All advertising parameters, link negotiation targets, and GATT
//! identifiers live here so they can be tuned in one place.

// Advertising

/// Complete local name carried in the advertising payload.
pub const DEVICE_NAME: &str = "Nordic_Peripheral";

/// Longest name that fits a legacy advertising payload next to the flags
/// structure: 31 - 3 (flags AD) - 2 (name AD header).
pub const DEVICE_NAME_MAX_LEN: usize = 26;

/// AD flags: LE General Discoverable (0x02) | BR/EDR Not Supported (0x04).
pub const ADV_FLAGS: u8 = 0x06;

/// Advertising interval range (in 0.625 ms units).
/// 0x30 = 30 ms, 0x60 = 60 ms (the stack's "fast interval 1" pair).
pub const ADV_INTERVAL_MIN: u16 = 0x30;
pub const ADV_INTERVAL_MAX: u16 = 0x60;

/// Restart connectable advertising once the connection slot is free again.
pub const ADV_AUTO_RESUME: bool = true;

// GATT - LED Button Service

/// LED Button Service UUID, `00001523-1212-efde-1523-785feabcd123`.
pub const LBS_SERVICE_UUID: u128 = 0x0000_1523_1212_efde_1523_785f_eabc_d123;

/// Button state characteristic (read, notify), `00001524-...`.
pub const LBS_BUTTON_CHAR_UUID: u128 = 0x0000_1524_1212_efde_1523_785f_eabc_d123;

/// LED characteristic (write), `00001525-...`.
pub const LBS_LED_CHAR_UUID: u128 = 0x0000_1525_1212_efde_1523_785f_eabc_d123;

// Link negotiation

/// Preferred PHY bitmask for both directions (2 Mbps).
pub const PREFERRED_PHY: u8 = 0x02;

/// Largest link-layer payload the controller may send (octets).
pub const DATA_LEN_MAX: u16 = 251;

/// Largest link-layer transmission time (µs) matching `DATA_LEN_MAX` on the coded PHY.
pub const DATA_TIME_MAX: u16 = 17040;

/// ATT MTU requested in the exchange; also the SoftDevice `att_mtu` config.
pub const ATT_MTU_MAX: u16 = 247;

/// ATT MTU in effect before any exchange.
pub const ATT_MTU_DEFAULT: u16 = 23;

/// Fixed ATT header (opcode + attribute handle).
pub const ATT_HEADER_LEN: u16 = 3;

// GPIO pin assignments (nRF52840-DK defaults)
//
// These are logical names; actual `embassy_nrf::peripherals::*` types are
// selected in `main.rs`.  LEDs and buttons are active-low.
//
//   RUN_STATUS_LED        (LED1) → P0.13
//   CONNECTION_STATUS_LED (LED2) → P0.14
//   LBS LED               (LED3) → P0.15
//   USER_BUTTON        (BUTTON1) → P0.11

/// Bit of the user button in the driver's button-state bitmask.
pub const USER_BUTTON: u32 = 1 << 0;

/// Button debounce time (ms).
pub const BUTTON_DEBOUNCE_MS: u64 = 50;

/// Run-status LED blink half-period (ms).
pub const RUN_LED_BLINK_INTERVAL_MS: u64 = 1000;

/// Depth of the event queue between the SoftDevice / buttons and the dispatcher.
pub const EVENT_QUEUE_DEPTH: usize = 8;

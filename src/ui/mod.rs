//! Board I/O for the firmware binary - status LEDs and the user button.
//!
//! ## Components
//!
//! - **LEDs**: run status (LED1), connection status (LED2), LBS LED (LED3)
//! - **Button**: BUTTON1, reported through the LED Button Service

pub mod buttons;
pub mod leds;

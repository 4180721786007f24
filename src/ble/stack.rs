//! Host Bluetooth stack boundary.
//!
//! The radio, link layer and ATT/GATT engine are provided by the host stack
//! (the Nordic SoftDevice on target). This module defines the request side
//! of that boundary as the [`BleStack`] trait, plus the value types carried
//! by requests and by completion events.
//!
//! Every request is fire-and-continue: the method returns the stack's
//! synchronous verdict, and the outcome of the procedure arrives later as a
//! separate [`Event`](crate::ble::dispatcher::Event).

use crate::ble::advertising::AdvertisingConfig;
use crate::error::StackError;

/// Opaque connection handle assigned by the stack at connect time.
pub type ConnHandle = u16;

/// HCI status code carried by completion events.
pub type HciStatus = u8;

/// HCI "success" status.
pub const HCI_SUCCESS: HciStatus = 0x00;

/// HCI "remote user terminated connection".
pub const HCI_REMOTE_USER_TERMINATED: HciStatus = 0x13;

/// Physical-layer modulation of one link direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phy {
    NoPreference,
    M1,
    M2,
    Coded,
}

impl Phy {
    /// Decode the stack's PHY bitmask value (`0`, `1`, `2`, `4`).
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0x00 => Some(Phy::NoPreference),
            0x01 => Some(Phy::M1),
            0x02 => Some(Phy::M2),
            0x04 => Some(Phy::Coded),
            _ => None,
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            Phy::NoPreference => 0x00,
            Phy::M1 => 0x01,
            Phy::M2 => 0x02,
            Phy::Coded => 0x04,
        }
    }

    /// Human-readable name for logs.
    pub fn name(self) -> &'static str {
        match self {
            Phy::NoPreference => "No preferred PHY",
            Phy::M1 => "1M PHY",
            Phy::M2 => "2M PHY",
            Phy::Coded => "Coded PHY",
        }
    }
}

/// Preferred PHYs for a PHY update request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PhyPreference {
    pub tx: Phy,
    pub rx: Phy,
}

/// Link-layer data length request (TX side; the peer picks its own RX).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DataLengthParams {
    /// Maximum TX payload (octets).
    pub tx_max_len: u16,
    /// Maximum TX time (µs).
    pub tx_max_time: u16,
}

/// Data length in effect after a data length update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DataLengthInfo {
    pub tx_max_len: u16,
    pub tx_max_time: u16,
    pub rx_max_len: u16,
    pub rx_max_time: u16,
}

/// Link timing of a connection, in the stack's native units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnParams {
    /// Connection interval (1.25 ms units).
    pub interval: u16,
    /// Peripheral latency (connection events the peripheral may skip).
    pub latency: u16,
    /// Supervision timeout (10 ms units).
    pub timeout: u16,
}

impl ConnParams {
    pub fn interval_us(&self) -> u32 {
        u32::from(self.interval) * 1250
    }

    pub fn timeout_ms(&self) -> u32 {
        u32::from(self.timeout) * 10
    }
}

/// Requests this firmware makes of the host Bluetooth stack.
///
/// Implementations must not block: each call only submits the request.
pub trait BleStack {
    /// Begin connectable, undirected advertising.
    fn start_advertising(&mut self, config: &AdvertisingConfig) -> Result<(), StackError>;

    /// Cease advertising.
    fn stop_advertising(&mut self) -> Result<(), StackError>;

    /// Ask the controller to switch the link to the preferred PHYs.
    fn request_phy(&mut self, handle: ConnHandle, pref: PhyPreference) -> Result<(), StackError>;

    /// Ask the controller to raise the link-layer data length.
    fn request_data_length(
        &mut self,
        handle: ConnHandle,
        params: DataLengthParams,
    ) -> Result<(), StackError>;

    /// Start an ATT MTU exchange offering `mtu`.
    fn request_mtu(&mut self, handle: ConnHandle, mtu: u16) -> Result<(), StackError>;

    /// Send a notification on the button state characteristic.
    fn notify_button(&mut self, handle: ConnHandle, value: &[u8]) -> Result<(), StackError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phy_bits_decode() {
        assert_eq!(Phy::from_bits(0x02), Some(Phy::M2));
        assert_eq!(Phy::from_bits(0x04), Some(Phy::Coded));
        assert_eq!(Phy::from_bits(0x03), None);
        assert_eq!(Phy::M1.bits(), 0x01);
    }

    #[test]
    fn phy_names_for_logs() {
        assert_eq!(Phy::M2.name(), "2M PHY");
        assert_eq!(Phy::NoPreference.name(), "No preferred PHY");
    }

    #[test]
    fn conn_params_human_units() {
        // 24 * 1.25 ms = 30 ms, 400 * 10 ms = 4 s
        let p = ConnParams {
            interval: 24,
            latency: 0,
            timeout: 400,
        };
        assert_eq!(p.interval_us(), 30_000);
        assert_eq!(p.timeout_ms(), 4_000);
    }
}

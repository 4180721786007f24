//! Connectable advertising.
//!
//! [`AdvertisingConfig`] is built once at startup from [`crate::config`]
//! and never changes. [`AdvertisingController`] tracks whether the radio is
//! currently advertising so misuse (double start, stop while idle) is
//! reported instead of silently ignored.

use heapless::String;

use crate::ble::stack::BleStack;
use crate::config;
use crate::error::AdvertisingError;

/// Fixed advertising parameter set plus payload descriptors.
///
/// Payload bytes are encoded by the stack: the advertising data carries
/// `flags` and the complete local `name`, the scan response carries the
/// 128-bit `service_uuid`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdvertisingConfig {
    connectable: bool,
    use_identity: bool,
    interval_min: u16,
    interval_max: u16,
    flags: u8,
    name: String<{ config::DEVICE_NAME_MAX_LEN }>,
    service_uuid: u128,
}

impl AdvertisingConfig {
    /// The firmware's advertising set: connectable, identity address,
    /// 30-60 ms interval, LED Button Service UUID in the scan response.
    pub fn from_config() -> Self {
        Self::new(config::DEVICE_NAME, config::LBS_SERVICE_UUID)
    }

    /// Same parameter set with a custom name (truncated to the payload
    /// capacity) and service UUID.
    pub fn new(name: &str, service_uuid: u128) -> Self {
        let mut n: String<{ config::DEVICE_NAME_MAX_LEN }> = String::new();
        for c in name.chars() {
            if n.push(c).is_err() {
                break;
            }
        }
        Self {
            connectable: true,
            use_identity: true,
            interval_min: config::ADV_INTERVAL_MIN,
            interval_max: config::ADV_INTERVAL_MAX,
            flags: config::ADV_FLAGS,
            name: n,
            service_uuid,
        }
    }

    pub fn connectable(&self) -> bool {
        self.connectable
    }

    pub fn use_identity(&self) -> bool {
        self.use_identity
    }

    /// Minimum advertising interval (0.625 ms units).
    pub fn interval_min(&self) -> u16 {
        self.interval_min
    }

    /// Maximum advertising interval (0.625 ms units).
    pub fn interval_max(&self) -> u16 {
        self.interval_max
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Service UUID as carried on air (little-endian).
    pub fn service_uuid_le(&self) -> [u8; 16] {
        self.service_uuid.to_le_bytes()
    }
}

/// Starts and stops advertising; remembers the last configuration so
/// advertising can resume after a disconnect.
#[derive(Debug, Default)]
pub struct AdvertisingController {
    advertising: bool,
    config: Option<AdvertisingConfig>,
}

impl AdvertisingController {
    pub const fn new() -> Self {
        Self {
            advertising: false,
            config: None,
        }
    }

    /// Begin connectable, undirected advertising with `config`.
    pub fn start<S: BleStack>(
        &mut self,
        stack: &mut S,
        config: AdvertisingConfig,
    ) -> Result<(), AdvertisingError> {
        if self.advertising {
            warn!("Advertising already running");
            return Err(AdvertisingError::AlreadyAdvertising);
        }

        stack
            .start_advertising(&config)
            .map_err(AdvertisingError::StackRejected)?;

        info!(
            "Advertising started ({}, interval {}..{})",
            config.name(),
            config.interval_min(),
            config.interval_max()
        );
        self.advertising = true;
        self.config = Some(config);
        Ok(())
    }

    /// Cease advertising.
    pub fn stop<S: BleStack>(&mut self, stack: &mut S) -> Result<(), AdvertisingError> {
        if !self.advertising {
            return Err(AdvertisingError::NotAdvertising);
        }

        stack
            .stop_advertising()
            .map_err(AdvertisingError::StackRejected)?;

        info!("Advertising stopped");
        self.advertising = false;
        Ok(())
    }

    /// Start again with the configuration of the last successful `start`.
    /// Does nothing if advertising was never started.
    pub fn resume<S: BleStack>(&mut self, stack: &mut S) -> Result<(), AdvertisingError> {
        match self.config.take() {
            Some(config) => {
                let restore = config.clone();
                self.start(stack, config).inspect_err(|_| {
                    self.config = Some(restore);
                })
            }
            None => Ok(()),
        }
    }

    /// A central connected: the stack ends connectable advertising by itself.
    pub fn on_connected(&mut self) {
        if self.advertising {
            debug!("Advertising ended by connection");
        }
        self.advertising = false;
    }

    pub fn is_advertising(&self) -> bool {
        self.advertising
    }

    pub fn config(&self) -> Option<&AdvertisingConfig> {
        self.config.as_ref()
    }
}

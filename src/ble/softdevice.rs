//! SoftDevice S140 glue for the firmware binary.
//!
//! [`SoftdeviceStack`] implements [`BleStack`] on top of the raw SoftDevice
//! API. Requests are submitted synchronously from the dispatcher task:
//!
//! - advertising start/stop is handed to the advertising task via
//!   [`ADV_COMMANDS`], since `advertise_connectable` has to be awaited;
//! - PHY, data length and MTU requests call the `sd_*` functions directly
//!   and queue the [`Step`] for the link task of that connection;
//! - notifications go straight to `sd_ble_gatts_hvx`.
//!
//! The `nrf-softdevice` event loop consumes the PHY / data length / MTU
//! completion events and keeps their outcome private. The link task
//! therefore settles each accepted step once its time window has passed
//! ([`Event::StepSettled`]). No PHY, data length or MTU value is reported,
//! so the lifecycle core keeps the defaults for them.

use defmt::{debug, info, warn, Format};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Sender};
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer};
use nrf_softdevice::ble::advertisement_builder::{
    Flag, LegacyAdvertisementBuilder, LegacyAdvertisementPayload, ServiceList,
};
use nrf_softdevice::ble::{peripheral, Connection};
use nrf_softdevice::{raw, RawError};

use lbs_peripheral::ble::{
    AdvertisingConfig, BleStack, ConnHandle, ConnParams, DataLengthParams, Event, PhyPreference,
    Step,
};
use lbs_peripheral::config;
use lbs_peripheral::error::StackError;

/// Worst-case duration of one link procedure (a few connection events).
const PROCEDURE_WINDOW_MS: u64 = 500;

/// How often the link task samples the connection parameters.
const CONN_PARAMS_POLL_MS: u64 = 1000;

/// AD flag bit: LE General Discoverable mode.
const AD_FLAG_GENERAL_DISCOVERY: u8 = 0x02;

/// Advertising task input.
#[derive(Clone, Format)]
pub enum AdvCommand {
    Start(AdvertisingConfig),
    Stop,
}

pub static ADV_COMMANDS: Signal<CriticalSectionRawMutex, AdvCommand> = Signal::new();

/// Accepted negotiation steps awaiting their window, one entry per step.
pub static PROCEDURES: Channel<CriticalSectionRawMutex, (ConnHandle, Step), 3> = Channel::new();

pub struct SoftdeviceStack {
    button_value_handle: u16,
}

impl SoftdeviceStack {
    /// `button_value_handle` is the attribute handle of the button state
    /// characteristic value.
    pub fn new(button_value_handle: u16) -> Self {
        Self { button_value_handle }
    }

    fn queue(&self, handle: ConnHandle, step: Step) {
        if PROCEDURES.try_send((handle, step)).is_err() {
            warn!("Procedure queue full, {} settle lost", step);
        }
    }
}

impl BleStack for SoftdeviceStack {
    fn start_advertising(&mut self, config: &AdvertisingConfig) -> Result<(), StackError> {
        ADV_COMMANDS.signal(AdvCommand::Start(config.clone()));
        Ok(())
    }

    fn stop_advertising(&mut self) -> Result<(), StackError> {
        ADV_COMMANDS.signal(AdvCommand::Stop);
        Ok(())
    }

    fn request_phy(&mut self, handle: ConnHandle, pref: PhyPreference) -> Result<(), StackError> {
        let phys = raw::ble_gap_phys_t {
            tx_phys: pref.tx.bits(),
            rx_phys: pref.rx.bits(),
        };
        let ret = unsafe { raw::sd_ble_gap_phy_update(handle, &phys) };
        RawError::convert(ret).map_err(stack_error)?;

        self.queue(handle, Step::Phy);
        Ok(())
    }

    fn request_data_length(
        &mut self,
        handle: ConnHandle,
        params: DataLengthParams,
    ) -> Result<(), StackError> {
        // RX values 0: let the SoftDevice pick (BLE_GAP_DATA_LENGTH_AUTO).
        let dl = raw::ble_gap_data_length_params_t {
            max_tx_octets: params.tx_max_len,
            max_rx_octets: 0,
            max_tx_time_us: params.tx_max_time,
            max_rx_time_us: 0,
        };
        let mut limitation: raw::ble_gap_data_length_limitation_t = unsafe { core::mem::zeroed() };
        let ret = unsafe { raw::sd_ble_gap_data_length_update(handle, &dl, &mut limitation) };
        if let Err(e) = RawError::convert(ret) {
            debug!(
                "Data length limited: tx {} rx {} octets",
                limitation.tx_payload_limited_octets,
                limitation.rx_payload_limited_octets
            );
            return Err(stack_error(e));
        }

        self.queue(handle, Step::DataLength);
        Ok(())
    }

    fn request_mtu(&mut self, handle: ConnHandle, mtu: u16) -> Result<(), StackError> {
        let ret = unsafe { raw::sd_ble_gattc_exchange_mtu_request(handle, mtu) };
        RawError::convert(ret).map_err(stack_error)?;

        self.queue(handle, Step::Mtu);
        Ok(())
    }

    fn notify_button(&mut self, handle: ConnHandle, value: &[u8]) -> Result<(), StackError> {
        let mut len = value.len() as u16;
        let params = raw::ble_gatts_hvx_params_t {
            handle: self.button_value_handle,
            type_: raw::BLE_GATT_HVX_NOTIFICATION as u8,
            offset: 0,
            p_len: &mut len,
            p_data: value.as_ptr(),
        };
        let ret = unsafe { raw::sd_ble_gatts_hvx(handle, &params) };
        RawError::convert(ret).map_err(stack_error)
    }
}

fn stack_error(e: RawError) -> StackError {
    match e {
        RawError::Busy => StackError::Busy,
        RawError::InvalidParam => StackError::InvalidParams,
        RawError::InvalidState => StackError::InvalidState,
        RawError::Resources | RawError::NoMem => StackError::NoResources,
        RawError::BleInvalidConnHandle => StackError::InvalidHandle,
        RawError::BleNotEnabled => StackError::NotEnabled,
        RawError::BleGattsSysAttrMissing => StackError::NotSubscribed,
        e => StackError::Raw(e as u32),
    }
}

/// Connection timing as reported by the SoftDevice.
pub fn conn_params(p: &raw::ble_gap_conn_params_t) -> ConnParams {
    ConnParams {
        interval: p.max_conn_interval,
        latency: p.slave_latency,
        timeout: p.conn_sup_timeout,
    }
}

/// SoftDevice advertising parameters for `config`. The SoftDevice takes a
/// single interval, so the fastest one allowed is used.
///
/// `None` if `config` asks for something this firmware does not do
/// (non-connectable or private-address advertising).
pub fn adv_params(config: &AdvertisingConfig) -> Option<peripheral::Config> {
    if !config.connectable() || !config.use_identity() {
        warn!("Only connectable identity-address advertising is supported");
        return None;
    }
    if config.interval_min() > config.interval_max() {
        warn!(
            "Advertising interval range {}..{} is empty",
            config.interval_min(),
            config.interval_max()
        );
        return None;
    }

    Some(peripheral::Config {
        interval: u32::from(config.interval_min()),
        ..Default::default()
    })
}

/// Advertising data (flags + complete name) and scan response (128-bit
/// service UUID) for `config`.
pub fn payloads(
    config: &AdvertisingConfig,
) -> (LegacyAdvertisementPayload, LegacyAdvertisementPayload) {
    let flags: &[Flag] = if config.flags() & AD_FLAG_GENERAL_DISCOVERY != 0 {
        &[Flag::GeneralDiscovery, Flag::LE_Only]
    } else {
        &[Flag::LE_Only]
    };

    let adv = LegacyAdvertisementBuilder::new()
        .flags(flags)
        .full_name(config.name())
        .build();
    let scan = LegacyAdvertisementBuilder::new()
        .services_128(ServiceList::Complete, &[config.service_uuid_le()])
        .build();
    (adv, scan)
}

/// Drop procedures still queued for a link that is gone. The SoftDevice
/// reuses connection handles, so this must run before the next link's
/// `Connected` event is sent.
pub fn discard_procedures() {
    while let Ok((h, step)) = PROCEDURES.try_receive() {
        debug!("Dropping {} queued for handle {}", step, h);
    }
}

/// Settle the steps queued for `handle`. Runs for the lifetime of one
/// connection.
pub async fn run_procedures(
    handle: ConnHandle,
    events: Sender<'static, CriticalSectionRawMutex, Event, { config::EVENT_QUEUE_DEPTH }>,
) -> ! {
    loop {
        let (h, step) = PROCEDURES.receive().await;
        if h != handle {
            debug!("Dropping {} queued for handle {}", step, h);
            continue;
        }

        Timer::after(Duration::from_millis(PROCEDURE_WINDOW_MS)).await;
        events.send(Event::StepSettled { handle, step }).await;
    }
}

/// Emit [`Event::ParamUpdated`] whenever the central changes the
/// connection timing.
pub async fn watch_conn_params(
    conn: &Connection,
    handle: ConnHandle,
    events: Sender<'static, CriticalSectionRawMutex, Event, { config::EVENT_QUEUE_DEPTH }>,
) -> ! {
    let mut last = conn_params(&conn.conn_params());
    loop {
        Timer::after(Duration::from_millis(CONN_PARAMS_POLL_MS)).await;

        let now = conn_params(&conn.conn_params());
        if now != last {
            info!("conn {}: timing changed", handle);
            last = now;
            events.send(Event::ParamUpdated { handle, params: now }).await;
        }
    }
}

//! LED Button Service peripheral firmware for the nRF52840-DK.
//!
//! Task layout:
//!
//! - `softdevice_task` - SoftDevice event loop
//! - `advertising_task` - connectable advertising, then GATT server and
//!   link procedures for the one connection
//! - `dispatcher_task` - the only consumer of [`EVENTS`]; runs the
//!   lifecycle core serially
//! - `button_task` - BUTTON1 transitions into [`EVENTS`]
//! - LED tasks - run status blink, connection status, LBS LED

#![no_std]
#![no_main]

#[path = "ble/softdevice.rs"]
mod softdevice;
mod ui;

use core::mem;

use defmt::{debug, error, info};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_futures::select::{select, select3, Either};
use embassy_nrf::gpio::{AnyPin, Pin};
use embassy_nrf::interrupt;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use nrf_softdevice::ble::{gatt_server, peripheral};
use nrf_softdevice::{raw, Softdevice};
use panic_probe as _;
use static_cell::StaticCell;

use lbs_peripheral::ble::{
    AdvertisingConfig, Event, EventDispatcher, HCI_REMOTE_USER_TERMINATED, HCI_SUCCESS,
};
use lbs_peripheral::config;
use lbs_peripheral::error::{Error, StartupStage};

use softdevice::{AdvCommand, SoftdeviceStack, ADV_COMMANDS};

/// Stack callbacks and button changes, in arrival order.
static EVENTS: Channel<CriticalSectionRawMutex, Event, { config::EVENT_QUEUE_DEPTH }> =
    Channel::new();

static CONNECTION_LED: Signal<CriticalSectionRawMutex, bool> = Signal::new();
static LBS_LED: Signal<CriticalSectionRawMutex, bool> = Signal::new();

static SERVER: StaticCell<Server> = StaticCell::new();

#[nrf_softdevice::gatt_server]
pub struct Server {
    pub lbs: LbsService,
}

// The attribute macros take literals: keep in sync with
// `config::LBS_SERVICE_UUID` and the two `LBS_*_CHAR_UUID`s.
#[nrf_softdevice::gatt_service(uuid = "00001523-1212-efde-1523-785feabcd123")]
pub struct LbsService {
    #[characteristic(uuid = "00001524-1212-efde-1523-785feabcd123", read, notify)]
    button: u8,
    #[characteristic(uuid = "00001525-1212-efde-1523-785feabcd123", write)]
    led: u8,
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("lbs-peripheral starting");

    if let Err(e) = start(spawner) {
        error!("Startup failed: {}", e);
        defmt::panic!("fatal startup error");
    }
}

fn start(spawner: Spawner) -> Result<(), Error> {
    let mut nrf_config = embassy_nrf::config::Config::default();
    // Keep clear of the SoftDevice's reserved priorities (0, 1, 4).
    nrf_config.gpiote_interrupt_priority = interrupt::Priority::P2;
    nrf_config.time_interrupt_priority = interrupt::Priority::P2;
    let p = embassy_nrf::init(nrf_config);

    let spawn_err = |_| Error::Startup(StartupStage::Tasks);

    // LEDs and button
    spawner
        .spawn(run_led_task(p.P0_13.degrade()))
        .map_err(spawn_err)?;
    spawner
        .spawn(connection_led_task(p.P0_14.degrade()))
        .map_err(spawn_err)?;
    spawner
        .spawn(lbs_led_task(p.P0_15.degrade()))
        .map_err(spawn_err)?;
    spawner
        .spawn(button_task(p.P0_11.degrade()))
        .map_err(spawn_err)?;

    // Bluetooth
    let sd_config = nrf_softdevice::Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_XTAL as u8,
            rc_ctiv: 0,
            rc_temp_ctiv: 0,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_20_PPM as u8,
        }),
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: 1,
            event_length: 24,
        }),
        conn_gatt: Some(raw::ble_gatt_conn_cfg_t {
            att_mtu: config::ATT_MTU_MAX,
        }),
        gatts_attr_tab_size: Some(raw::ble_gatts_cfg_attr_tab_size_t {
            attr_tab_size: raw::BLE_GATTS_ATTR_TAB_SIZE_DEFAULT,
        }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: 1,
            periph_role_count: 1,
            central_role_count: 0,
            central_sec_count: 0,
            _bitfield_1: raw::ble_gap_cfg_role_count_t::new_bitfield_1(0),
        }),
        gap_device_name: Some(raw::ble_gap_cfg_device_name_t {
            p_value: config::DEVICE_NAME.as_ptr() as _,
            current_len: config::DEVICE_NAME.len() as u16,
            max_len: config::DEVICE_NAME.len() as u16,
            write_perm: unsafe { mem::zeroed() },
            _bitfield_1: raw::ble_gap_cfg_device_name_t::new_bitfield_1(
                raw::BLE_GATTS_VLOC_STACK as u8,
            ),
        }),
        ..Default::default()
    };

    let sd = Softdevice::enable(&sd_config);
    let server = Server::new(sd).map_err(|_| Error::Startup(StartupStage::GattServer))?;
    let server: &'static Server = SERVER.init(server);
    let sd: &'static Softdevice = sd;
    info!("SoftDevice enabled, GATT server registered");

    spawner.spawn(softdevice_task(sd)).map_err(spawn_err)?;

    let stack = SoftdeviceStack::new(server.lbs.button_value_handle);
    let mut dispatcher = EventDispatcher::new(stack);
    dispatcher.start_advertising(AdvertisingConfig::from_config())?;
    spawner.spawn(dispatcher_task(dispatcher)).map_err(spawn_err)?;

    // Nothing reaches the air until this task runs.
    spawner
        .spawn(advertising_task(sd, server))
        .map_err(spawn_err)?;

    Ok(())
}

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice) -> ! {
    sd.run().await
}

#[embassy_executor::task]
async fn dispatcher_task(mut dispatcher: EventDispatcher<SoftdeviceStack>) -> ! {
    loop {
        let event = EVENTS.receive().await;
        if let Err(e) = dispatcher.dispatch(event) {
            debug!("Event discarded: {}", e);
        }
        CONNECTION_LED.signal(dispatcher.connections().active().is_some());
    }
}

#[embassy_executor::task]
async fn advertising_task(sd: &'static Softdevice, server: &'static Server) -> ! {
    loop {
        let AdvCommand::Start(adv_config) = ADV_COMMANDS.wait().await else {
            continue;
        };

        let Some(sd_adv_config) = softdevice::adv_params(&adv_config) else {
            continue;
        };
        let (adv_data, scan_data) = softdevice::payloads(&adv_config);
        let adv = peripheral::ConnectableAdvertisement::ScannableUndirected {
            adv_data: &adv_data,
            scan_data: &scan_data,
        };

        let conn = match select(
            peripheral::advertise_connectable(sd, adv, &sd_adv_config),
            ADV_COMMANDS.wait(),
        )
        .await
        {
            Either::First(Ok(conn)) => conn,
            Either::First(Err(e)) => {
                error!("Advertising failed: {:?}", defmt::Debug2Format(&e));
                continue;
            }
            Either::Second(cmd) => {
                info!("Advertising interrupted by {}", cmd);
                continue;
            }
        };

        let Some(handle) = conn.handle() else {
            continue;
        };

        softdevice::discard_procedures();
        EVENTS
            .send(Event::Connected {
                handle,
                status: HCI_SUCCESS,
                params: softdevice::conn_params(&conn.conn_params()),
            })
            .await;

        let gatt = gatt_server::run(&conn, server, |e| match e {
            ServerEvent::Lbs(LbsServiceEvent::LedWrite(v)) => {
                info!("LED write: {}", v);
                LBS_LED.signal(v != 0);
            }
            ServerEvent::Lbs(LbsServiceEvent::ButtonCccdWrite { notifications }) => {
                info!("Button notifications enabled: {}", notifications);
            }
        });
        select3(
            gatt,
            softdevice::run_procedures(handle, EVENTS.sender()),
            softdevice::watch_conn_params(&conn, handle, EVENTS.sender()),
        )
        .await;

        // The wrapper does not surface the HCI reason.
        EVENTS
            .send(Event::Disconnected {
                handle,
                reason: HCI_REMOTE_USER_TERMINATED,
            })
            .await;
    }
}

#[embassy_executor::task]
async fn button_task(pin: AnyPin) -> ! {
    ui::buttons::button_task(pin, EVENTS.sender()).await
}

#[embassy_executor::task]
async fn run_led_task(pin: AnyPin) -> ! {
    ui::leds::blink_task(pin).await
}

#[embassy_executor::task]
async fn connection_led_task(pin: AnyPin) -> ! {
    ui::leds::follow_task(pin, &CONNECTION_LED).await
}

#[embassy_executor::task]
async fn lbs_led_task(pin: AnyPin) -> ! {
    ui::leds::follow_task(pin, &LBS_LED).await
}

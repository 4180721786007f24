//! Status LEDs (active-low).

use embassy_nrf::gpio::{AnyPin, Level, Output, OutputDrive};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer};

use lbs_peripheral::config::RUN_LED_BLINK_INTERVAL_MS;

fn led(pin: AnyPin) -> Output<'static> {
    Output::new(pin, Level::High, OutputDrive::Standard)
}

fn set(out: &mut Output<'static>, on: bool) {
    if on {
        out.set_low();
    } else {
        out.set_high();
    }
}

/// Toggle the run-status LED forever.
pub async fn blink_task(pin: AnyPin) -> ! {
    let mut out = led(pin);
    loop {
        out.toggle();
        Timer::after(Duration::from_millis(RUN_LED_BLINK_INTERVAL_MS)).await;
    }
}

/// Drive an LED from a signal, e.g. connection status or the LBS LED write.
pub async fn follow_task(pin: AnyPin, state: &'static Signal<CriticalSectionRawMutex, bool>) -> ! {
    let mut out = led(pin);
    loop {
        set(&mut out, state.wait().await);
    }
}

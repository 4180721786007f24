//! GPIO button input with async debouncing.
//!
//! BUTTON1 (active-low with internal pull-up) is the LED Button Service
//! button. Every debounced transition is turned into a [`ButtonState`] and
//! queued for the dispatcher.
//!
//! [`ButtonState`]: lbs_peripheral::ble::ButtonState

use defmt::info;
use embassy_nrf::gpio::{AnyPin, Input, Pull};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Sender;
use embassy_time::{Duration, Timer};

use lbs_peripheral::ble::{ButtonTracker, Event};
use lbs_peripheral::config::{BUTTON_DEBOUNCE_MS, EVENT_QUEUE_DEPTH, USER_BUTTON};

/// Run the button loop.
///
/// Waits for any edge, debounces, then reports the new level if it differs
/// from the last one reported.
pub async fn button_task(
    pin: AnyPin,
    tx: Sender<'static, CriticalSectionRawMutex, Event, EVENT_QUEUE_DEPTH>,
) -> ! {
    let mut btn = Input::new(pin, Pull::Up);
    let mut tracker = ButtonTracker::new(USER_BUTTON);
    let mut last_pressed = false;

    loop {
        btn.wait_for_any_edge().await;

        // Debounce: wait and re-check.
        Timer::after(Duration::from_millis(BUTTON_DEBOUNCE_MS)).await;

        let pressed = btn.is_low();
        if pressed == last_pressed {
            continue;
        }
        last_pressed = pressed;

        let bits = if pressed { USER_BUTTON } else { 0 };
        if let Some(state) = tracker.on_change(bits, USER_BUTTON) {
            info!("Button: {}", state);
            tx.send(Event::Button(state)).await;
        }
    }
}

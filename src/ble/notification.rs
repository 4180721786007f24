//! Button state notifications.
//!
//! The input driver reports raw button bitmasks. [`ButtonTracker`] reduces
//! them to [`ButtonState`] changes of the one button the LED Button Service
//! exposes, and [`NotificationService`] sends each change to the connected
//! central. A change that cannot be sent is dropped: there is no queue and
//! no retry, the next transition is sent on its own.

use crate::ble::connection::ConnectionManager;
use crate::ble::stack::BleStack;
use crate::config;
use crate::error::NotifyError;

/// One button transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ButtonState {
    pub pressed: bool,
    /// Increases by one with every transition.
    pub sequence: u32,
}

/// Turns `(button_state, has_changed)` bitmasks into [`ButtonState`]s.
#[derive(Debug, Clone, Copy)]
pub struct ButtonTracker {
    mask: u32,
    sequence: u32,
}

impl ButtonTracker {
    pub const fn new(mask: u32) -> Self {
        Self { mask, sequence: 0 }
    }

    /// `None` if the tracked button did not change.
    pub fn on_change(&mut self, button_state: u32, has_changed: u32) -> Option<ButtonState> {
        if has_changed & self.mask == 0 {
            return None;
        }

        self.sequence = self.sequence.wrapping_add(1);
        Some(ButtonState {
            pressed: button_state & self.mask != 0,
            sequence: self.sequence,
        })
    }
}

impl Default for ButtonTracker {
    fn default() -> Self {
        Self::new(config::USER_BUTTON)
    }
}

/// Sends button state to the active connection.
#[derive(Debug, Default)]
pub struct NotificationService {
    sent: u32,
    dropped: u32,
}

impl NotificationService {
    pub const fn new() -> Self {
        Self {
            sent: 0,
            dropped: 0,
        }
    }

    /// Notify the connected central of the button state.
    ///
    /// [`NotifyError::NoConnection`] is the normal outcome while idle.
    pub fn notify_button_state<S: BleStack>(
        &mut self,
        conns: &ConnectionManager,
        stack: &mut S,
        pressed: bool,
    ) -> Result<(), NotifyError> {
        let Some(conn) = conns.active() else {
            debug!("Button {} with no connection", pressed);
            self.dropped = self.dropped.wrapping_add(1);
            return Err(NotifyError::NoConnection);
        };

        match stack.notify_button(conn.handle(), &[u8::from(pressed)]) {
            Ok(()) => {
                debug!("Button {} notified", pressed);
                self.sent = self.sent.wrapping_add(1);
                Ok(())
            }
            Err(e) => {
                warn!("Button notification dropped: {}", e);
                self.dropped = self.dropped.wrapping_add(1);
                Err(NotifyError::TransportFailed(e))
            }
        }
    }

    /// Notifications accepted by the stack.
    pub fn sent(&self) -> u32 {
        self.sent
    }

    /// Button changes that were not sent.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::mock::{MockStack, Request};
    use crate::ble::stack::ConnParams;
    use crate::error::StackError;

    fn press(pressed: bool, sequence: u32) -> ButtonState {
        ButtonState { pressed, sequence }
    }

    #[test]
    fn tracker_reports_only_its_button() {
        let mut t = ButtonTracker::new(1 << 0);
        assert_eq!(t.on_change(0b10, 0b10), None);
        assert_eq!(t.on_change(0b01, 0b01), Some(press(true, 1)));
        assert_eq!(t.on_change(0b00, 0b01), Some(press(false, 2)));
        assert_eq!(t.on_change(0b11, 0b10), None);
    }

    #[test]
    fn tracker_sequence_is_monotonic() {
        let mut t = ButtonTracker::default();
        let a = t.on_change(1, 1).unwrap();
        let b = t.on_change(1, 1).unwrap();
        let c = t.on_change(0, 1).unwrap();
        assert!(a.sequence < b.sequence && b.sequence < c.sequence);
    }

    #[test]
    fn no_connection_means_no_send() {
        let conns = ConnectionManager::new();
        let mut stack = MockStack::new();
        let mut svc = NotificationService::new();

        assert_eq!(
            svc.notify_button_state(&conns, &mut stack, true),
            Err(NotifyError::NoConnection)
        );
        assert!(stack.requests().is_empty());
        assert_eq!(svc.dropped(), 1);
    }

    #[test]
    fn sends_to_active_connection() {
        let mut conns = ConnectionManager::new();
        conns.on_connected(5, ConnParams::default()).unwrap();
        let mut stack = MockStack::new();
        let mut svc = NotificationService::new();

        svc.notify_button_state(&conns, &mut stack, true).unwrap();
        svc.notify_button_state(&conns, &mut stack, false).unwrap();

        assert_eq!(
            stack.requests(),
            &[
                Request::Notify(5, std::vec![1]),
                Request::Notify(5, std::vec![0]),
            ]
        );
        assert_eq!(svc.sent(), 2);
        assert_eq!(svc.dropped(), 0);
    }

    #[test]
    fn transport_failure_is_dropped_and_next_change_still_sent() {
        let mut conns = ConnectionManager::new();
        conns.on_connected(5, ConnParams::default()).unwrap();
        let mut stack = MockStack::new();
        let mut svc = NotificationService::new();

        stack.reject_notify(StackError::NotSubscribed);
        assert_eq!(
            svc.notify_button_state(&conns, &mut stack, true),
            Err(NotifyError::TransportFailed(StackError::NotSubscribed))
        );

        stack.accept_all();
        svc.notify_button_state(&conns, &mut stack, false).unwrap();

        // The link survives the failed send.
        assert!(conns.is_active(5));
        assert_eq!(stack.requests().len(), 2);
        assert_eq!(svc.sent(), 1);
        assert_eq!(svc.dropped(), 1);
    }

    #[test]
    fn no_send_after_disconnect() {
        let mut conns = ConnectionManager::new();
        conns.on_connected(5, ConnParams::default()).unwrap();
        conns.on_disconnected(5, 0x13).unwrap();
        let mut stack = MockStack::new();
        let mut svc = NotificationService::new();

        assert_eq!(
            svc.notify_button_state(&conns, &mut stack, true),
            Err(NotifyError::NoConnection)
        );
        assert!(stack.requests().is_empty());
    }
}

//! Event routing.
//!
//! Every host stack callback and every button change becomes one [`Event`].
//! [`EventDispatcher::dispatch`] handles them one at a time, in arrival
//! order, and routes each to the component that owns it. Failures are
//! logged by the component that hit them and returned, never propagated
//! as a fault.

use crate::ble::advertising::{AdvertisingConfig, AdvertisingController};
use crate::ble::connection::ConnectionManager;
use crate::ble::negotiation::{NegotiationPlan, ParameterNegotiator, Progress, Step};
use crate::ble::notification::{ButtonState, NotificationService};
use crate::ble::stack::{
    BleStack, ConnHandle, ConnParams, DataLengthInfo, HciStatus, Phy, HCI_SUCCESS,
};
use crate::config;
use crate::error::{AdvertisingError, DispatchError};

/// Raw input to the lifecycle manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// A connection attempt finished. Non-zero `status` means it failed.
    Connected {
        handle: ConnHandle,
        status: HciStatus,
        params: ConnParams,
    },
    Disconnected {
        handle: ConnHandle,
        reason: HciStatus,
    },
    /// The central changed the connection timing.
    ParamUpdated {
        handle: ConnHandle,
        params: ConnParams,
    },
    PhyUpdated {
        handle: ConnHandle,
        status: HciStatus,
        tx: Phy,
        rx: Phy,
    },
    DataLengthUpdated {
        handle: ConnHandle,
        info: DataLengthInfo,
    },
    MtuExchanged {
        handle: ConnHandle,
        status: HciStatus,
        mtu: u16,
    },
    /// A negotiation procedure finished but the stack cannot report its
    /// outcome.
    StepSettled { handle: ConnHandle, step: Step },
    Button(ButtonState),
}

/// Owns the stack handle and all lifecycle components.
pub struct EventDispatcher<S: BleStack> {
    stack: S,
    advertiser: AdvertisingController,
    connections: ConnectionManager,
    negotiator: ParameterNegotiator,
    notifier: NotificationService,
    auto_resume: bool,
}

impl<S: BleStack> EventDispatcher<S> {
    pub fn new(stack: S) -> Self {
        Self::with_plan(stack, NegotiationPlan::from_config())
    }

    pub fn with_plan(stack: S, plan: NegotiationPlan) -> Self {
        Self {
            stack,
            advertiser: AdvertisingController::new(),
            connections: ConnectionManager::new(),
            negotiator: ParameterNegotiator::new(plan),
            notifier: NotificationService::new(),
            auto_resume: config::ADV_AUTO_RESUME,
        }
    }

    /// Restart advertising once a disconnect frees the slot (default on).
    pub fn set_auto_resume(&mut self, on: bool) {
        self.auto_resume = on;
    }

    pub fn start_advertising(&mut self, config: AdvertisingConfig) -> Result<(), AdvertisingError> {
        self.advertiser.start(&mut self.stack, config)
    }

    pub fn stop_advertising(&mut self) -> Result<(), AdvertisingError> {
        self.advertiser.stop(&mut self.stack)
    }

    /// Handle one event to completion.
    pub fn dispatch(&mut self, event: Event) -> Result<(), DispatchError> {
        trace!("event: {}", event);

        match event {
            Event::Connected {
                handle,
                status,
                params,
            } => self.connected(handle, status, params),
            Event::Disconnected { handle, reason } => self.disconnected(handle, reason),
            Event::ParamUpdated { handle, params } => {
                if self.connections.is_active(handle) {
                    info!(
                        "Connection parameters updated: interval {} us, latency {}, timeout {} ms",
                        params.interval_us(),
                        params.latency,
                        params.timeout_ms()
                    );
                } else {
                    debug!("Parameter update for stale handle {}", handle);
                }
                Ok(())
            }
            Event::PhyUpdated {
                handle,
                status,
                tx,
                rx,
            } => {
                let p = self.negotiator.on_phy_updated(
                    &mut self.connections,
                    &mut self.stack,
                    handle,
                    status,
                    tx,
                    rx,
                );
                Self::progress(p);
                Ok(())
            }
            Event::DataLengthUpdated { handle, info } => {
                let p = self.negotiator.on_data_length_updated(
                    &mut self.connections,
                    &mut self.stack,
                    handle,
                    info,
                );
                Self::progress(p);
                Ok(())
            }
            Event::MtuExchanged {
                handle,
                status,
                mtu,
            } => {
                let p = self.negotiator.on_mtu_exchanged(
                    &mut self.connections,
                    &mut self.stack,
                    handle,
                    status,
                    mtu,
                );
                Self::progress(p);
                Ok(())
            }
            Event::StepSettled { handle, step } => {
                let p = self.negotiator.on_step_settled(
                    &mut self.connections,
                    &mut self.stack,
                    handle,
                    step,
                );
                Self::progress(p);
                Ok(())
            }
            Event::Button(state) => {
                trace!("button #{}", state.sequence);
                self.notifier
                    .notify_button_state(&self.connections, &mut self.stack, state.pressed)?;
                Ok(())
            }
        }
    }

    fn connected(
        &mut self,
        handle: ConnHandle,
        status: HciStatus,
        params: ConnParams,
    ) -> Result<(), DispatchError> {
        if status != HCI_SUCCESS {
            error!("Connection error (handle {}, status {:#x})", handle, status);
            return Err(DispatchError::ConnectFailed { handle, status });
        }

        self.connections.on_connected(handle, params)?;
        self.advertiser.on_connected();

        let progress = self
            .negotiator
            .start(&mut self.connections, &mut self.stack, handle)
            .inspect_err(|e| warn!("Negotiation not started: {}", e))?;
        Self::progress(progress);
        Ok(())
    }

    fn disconnected(&mut self, handle: ConnHandle, reason: HciStatus) -> Result<(), DispatchError> {
        self.connections.on_disconnected(handle, reason)?;

        if self.auto_resume && self.connections.active().is_none() {
            self.advertiser
                .resume(&mut self.stack)
                .inspect_err(|e| warn!("Advertising not resumed: {}", e))?;
        }
        Ok(())
    }

    fn progress(p: Progress) {
        match p {
            Progress::Pending(step) => debug!("Negotiation: {} pending", step),
            Progress::Ready | Progress::Unsolicited(_) | Progress::Ignored => {}
        }
    }

    pub fn stack(&self) -> &S {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut S {
        &mut self.stack
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    pub fn advertiser(&self) -> &AdvertisingController {
        &self.advertiser
    }

    pub fn notifier(&self) -> &NotificationService {
        &self.notifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::connection::LinkState;
    use crate::ble::mock::{MockStack, Request};
    use crate::error::{ConnectionError, NegotiationError, NotifyError, StackError};

    fn params() -> ConnParams {
        ConnParams {
            interval: 24,
            latency: 0,
            timeout: 400,
        }
    }

    fn connected(handle: ConnHandle) -> Event {
        Event::Connected {
            handle,
            status: HCI_SUCCESS,
            params: params(),
        }
    }

    fn advertising() -> EventDispatcher<MockStack> {
        let mut d = EventDispatcher::new(MockStack::new());
        d.start_advertising(AdvertisingConfig::from_config()).unwrap();
        d
    }

    #[test]
    fn connect_stops_advertising_and_starts_negotiation() {
        let mut d = advertising();
        d.dispatch(connected(1)).unwrap();

        assert!(!d.advertiser().is_advertising());
        let conn = d.connections().active().unwrap();
        assert_eq!(conn.handle(), 1);
        assert_eq!(conn.state(), LinkState::PhyPending);
        assert!(matches!(d.stack().requests().last(), Some(Request::Phy(1, _))));
    }

    #[test]
    fn failed_connection_attempt_allocates_nothing() {
        let mut d = advertising();
        assert_eq!(
            d.dispatch(Event::Connected {
                handle: 1,
                status: 0x3e,
                params: params(),
            }),
            Err(DispatchError::ConnectFailed {
                handle: 1,
                status: 0x3e
            })
        );
        assert!(d.connections().active().is_none());
        assert!(d.advertiser().is_advertising());
    }

    #[test]
    fn second_connect_reported_and_first_kept() {
        let mut d = advertising();
        d.dispatch(connected(1)).unwrap();
        let before = d.stack().requests().len();

        assert_eq!(
            d.dispatch(connected(2)),
            Err(DispatchError::Connection(ConnectionError::SlotOccupied {
                active: 1
            }))
        );
        assert_eq!(d.connections().active().unwrap().handle(), 1);
        assert_eq!(d.stack().requests().len(), before);
    }

    #[test]
    fn disconnect_resumes_advertising() {
        let mut d = advertising();
        d.dispatch(connected(1)).unwrap();
        d.dispatch(Event::Disconnected {
            handle: 1,
            reason: 0x13,
        })
        .unwrap();

        assert!(d.connections().active().is_none());
        assert!(d.advertiser().is_advertising());
        assert_eq!(d.stack().requests().last(), Some(&Request::StartAdvertising));
    }

    #[test]
    fn disconnect_without_auto_resume() {
        let mut d = advertising();
        d.set_auto_resume(false);
        d.dispatch(connected(1)).unwrap();
        d.dispatch(Event::Disconnected {
            handle: 1,
            reason: 0x13,
        })
        .unwrap();

        assert!(!d.advertiser().is_advertising());
    }

    #[test]
    fn resume_failure_is_reported_not_retried() {
        let mut d = advertising();
        d.dispatch(connected(1)).unwrap();
        d.stack_mut().reject_advertising(StackError::Busy);

        assert_eq!(
            d.dispatch(Event::Disconnected {
                handle: 1,
                reason: 0x08,
            }),
            Err(DispatchError::Advertising(AdvertisingError::StackRejected(
                StackError::Busy
            )))
        );
        // The slot is still released.
        assert!(d.connections().active().is_none());
        let starts = d
            .stack()
            .requests()
            .iter()
            .filter(|r| **r == Request::StartAdvertising)
            .count();
        assert_eq!(starts, 2);
    }

    #[test]
    fn unknown_disconnect_is_contained() {
        let mut d = advertising();
        d.dispatch(connected(1)).unwrap();

        assert_eq!(
            d.dispatch(Event::Disconnected {
                handle: 9,
                reason: 0x13,
            }),
            Err(DispatchError::Connection(ConnectionError::UnknownHandle(9)))
        );
        assert!(d.connections().is_active(1));
    }

    #[test]
    fn param_update_is_logged_only() {
        let mut d = advertising();
        d.dispatch(connected(1)).unwrap();
        let before = d.stack().requests().len();

        d.dispatch(Event::ParamUpdated {
            handle: 1,
            params: ConnParams {
                interval: 80,
                latency: 4,
                timeout: 600,
            },
        })
        .unwrap();

        let conn = d.connections().active().unwrap();
        assert_eq!(conn.state(), LinkState::PhyPending);
        assert_eq!(conn.params().conn, params());
        assert_eq!(d.stack().requests().len(), before);
    }

    #[test]
    fn stale_completion_is_not_an_error() {
        let mut d = advertising();
        d.dispatch(connected(1)).unwrap();
        d.dispatch(Event::Disconnected {
            handle: 1,
            reason: 0x13,
        })
        .unwrap();

        d.dispatch(Event::MtuExchanged {
            handle: 1,
            status: HCI_SUCCESS,
            mtu: 247,
        })
        .unwrap();
        assert!(d.connections().active().is_none());
    }

    #[test]
    fn negotiation_rejected_at_start_keeps_link() {
        let mut d = advertising();
        d.stack_mut().reject_phy(StackError::InvalidState);
        d.dispatch(connected(1)).unwrap();

        assert_eq!(
            d.connections().active().unwrap().state(),
            Step::DataLength.pending_state()
        );
    }

    #[test]
    fn button_routes_to_notification() {
        let mut d = advertising();
        let press = Event::Button(ButtonState {
            pressed: true,
            sequence: 1,
        });

        assert_eq!(
            d.dispatch(press),
            Err(DispatchError::Notify(NotifyError::NoConnection))
        );

        d.dispatch(connected(1)).unwrap();
        d.dispatch(press).unwrap();
        assert_eq!(
            d.stack().requests().last(),
            Some(&Request::Notify(1, std::vec![1]))
        );
        assert_eq!(d.notifier().sent(), 1);
        assert_eq!(d.notifier().dropped(), 1);
    }

    #[test]
    fn settled_steps_reach_ready_with_default_mtu() {
        let mut d = advertising();
        d.dispatch(connected(1)).unwrap();
        for step in [Step::Phy, Step::DataLength, Step::Mtu] {
            d.dispatch(Event::StepSettled { handle: 1, step }).unwrap();
        }

        let conn = d.connections().active().unwrap();
        assert!(conn.is_ready());
        assert_eq!(conn.params().mtu, None);
        assert_eq!(conn.params().usable_payload(), 20);
    }

    #[test]
    fn negotiation_error_type_is_wrapped() {
        let e: DispatchError = NegotiationError::AlreadyStarted(1).into();
        assert_eq!(e, DispatchError::Negotiation(NegotiationError::AlreadyStarted(1)));
    }
}

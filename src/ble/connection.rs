//! Single-slot connection tracking.
//!
//! The peripheral accepts exactly one central. [`ConnectionManager`] owns
//! that slot and is the only place the link's state and reference count
//! change. Other components either borrow a read-only [`ConnectionRef`] for
//! the duration of one handler, or run a closure against the live link via
//! [`ConnectionManager::with_active`], which holds a temporary reference
//! while the closure runs.

use core::ops::Deref;

use crate::ble::stack::{ConnHandle, ConnParams, DataLengthInfo, HciStatus, Phy};
use crate::config;
use crate::error::ConnectionError;

/// Lifecycle / negotiation state of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkState {
    Disconnected,
    Connected,
    PhyPending,
    DataLengthPending,
    MtuPending,
    Ready,
}

/// Values reported by the stack for the live link. `None` until the
/// corresponding procedure completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NegotiatedParams {
    /// Timing at connection establishment.
    pub conn: ConnParams,
    pub tx_phy: Option<Phy>,
    pub rx_phy: Option<Phy>,
    pub data_length: Option<DataLengthInfo>,
    pub mtu: Option<u16>,
}

impl NegotiatedParams {
    /// ATT MTU in effect: the exchanged value, or the protocol default.
    pub fn effective_mtu(&self) -> u16 {
        self.mtu.unwrap_or(config::ATT_MTU_DEFAULT)
    }

    /// Largest attribute value a single notification can carry.
    pub fn usable_payload(&self) -> u16 {
        self.effective_mtu().saturating_sub(config::ATT_HEADER_LEN)
    }
}

/// The active link.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Connection {
    handle: ConnHandle,
    state: LinkState,
    params: NegotiatedParams,
    ref_count: u8,
}

impl Connection {
    fn new(handle: ConnHandle, conn: ConnParams) -> Self {
        Self {
            handle,
            state: LinkState::Connected,
            params: NegotiatedParams {
                conn,
                ..NegotiatedParams::default()
            },
            ref_count: 1,
        }
    }

    pub fn handle(&self) -> ConnHandle {
        self.handle
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn params(&self) -> &NegotiatedParams {
        &self.params
    }

    pub fn ref_count(&self) -> u8 {
        self.ref_count
    }

    pub fn is_ready(&self) -> bool {
        self.state == LinkState::Ready
    }

    pub(crate) fn set_state(&mut self, state: LinkState) {
        trace!("conn {}: {} -> {}", self.handle, self.state, state);
        self.state = state;
    }

    pub(crate) fn params_mut(&mut self) -> &mut NegotiatedParams {
        &mut self.params
    }
}

/// Borrowed view of the active connection, valid for one handler call.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionRef<'a> {
    conn: &'a Connection,
}

impl Deref for ConnectionRef<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn
    }
}

/// Owner of the single connection slot.
#[derive(Debug, Default)]
pub struct ConnectionManager {
    slot: Option<Connection>,
}

impl ConnectionManager {
    pub const fn new() -> Self {
        Self { slot: None }
    }

    /// A link was established. Fills the slot with `ref_count = 1`.
    ///
    /// A second link while the slot is occupied is rejected and the
    /// existing connection is left untouched.
    pub fn on_connected(
        &mut self,
        handle: ConnHandle,
        params: ConnParams,
    ) -> Result<ConnectionRef<'_>, ConnectionError> {
        if let Some(active) = &self.slot {
            error!(
                "Connection {} while {} holds the only slot",
                handle, active.handle
            );
            return Err(ConnectionError::SlotOccupied {
                active: active.handle,
            });
        }

        info!(
            "Connected (handle {}): interval {} us, latency {}, timeout {} ms",
            handle,
            params.interval_us(),
            params.latency,
            params.timeout_ms()
        );

        let conn = self.slot.insert(Connection::new(handle, params));
        Ok(ConnectionRef { conn })
    }

    /// The link was lost. Drops the link's own reference; the slot is
    /// freed once nothing else holds one.
    pub fn on_disconnected(
        &mut self,
        handle: ConnHandle,
        reason: HciStatus,
    ) -> Result<(), ConnectionError> {
        match self.slot.as_mut() {
            Some(conn) if conn.handle == handle && conn.state != LinkState::Disconnected => {
                info!("Disconnected (handle {}, reason {:#x})", handle, reason);
                conn.set_state(LinkState::Disconnected);
            }
            _ => {
                error!(
                    "Disconnect for unknown handle {} (reason {:#x})",
                    handle, reason
                );
                return Err(ConnectionError::UnknownHandle(handle));
            }
        }

        self.release();
        Ok(())
    }

    /// The live connection, if any.
    pub fn active(&self) -> Option<ConnectionRef<'_>> {
        self.slot
            .as_ref()
            .filter(|c| c.state != LinkState::Disconnected)
            .map(|conn| ConnectionRef { conn })
    }

    /// `true` if `handle` names the live connection.
    pub fn is_active(&self, handle: ConnHandle) -> bool {
        self.active().is_some_and(|c| c.handle == handle)
    }

    /// Run `f` against the live connection behind `handle`, holding a
    /// temporary reference for the duration of the call.
    ///
    /// Returns [`ConnectionError::StaleHandle`] without calling `f` if the
    /// link is gone or `handle` names an earlier one.
    pub fn with_active<R>(
        &mut self,
        handle: ConnHandle,
        f: impl FnOnce(&mut Connection) -> R,
    ) -> Result<R, ConnectionError> {
        let conn = match self.slot.as_mut() {
            Some(c) if c.handle == handle && c.state != LinkState::Disconnected => c,
            _ => return Err(ConnectionError::StaleHandle(handle)),
        };

        conn.ref_count = conn
            .ref_count
            .checked_add(1)
            .ok_or(ConnectionError::RefOverflow)?;
        let out = f(conn);
        self.release();
        Ok(out)
    }

    fn release(&mut self) {
        let Some(conn) = self.slot.as_mut() else {
            return;
        };

        match conn.ref_count.checked_sub(1) {
            Some(0) => {
                debug!("conn {}: slot freed", conn.handle);
                self.slot = None;
            }
            Some(n) => conn.ref_count = n,
            None => {
                error!("bug: release of conn {} at refcount 0", conn.handle);
                self.slot = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ConnParams {
        ConnParams {
            interval: 24,
            latency: 0,
            timeout: 400,
        }
    }

    #[test]
    fn connect_fills_slot() {
        let mut mgr = ConnectionManager::new();
        let conn = mgr.on_connected(1, params()).unwrap();
        assert_eq!(conn.handle(), 1);
        assert_eq!(conn.state(), LinkState::Connected);
        assert_eq!(conn.ref_count(), 1);
        assert_eq!(conn.params().conn, params());
        assert_eq!(conn.params().mtu, None);

        let active = mgr.active().unwrap();
        assert_eq!(active.handle(), 1);
    }

    #[test]
    fn second_connect_is_rejected_without_overwrite() {
        let mut mgr = ConnectionManager::new();
        mgr.on_connected(1, params()).unwrap();

        let err = mgr.on_connected(2, ConnParams::default()).unwrap_err();
        assert_eq!(err, ConnectionError::SlotOccupied { active: 1 });

        let active = mgr.active().unwrap();
        assert_eq!(active.handle(), 1);
        assert_eq!(active.params().conn, params());
    }

    #[test]
    fn disconnect_frees_slot_for_reuse() {
        let mut mgr = ConnectionManager::new();
        mgr.on_connected(1, params()).unwrap();
        mgr.on_disconnected(1, 0x13).unwrap();
        assert!(mgr.active().is_none());

        let conn = mgr.on_connected(2, params()).unwrap();
        assert_eq!(conn.handle(), 2);
        assert_eq!(conn.ref_count(), 1);
    }

    #[test]
    fn disconnect_with_wrong_handle() {
        let mut mgr = ConnectionManager::new();
        mgr.on_connected(1, params()).unwrap();

        assert_eq!(
            mgr.on_disconnected(7, 0x08),
            Err(ConnectionError::UnknownHandle(7))
        );
        assert!(mgr.is_active(1));
    }

    #[test]
    fn disconnect_when_empty_or_twice() {
        let mut mgr = ConnectionManager::new();
        assert_eq!(
            mgr.on_disconnected(1, 0x13),
            Err(ConnectionError::UnknownHandle(1))
        );

        mgr.on_connected(1, params()).unwrap();
        mgr.on_disconnected(1, 0x13).unwrap();
        assert_eq!(
            mgr.on_disconnected(1, 0x13),
            Err(ConnectionError::UnknownHandle(1))
        );
    }

    #[test]
    fn with_active_holds_and_releases_a_reference() {
        let mut mgr = ConnectionManager::new();
        mgr.on_connected(1, params()).unwrap();

        let seen = mgr
            .with_active(1, |conn| {
                conn.params_mut().mtu = Some(247);
                conn.ref_count()
            })
            .unwrap();
        assert_eq!(seen, 2);

        let active = mgr.active().unwrap();
        assert_eq!(active.ref_count(), 1);
        assert_eq!(active.params().mtu, Some(247));
    }

    #[test]
    fn with_active_on_stale_handle_does_not_run() {
        let mut mgr = ConnectionManager::new();
        let mut ran = false;
        assert_eq!(
            mgr.with_active(1, |_| ran = true),
            Err(ConnectionError::StaleHandle(1))
        );

        mgr.on_connected(2, params()).unwrap();
        mgr.on_disconnected(2, 0x13).unwrap();
        mgr.on_connected(3, params()).unwrap();
        assert_eq!(
            mgr.with_active(2, |_| ran = true),
            Err(ConnectionError::StaleHandle(2))
        );
        assert!(!ran);
    }

    #[test]
    fn usable_payload_subtracts_att_header() {
        let mut p = NegotiatedParams::default();
        assert_eq!(p.usable_payload(), 20);
        p.mtu = Some(247);
        assert_eq!(p.usable_payload(), 244);
    }
}

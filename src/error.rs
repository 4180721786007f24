//! Unified error types for lbs-peripheral.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! Implements `defmt::Format` (behind the `defmt` feature) for efficient
//! on-target logging.

use crate::ble::negotiation::Step;
use crate::ble::stack::ConnHandle;

/// Synchronous status reported by the host stack when a request is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StackError {
    /// Raw error code with no dedicated variant.
    Raw(u32),
    /// Radio or procedure busy (e.g. already advertising).
    Busy,
    /// Parameters rejected.
    InvalidParams,
    /// Request not valid in the current state.
    InvalidState,
    /// The stack does not know the connection handle.
    InvalidHandle,
    /// Bluetooth has not been enabled.
    NotEnabled,
    /// Out of TX buffers.
    NoResources,
    /// The peer has not enabled notifications on the characteristic.
    NotSubscribed,
}

/// Advertising start/stop failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdvertisingError {
    /// The stack refused the request.
    StackRejected(StackError),
    /// `stop` called while not advertising.
    NotAdvertising,
    /// `start` called while already advertising.
    AlreadyAdvertising,
}

/// Connection slot errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionError {
    /// A `connected` event arrived while another link holds the slot.
    SlotOccupied { active: ConnHandle },
    /// `disconnected` for a handle that is not the tracked connection.
    UnknownHandle(ConnHandle),
    /// The connection behind this handle is gone (or was never there).
    StaleHandle(ConnHandle),
    /// Reference count would overflow.
    RefOverflow,
}

/// Link parameter negotiation failures. Never fatal to the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NegotiationError {
    /// The stack refused to start the procedure.
    Rejected { step: Step, error: StackError },
    /// The procedure completed with a non-zero status.
    Failed { step: Step, status: u8 },
    /// The sequence already ran (or is running) for this connection.
    AlreadyStarted(ConnHandle),
    /// No live connection with this handle.
    NotConnected(ConnHandle),
}

/// Button notification failures. The update is dropped, never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NotifyError {
    /// Nobody is connected.
    NoConnection,
    /// The stack refused the notification.
    TransportFailed(StackError),
}

/// Why the dispatcher discarded an event. Logged and contained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DispatchError {
    /// The `connected` event reported a failed connection attempt.
    ConnectFailed { handle: ConnHandle, status: u8 },
    Connection(ConnectionError),
    Negotiation(NegotiationError),
    Notify(NotifyError),
    Advertising(AdvertisingError),
}

/// Firmware bring-up stage, for startup failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StartupStage {
    /// A firmware task could not be spawned.
    Tasks,
    /// GATT service table registration.
    GattServer,
}

/// Top-level error type for the startup path. Fatal: no advertising begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Bring-up failed before the radio was put to use.
    Startup(StartupStage),
    /// Initial advertising could not be started.
    Advertising(AdvertisingError),
}

// Convenience conversions

impl From<ConnectionError> for DispatchError {
    fn from(e: ConnectionError) -> Self {
        DispatchError::Connection(e)
    }
}

impl From<NegotiationError> for DispatchError {
    fn from(e: NegotiationError) -> Self {
        DispatchError::Negotiation(e)
    }
}

impl From<NotifyError> for DispatchError {
    fn from(e: NotifyError) -> Self {
        DispatchError::Notify(e)
    }
}

impl From<AdvertisingError> for DispatchError {
    fn from(e: AdvertisingError) -> Self {
        DispatchError::Advertising(e)
    }
}

impl From<AdvertisingError> for Error {
    fn from(e: AdvertisingError) -> Self {
        Error::Advertising(e)
    }
}

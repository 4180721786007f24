//! Bluetooth Low Energy connection lifecycle.
//!
//! The device is an LED Button Service peripheral with a single connection
//! slot:
//!
//! 1. **Advertising** - connectable advertising with a fixed parameter set.
//! 2. **Connection** - owns the one link and its reference count.
//! 3. **Negotiation** - PHY, data length, then MTU on every new link.
//! 4. **Notification** - button state to the connected central.
//! 5. **Dispatcher** - serial routing of stack events to the above.
//!
//! The host stack sits behind the [`stack::BleStack`] trait, so everything
//! here runs unchanged on the host under `cargo test`.

pub mod advertising;
pub mod connection;
pub mod dispatcher;
pub mod negotiation;
pub mod notification;
pub mod stack;

#[cfg(test)]
pub(crate) mod mock;

pub use advertising::{AdvertisingConfig, AdvertisingController};
pub use connection::{Connection, ConnectionManager, ConnectionRef, LinkState, NegotiatedParams};
pub use dispatcher::{Event, EventDispatcher};
pub use negotiation::{NegotiationPlan, ParameterNegotiator, Progress, Step};
pub use notification::{ButtonState, ButtonTracker, NotificationService};
pub use stack::{
    BleStack, ConnHandle, ConnParams, DataLengthInfo, DataLengthParams, HciStatus, Phy,
    PhyPreference, HCI_REMOTE_USER_TERMINATED, HCI_SUCCESS,
};

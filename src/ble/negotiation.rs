//! Post-connection link parameter negotiation.
//!
//! A fresh link runs a fixed sequence, one outstanding request at a time:
//!
//! ```text
//! Connected ──► PhyPending ──► DataLengthPending ──► MtuPending ──► Ready
//! ```
//!
//! Each request is fire-and-continue. Its completion arrives later as a
//! separate event and advances the sequence. A request the stack refuses, or
//! a procedure that completes with an error status, is logged and skipped:
//! the link stays usable with default parameters.
//!
//! Completions are checked against the live connection first. One for a
//! link that is already gone changes nothing.
//!
//! Links are identified by handle only, and the host stack reuses handles.
//! The stack layer must drop completions still queued for an earlier link
//! before it reports the next link's `Connected` event.
//!
//! A stack that cannot report a procedure's outcome settles the step with
//! [`ParameterNegotiator::on_step_settled`] instead. The sequence moves on
//! and nothing is recorded for that step.

use crate::ble::connection::{ConnectionManager, LinkState, NegotiatedParams};
use crate::ble::stack::{
    BleStack, ConnHandle, DataLengthInfo, DataLengthParams, HciStatus, Phy, PhyPreference,
    HCI_SUCCESS,
};
use crate::config;
use crate::error::NegotiationError;

/// One negotiation procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Step {
    Phy,
    DataLength,
    Mtu,
}

impl Step {
    /// Link state while this step's request is outstanding.
    pub fn pending_state(self) -> LinkState {
        match self {
            Step::Phy => LinkState::PhyPending,
            Step::DataLength => LinkState::DataLengthPending,
            Step::Mtu => LinkState::MtuPending,
        }
    }

    /// The step that follows this one, `None` after the last.
    pub fn next(self) -> Option<Step> {
        match self {
            Step::Phy => Some(Step::DataLength),
            Step::DataLength => Some(Step::Mtu),
            Step::Mtu => None,
        }
    }
}

/// What each step asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NegotiationPlan {
    pub phy: PhyPreference,
    pub data_length: DataLengthParams,
    pub mtu: u16,
}

impl NegotiationPlan {
    /// 2M PHY both ways, maximum data length, maximum ATT MTU.
    pub fn from_config() -> Self {
        let phy = Phy::from_bits(config::PREFERRED_PHY).unwrap_or(Phy::M2);
        Self {
            phy: PhyPreference { tx: phy, rx: phy },
            data_length: DataLengthParams {
                tx_max_len: config::DATA_LEN_MAX,
                tx_max_time: config::DATA_TIME_MAX,
            },
            mtu: config::ATT_MTU_MAX,
        }
    }
}

impl Default for NegotiationPlan {
    fn default() -> Self {
        Self::from_config()
    }
}

/// Where the sequence stands after handling a trigger or a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Progress {
    /// A request for this step is outstanding.
    Pending(Step),
    /// The sequence is finished.
    Ready,
    /// Values for this step were recorded, but the step was not pending
    /// (peer-initiated update). The sequence did not move.
    ///
    /// A completion left over from an earlier link on the same handle
    /// also lands here, so the stack layer has to discard those when the
    /// link goes down.
    Unsolicited(Step),
    /// The completion named a link that no longer exists, or settled a
    /// step that was not pending.
    Ignored,
}

/// Drives the PHY → data length → MTU sequence.
#[derive(Debug, Default)]
pub struct ParameterNegotiator {
    plan: NegotiationPlan,
}

impl ParameterNegotiator {
    pub fn new(plan: NegotiationPlan) -> Self {
        Self { plan }
    }

    /// Begin the sequence for a link that has just connected.
    ///
    /// Runs once per connection: a link that has left `Connected` is
    /// rejected with [`NegotiationError::AlreadyStarted`].
    pub fn start<S: BleStack>(
        &self,
        conns: &mut ConnectionManager,
        stack: &mut S,
        handle: ConnHandle,
    ) -> Result<Progress, NegotiationError> {
        let state = conns
            .active()
            .filter(|c| c.handle() == handle)
            .map(|c| c.state())
            .ok_or(NegotiationError::NotConnected(handle))?;

        if state != LinkState::Connected {
            return Err(NegotiationError::AlreadyStarted(handle));
        }

        Ok(self.drive(conns, stack, handle, Some(Step::Phy)))
    }

    /// PHY update procedure finished.
    pub fn on_phy_updated<S: BleStack>(
        &self,
        conns: &mut ConnectionManager,
        stack: &mut S,
        handle: ConnHandle,
        status: HciStatus,
        tx: Phy,
        rx: Phy,
    ) -> Progress {
        self.complete(conns, stack, handle, Step::Phy, status, |p| {
            info!("PHY updated. TX: {}, RX: {}", tx.name(), rx.name());
            p.tx_phy = Some(tx);
            p.rx_phy = Some(rx);
        })
    }

    /// Data length update procedure finished. The controller reports no
    /// status for this one.
    pub fn on_data_length_updated<S: BleStack>(
        &self,
        conns: &mut ConnectionManager,
        stack: &mut S,
        handle: ConnHandle,
        info: DataLengthInfo,
    ) -> Progress {
        self.complete(conns, stack, handle, Step::DataLength, HCI_SUCCESS, |p| {
            info!(
                "Data length updated. Length {}/{} bytes, time {}/{} us",
                info.tx_max_len,
                info.rx_max_len,
                info.tx_max_time,
                info.rx_max_time
            );
            p.data_length = Some(info);
        })
    }

    /// ATT MTU exchange finished.
    pub fn on_mtu_exchanged<S: BleStack>(
        &self,
        conns: &mut ConnectionManager,
        stack: &mut S,
        handle: ConnHandle,
        status: HciStatus,
        mtu: u16,
    ) -> Progress {
        self.complete(conns, stack, handle, Step::Mtu, status, |p| {
            p.mtu = Some(mtu);
            info!(
                "MTU exchange done. New MTU {}, usable payload {} bytes",
                mtu,
                p.usable_payload()
            );
        })
    }

    /// The stack finished `step` but cannot report the resulting values.
    ///
    /// Advances the sequence if `step` is pending. Nothing is recorded, so
    /// the link keeps default values for it (23 byte MTU, unknown PHY and
    /// data length).
    pub fn on_step_settled<S: BleStack>(
        &self,
        conns: &mut ConnectionManager,
        stack: &mut S,
        handle: ConnHandle,
        step: Step,
    ) -> Progress {
        let Ok(pending) = conns.with_active(handle, |conn| conn.state() == step.pending_state())
        else {
            debug!("Stale {} settle for handle {}, ignored", step, handle);
            return Progress::Ignored;
        };

        if !pending {
            debug!("No {} pending on handle {}, settle ignored", step, handle);
            return Progress::Ignored;
        }

        info!("{} procedure settled on handle {}, outcome not reported", step, handle);
        self.drive(conns, stack, handle, step.next())
    }

    fn complete<S: BleStack>(
        &self,
        conns: &mut ConnectionManager,
        stack: &mut S,
        handle: ConnHandle,
        step: Step,
        status: HciStatus,
        record: impl FnOnce(&mut NegotiatedParams),
    ) -> Progress {
        let pending = conns.with_active(handle, |conn| {
            if status == HCI_SUCCESS {
                record(conn.params_mut());
            }
            conn.state() == step.pending_state()
        });

        let Ok(pending) = pending else {
            debug!("Stale {} completion for handle {}, ignored", step, handle);
            return Progress::Ignored;
        };

        if status != HCI_SUCCESS {
            let err = NegotiationError::Failed { step, status };
            warn!("{}", err);
        }

        if !pending {
            info!("Unsolicited {} update on handle {}", step, handle);
            return Progress::Unsolicited(step);
        }

        self.drive(conns, stack, handle, step.next())
    }

    /// Issue the first of `next` and its successors the stack accepts.
    /// Marks the link `Ready` once none are left.
    fn drive<S: BleStack>(
        &self,
        conns: &mut ConnectionManager,
        stack: &mut S,
        handle: ConnHandle,
        mut next: Option<Step>,
    ) -> Progress {
        while let Some(step) = next {
            match self.issue(stack, handle, step) {
                Ok(()) => {
                    return match conns.with_active(handle, |c| c.set_state(step.pending_state())) {
                        Ok(()) => Progress::Pending(step),
                        Err(_) => Progress::Ignored,
                    };
                }
                Err(err) => {
                    warn!("{}", err);
                    next = step.next();
                }
            }
        }

        match conns.with_active(handle, |c| {
            c.set_state(LinkState::Ready);
            c.params().usable_payload()
        }) {
            Ok(payload) => {
                info!(
                    "Link ready (handle {}), usable payload {} bytes",
                    handle, payload
                );
                Progress::Ready
            }
            Err(_) => Progress::Ignored,
        }
    }

    fn issue<S: BleStack>(
        &self,
        stack: &mut S,
        handle: ConnHandle,
        step: Step,
    ) -> Result<(), NegotiationError> {
        let res = match step {
            Step::Phy => stack.request_phy(handle, self.plan.phy),
            Step::DataLength => stack.request_data_length(handle, self.plan.data_length),
            Step::Mtu => stack.request_mtu(handle, self.plan.mtu),
        };
        res.map_err(|error| NegotiationError::Rejected { step, error })
    }
}

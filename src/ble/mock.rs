//! Recording [`BleStack`] for unit tests.

use std::vec::Vec;

use crate::ble::advertising::AdvertisingConfig;
use crate::ble::stack::{BleStack, ConnHandle, DataLengthParams, PhyPreference};
use crate::error::StackError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    StartAdvertising,
    StopAdvertising,
    Phy(ConnHandle, PhyPreference),
    DataLength(ConnHandle, DataLengthParams),
    Mtu(ConnHandle, u16),
    Notify(ConnHandle, Vec<u8>),
}

/// Records every request, including refused ones. Each kind of request
/// can be primed to fail until [`MockStack::accept_all`].
#[derive(Debug, Default)]
pub struct MockStack {
    requests: Vec<Request>,
    advertising: Option<StackError>,
    phy: Option<StackError>,
    data_length: Option<StackError>,
    mtu: Option<StackError>,
    notify: Option<StackError>,
}

impl MockStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> &[Request] {
        &self.requests
    }

    pub fn reject_advertising(&mut self, e: StackError) {
        self.advertising = Some(e);
    }

    pub fn reject_phy(&mut self, e: StackError) {
        self.phy = Some(e);
    }

    pub fn reject_data_length(&mut self, e: StackError) {
        self.data_length = Some(e);
    }

    pub fn reject_mtu(&mut self, e: StackError) {
        self.mtu = Some(e);
    }

    pub fn reject_notify(&mut self, e: StackError) {
        self.notify = Some(e);
    }

    pub fn accept_all(&mut self) {
        self.advertising = None;
        self.phy = None;
        self.data_length = None;
        self.mtu = None;
        self.notify = None;
    }

    fn record(&mut self, req: Request, verdict: Option<StackError>) -> Result<(), StackError> {
        self.requests.push(req);
        verdict.map_or(Ok(()), Err)
    }
}

impl BleStack for MockStack {
    fn start_advertising(&mut self, _config: &AdvertisingConfig) -> Result<(), StackError> {
        self.record(Request::StartAdvertising, self.advertising)
    }

    fn stop_advertising(&mut self) -> Result<(), StackError> {
        self.record(Request::StopAdvertising, self.advertising)
    }

    fn request_phy(&mut self, handle: ConnHandle, pref: PhyPreference) -> Result<(), StackError> {
        self.record(Request::Phy(handle, pref), self.phy)
    }

    fn request_data_length(
        &mut self,
        handle: ConnHandle,
        params: DataLengthParams,
    ) -> Result<(), StackError> {
        self.record(Request::DataLength(handle, params), self.data_length)
    }

    fn request_mtu(&mut self, handle: ConnHandle, mtu: u16) -> Result<(), StackError> {
        self.record(Request::Mtu(handle, mtu), self.mtu)
    }

    fn notify_button(&mut self, handle: ConnHandle, value: &[u8]) -> Result<(), StackError> {
        self.record(Request::Notify(handle, value.to_vec()), self.notify)
    }
}

//! Mock BLE stack for integration tests.
//!
//! Records every accepted write so tests can assert on the exact batch
//! history. Completions are delivered synchronously from inside the write
//! call unless the plan holds them back, which also proves that operations
//! subscribe before they write.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use gattqueue::ports::{GattLink, LinkProvider};
use gattqueue::{DeadObject, DescriptorId, DeviceAddress, GattCallback, LinkState, Uuid};

pub const ADDRESS: &str = "AA:BB:CC:DD:EE:01";

// ── Plans ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectMode {
    /// Report `Connected` straight away.
    Immediate,
    /// Accept the attempt but never report a state change.
    Never,
    /// `connect_gatt` returns `None`.
    Refuse,
}

#[derive(Debug, Clone, Copy)]
pub struct WritePlan {
    /// Auto-acknowledge only writes with index below this.
    pub ack_below: Option<usize>,
    /// Write index the stack refuses to start.
    pub refuse_at: Option<usize>,
    /// Write index at which the link is already dead.
    pub dead_at: Option<usize>,
    /// Status carried by completions.
    pub status: u8,
}

impl Default for WritePlan {
    fn default() -> Self {
        Self {
            ack_below: None,
            refuse_at: None,
            dead_at: None,
            status: 0,
        }
    }
}

// ── MockDevice ────────────────────────────────────────────────

pub struct MockDevice {
    address: DeviceAddress,
    mode: ConnectMode,
    plan: WritePlan,
    links: Mutex<Vec<Arc<MockLink>>>,
    callbacks: Mutex<Vec<GattCallback>>,
}

#[allow(dead_code)]
impl MockDevice {
    pub fn new(mode: ConnectMode, plan: WritePlan) -> Arc<Self> {
        Arc::new(Self {
            address: DeviceAddress::parse(ADDRESS).unwrap(),
            mode,
            plan,
            links: Mutex::new(Vec::new()),
            callbacks: Mutex::new(Vec::new()),
        })
    }

    pub fn ready() -> Arc<Self> {
        Self::new(ConnectMode::Immediate, WritePlan::default())
    }

    pub fn last_link(&self) -> Arc<MockLink> {
        self.links.lock().unwrap().last().cloned().expect("no link opened")
    }

    pub fn links(&self) -> Vec<Arc<MockLink>> {
        self.links.lock().unwrap().clone()
    }

    pub fn link_count(&self) -> usize {
        self.links.lock().unwrap().len()
    }

    pub fn connect_attempts(&self) -> usize {
        self.callbacks.lock().unwrap().len()
    }

    /// Report a link-level state change on the latest attempt.
    pub fn report_state(&self, status: u8, state: LinkState) {
        let callback = self.callbacks.lock().unwrap().last().cloned().expect("no attempt");
        callback.on_connection_state_change(status, state);
    }
}

impl LinkProvider for MockDevice {
    fn address(&self) -> &DeviceAddress {
        &self.address
    }

    fn connect_gatt(&self, callback: GattCallback, _auto_connect: bool) -> Option<Arc<dyn GattLink>> {
        self.callbacks.lock().unwrap().push(callback.clone());
        if self.mode == ConnectMode::Refuse {
            return None;
        }
        let link = Arc::new(MockLink {
            address: self.address.clone(),
            callback: callback.clone(),
            plan: self.plan,
            writes: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            read_value: Mutex::new(Vec::new()),
        });
        self.links.lock().unwrap().push(Arc::clone(&link));
        if self.mode == ConnectMode::Immediate {
            callback.on_connection_state_change(0, LinkState::Connected);
        }
        Some(link)
    }
}

// ── MockLink ──────────────────────────────────────────────────

pub struct MockLink {
    address: DeviceAddress,
    callback: GattCallback,
    plan: WritePlan,
    writes: Mutex<Vec<(Uuid, Vec<u8>)>>,
    attempts: AtomicUsize,
    disconnects: AtomicUsize,
    read_value: Mutex<Vec<u8>>,
}

#[allow(dead_code)]
impl MockLink {
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .map(|(_, v)| v.clone())
            .collect()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn set_read_value(&self, value: &[u8]) {
        *self.read_value.lock().unwrap() = value.to_vec();
    }

    /// Deliver the completion for a held write.
    pub fn ack(&self, index: usize) {
        let (uuid, value) = self.writes.lock().unwrap()[index].clone();
        self.callback
            .on_characteristic_write(uuid, &value, self.plan.status);
    }

    pub fn callback(&self) -> &GattCallback {
        &self.callback
    }
}

impl GattLink for MockLink {
    fn address(&self) -> &DeviceAddress {
        &self.address
    }

    fn write_characteristic(&self, characteristic: Uuid, value: &[u8]) -> Result<bool, DeadObject> {
        let index = self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.plan.dead_at == Some(index) {
            return Err(DeadObject);
        }
        if self.plan.refuse_at == Some(index) {
            return Ok(false);
        }
        self.writes
            .lock()
            .unwrap()
            .push((characteristic, value.to_vec()));
        if self.plan.ack_below.is_none_or(|n| index < n) {
            self.callback
                .on_characteristic_write(characteristic, value, self.plan.status);
        }
        Ok(true)
    }

    fn read_characteristic(&self, characteristic: Uuid) -> Result<bool, DeadObject> {
        let value = self.read_value.lock().unwrap().clone();
        self.callback
            .on_characteristic_read(characteristic, &value, self.plan.status);
        Ok(true)
    }

    fn write_descriptor(&self, descriptor: DescriptorId, value: &[u8]) -> Result<bool, DeadObject> {
        self.callback
            .on_descriptor_write(descriptor, value, self.plan.status);
        Ok(true)
    }

    fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

//! Loopback peripheral for simulation.
//!
//! Implements [`LinkProvider`] and [`GattLink`] without a radio. Every
//! accepted call is acknowledged through the [`GattCallback`] from a
//! separate thread after a fixed latency, the way a real stack reports
//! completions from its own threads. Characteristic writes are appended
//! to an in-memory store that reads return.

use core::time::Duration;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::trace;

use crate::error::DeadObject;
use crate::gatt::{DescriptorId, DeviceAddress, GATT_SUCCESS, GattCallback, LinkState, Uuid};
use crate::ports::{GattLink, LinkProvider};
use crate::sync::lock;

type Store = Arc<Mutex<HashMap<Uuid, Vec<u8>>>>;

/// A simulated device that always accepts connections.
pub struct LoopbackDevice {
    address: DeviceAddress,
    latency: Duration,
    store: Store,
}

impl LoopbackDevice {
    pub fn new(address: DeviceAddress, latency: Duration) -> Self {
        Self {
            address,
            latency,
            store: Store::default(),
        }
    }

    /// Bytes written so far to `characteristic`, across all links.
    pub fn stored(&self, characteristic: Uuid) -> Vec<u8> {
        lock(&self.store)
            .get(&characteristic)
            .cloned()
            .unwrap_or_default()
    }
}

impl LinkProvider for LoopbackDevice {
    fn address(&self) -> &DeviceAddress {
        &self.address
    }

    fn connect_gatt(&self, callback: GattCallback, _auto_connect: bool) -> Option<Arc<dyn GattLink>> {
        let link = Arc::new(LoopbackLink {
            address: self.address.clone(),
            latency: self.latency,
            store: Arc::clone(&self.store),
            callback,
            open: Arc::new(AtomicBool::new(true)),
        });
        link.later(|cb| cb.on_connection_state_change(GATT_SUCCESS, LinkState::Connected));
        Some(link)
    }
}

pub struct LoopbackLink {
    address: DeviceAddress,
    latency: Duration,
    store: Store,
    callback: GattCallback,
    open: Arc<AtomicBool>,
}

impl LoopbackLink {
    /// Deliver a callback after the configured latency, unless closed.
    fn later(&self, deliver: impl FnOnce(&GattCallback) + Send + 'static) {
        let callback = self.callback.clone();
        let latency = self.latency;
        let open = Arc::clone(&self.open);
        std::thread::spawn(move || {
            std::thread::sleep(latency);
            if open.load(Ordering::Acquire) {
                deliver(&callback);
            }
        });
    }

    fn check_open(&self) -> Result<(), DeadObject> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(DeadObject)
        }
    }
}

impl GattLink for LoopbackLink {
    fn address(&self) -> &DeviceAddress {
        &self.address
    }

    fn write_characteristic(&self, characteristic: Uuid, value: &[u8]) -> Result<bool, DeadObject> {
        self.check_open()?;
        trace!("loopback: write {} ({} bytes)", characteristic, value.len());
        lock(&self.store)
            .entry(characteristic)
            .or_default()
            .extend_from_slice(value);
        let echo = value.to_vec();
        self.later(move |cb| cb.on_characteristic_write(characteristic, &echo, GATT_SUCCESS));
        Ok(true)
    }

    fn read_characteristic(&self, characteristic: Uuid) -> Result<bool, DeadObject> {
        self.check_open()?;
        let value = lock(&self.store).get(&characteristic).cloned().unwrap_or_default();
        self.later(move |cb| cb.on_characteristic_read(characteristic, &value, GATT_SUCCESS));
        Ok(true)
    }

    fn write_descriptor(&self, descriptor: DescriptorId, value: &[u8]) -> Result<bool, DeadObject> {
        self.check_open()?;
        let echo = value.to_vec();
        self.later(move |cb| cb.on_descriptor_write(descriptor, &echo, GATT_SUCCESS));
        Ok(true)
    }

    fn disconnect(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            let callback = self.callback.clone();
            std::thread::spawn(move || {
                callback.on_connection_state_change(GATT_SUCCESS, LinkState::Disconnected);
            });
        }
    }
}

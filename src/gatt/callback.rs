//! GATT callback hub.
//!
//! The platform delivers completions on its own threads with nothing but
//! the target id and payload to identify them. The hub fans each one out
//! to every live [`GattListener`]; operations filter by target id. Each
//! listener also carries the connection's disconnect error, so a waiting
//! operation fails as soon as the link drops.

use std::sync::Arc;

use futures_lite::future;
use log::{debug, trace};

use super::types::{CharacteristicEvent, DescriptorEvent, DescriptorId, GATT_SUCCESS, LinkState, Uuid};
use crate::connection::disconnection::{DisconnectListener, DisconnectionRouter};
use crate::error::{BleError, GattOperation};
use crate::sync::{Broadcast, Listener};

struct CallbackHub {
    router: DisconnectionRouter,
    characteristic_write: Broadcast<CharacteristicEvent>,
    characteristic_read: Broadcast<CharacteristicEvent>,
    descriptor_write: Broadcast<DescriptorEvent>,
    connection_state: Broadcast<LinkState>,
}

/// Entry point for platform callbacks of one connection attempt.
#[derive(Clone)]
pub struct GattCallback {
    hub: Arc<CallbackHub>,
}

impl GattCallback {
    pub fn new(router: DisconnectionRouter) -> Self {
        Self {
            hub: Arc::new(CallbackHub {
                router,
                characteristic_write: Broadcast::new(),
                characteristic_read: Broadcast::new(),
                descriptor_write: Broadcast::new(),
                connection_state: Broadcast::new(),
            }),
        }
    }

    pub fn router(&self) -> &DisconnectionRouter {
        &self.hub.router
    }

    // ── Driver side ──────────────────────────────────────────

    pub fn on_characteristic_write(&self, uuid: Uuid, value: &[u8], status: u8) {
        trace!("{}: write cb {} len={} status={}", self.hub.router.address(), uuid, value.len(), status);
        self.hub.characteristic_write.publish(CharacteristicEvent {
            uuid,
            value: value.to_vec(),
            status,
        });
    }

    pub fn on_characteristic_read(&self, uuid: Uuid, value: &[u8], status: u8) {
        trace!("{}: read cb {} len={} status={}", self.hub.router.address(), uuid, value.len(), status);
        self.hub.characteristic_read.publish(CharacteristicEvent {
            uuid,
            value: value.to_vec(),
            status,
        });
    }

    pub fn on_descriptor_write(&self, descriptor: DescriptorId, value: &[u8], status: u8) {
        self.hub.descriptor_write.publish(DescriptorEvent {
            descriptor,
            value: value.to_vec(),
            status,
        });
    }

    /// A disconnecting/disconnected state, or a failure status in any
    /// other state, is routed to the disconnection router.
    pub fn on_connection_state_change(&self, status: u8, state: LinkState) {
        let address = self.hub.router.address().clone();
        debug!("{}: link state {:?} (status {})", address, state, status);
        self.hub.connection_state.publish(state);

        match state {
            LinkState::Disconnecting | LinkState::Disconnected => {
                let status = (status != GATT_SUCCESS).then_some(status);
                self.hub
                    .router
                    .on_disconnected(BleError::Disconnected { address, status });
            }
            _ if status != GATT_SUCCESS => {
                self.hub.router.on_disconnected(BleError::Gatt {
                    operation: GattOperation::Connect,
                    address,
                    status,
                });
            }
            _ => {}
        }
    }

    // ── Operation side ───────────────────────────────────────

    pub fn characteristic_writes(&self) -> GattListener<CharacteristicEvent> {
        self.listen(&self.hub.characteristic_write)
    }

    pub fn characteristic_reads(&self) -> GattListener<CharacteristicEvent> {
        self.listen(&self.hub.characteristic_read)
    }

    pub fn descriptor_writes(&self) -> GattListener<DescriptorEvent> {
        self.listen(&self.hub.descriptor_write)
    }

    pub fn connection_states(&self) -> GattListener<LinkState> {
        self.listen(&self.hub.connection_state)
    }

    fn listen<T: Clone + Send + 'static>(&self, events: &Broadcast<T>) -> GattListener<T> {
        GattListener {
            events: events.subscribe(),
            disconnect: self.hub.router.listen(),
        }
    }
}

/// A subscription to one callback kind, merged with the disconnect error.
pub struct GattListener<T> {
    events: Listener<T>,
    disconnect: DisconnectListener,
}

impl<T> GattListener<T> {
    /// Next event, or the connection's terminal error.
    pub async fn next(&self) -> Result<T, BleError> {
        future::or(async { Err(self.disconnect.wait().await) }, async {
            Ok(self.events.recv().await)
        })
        .await
    }
}

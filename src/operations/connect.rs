//! Connect operation, run on the client-wide queue.

use core::time::Duration;
use std::sync::{Arc, Mutex};

use log::{debug, info};

use crate::error::{BleError, GattOperation};
use crate::gatt::{GattCallback, LinkState};
use crate::ports::{GattLink, LinkProvider};
use crate::queue::{Operation, ReleasingEmitter};
use crate::runtime;
use crate::sync::lock;

#[derive(Default)]
enum SlotState {
    #[default]
    Empty,
    Open(Arc<dyn GattLink>),
    Closed,
}

/// Where a connection attempt parks its link once the stack hands it out,
/// so the disconnect path can close it even before the attempt finishes.
///
/// Closing is final: a link stored after [`LinkSlot::close`] is refused
/// and must be disconnected by whoever opened it.
#[derive(Default)]
pub struct LinkSlot {
    state: Mutex<SlotState>,
}

impl LinkSlot {
    /// Park `link`, or hand it back if the slot was already closed.
    pub fn store(&self, link: Arc<dyn GattLink>) -> Result<(), Arc<dyn GattLink>> {
        let mut state = lock(&self.state);
        if matches!(*state, SlotState::Closed) {
            return Err(link);
        }
        *state = SlotState::Open(link);
        Ok(())
    }

    /// Close the slot and take the parked link, if any.
    pub fn close(&self) -> Option<Arc<dyn GattLink>> {
        match core::mem::replace(&mut *lock(&self.state), SlotState::Closed) {
            SlotState::Open(link) => Some(link),
            SlotState::Empty | SlotState::Closed => None,
        }
    }
}

pub struct ConnectOperation {
    pub(crate) device: Arc<dyn LinkProvider>,
    pub(crate) callback: GattCallback,
    pub(crate) slot: Arc<LinkSlot>,
    pub(crate) auto_connect: bool,
    pub(crate) timeout: Duration,
}

impl Operation for ConnectOperation {
    type Output = Arc<dyn GattLink>;

    fn name(&self) -> &'static str {
        "Connect"
    }

    async fn run(self, emitter: ReleasingEmitter<Arc<dyn GattLink>>) -> Result<(), BleError> {
        let address = self.device.address().clone();
        let states = self.callback.connection_states();

        let Some(link) = self
            .device
            .connect_gatt(self.callback.clone(), self.auto_connect)
        else {
            return Err(BleError::CannotStart {
                operation: GattOperation::Connect,
                address,
            });
        };
        if let Err(link) = self.slot.store(Arc::clone(&link)) {
            debug!("{}: caller left while connecting, closing link", address);
            link.disconnect();
            return Err(BleError::disconnected(address));
        }

        let connected = async {
            loop {
                if states.next().await? == LinkState::Connected {
                    return Ok::<(), BleError>(());
                }
            }
        };
        if self.auto_connect {
            connected.await?;
        } else {
            runtime::timeout(self.timeout, connected)
                .await
                .map_err(|_| BleError::Timeout {
                    operation: GattOperation::Connect,
                    address: address.clone(),
                })??;
        }

        info!("{}: connected", address);
        emitter.next(link);
        emitter.complete();
        Ok(())
    }
}

//! Single-response GATT operations.
//!
//! Each one subscribes to its callback kind, starts the hardware call,
//! waits for the first completion on the same target and emits the value
//! it carries.

use core::time::Duration;
use std::sync::Arc;

use crate::error::{BleError, DeadObject, GattOperation};
use crate::gatt::{
    CharacteristicEvent, DescriptorEvent, DescriptorId, DeviceAddress, GATT_SUCCESS, GattCallback, GattListener,
    Uuid,
};
use crate::ports::GattLink;
use crate::queue::{Operation, ReleasingEmitter};
use crate::runtime;

/// A completion callback that carries a status and a value.
trait Completion {
    fn status(&self) -> u8;
    fn into_value(self) -> Vec<u8>;
}

impl Completion for CharacteristicEvent {
    fn status(&self) -> u8 {
        self.status
    }

    fn into_value(self) -> Vec<u8> {
        self.value
    }
}

impl Completion for DescriptorEvent {
    fn status(&self) -> u8 {
        self.status
    }

    fn into_value(self) -> Vec<u8> {
        self.value
    }
}

async fn single_response<E: Completion>(
    operation: GattOperation,
    address: &DeviceAddress,
    started: Result<bool, DeadObject>,
    listener: &GattListener<E>,
    is_target: impl Fn(&E) -> bool,
    limit: Duration,
) -> Result<Vec<u8>, BleError> {
    match started {
        Ok(true) => {}
        Ok(false) => {
            return Err(BleError::CannotStart {
                operation,
                address: address.clone(),
            });
        }
        Err(dead) => return Err(dead.into_error(address)),
    }

    let first_match = async {
        loop {
            let event = listener.next().await?;
            if is_target(&event) {
                return Ok(event);
            }
        }
    };
    let event = runtime::timeout(limit, first_match)
        .await
        .map_err(|_| BleError::Timeout {
            operation,
            address: address.clone(),
        })??;

    if event.status() != GATT_SUCCESS {
        return Err(BleError::Gatt {
            operation,
            address: address.clone(),
            status: event.status(),
        });
    }
    Ok(event.into_value())
}

// ── Characteristic write ─────────────────────────────────────

pub struct CharacteristicWrite {
    pub(crate) link: Arc<dyn GattLink>,
    pub(crate) callback: GattCallback,
    pub(crate) characteristic: Uuid,
    pub(crate) value: Vec<u8>,
    pub(crate) timeout: Duration,
}

impl Operation for CharacteristicWrite {
    type Output = Vec<u8>;

    fn name(&self) -> &'static str {
        "CharacteristicWrite"
    }

    async fn run(self, emitter: ReleasingEmitter<Vec<u8>>) -> Result<(), BleError> {
        let listener = self.callback.characteristic_writes();
        let started = self.link.write_characteristic(self.characteristic, &self.value);
        let value = single_response(
            GattOperation::CharacteristicWrite,
            self.link.address(),
            started,
            &listener,
            |e| e.uuid == self.characteristic,
            self.timeout,
        )
        .await?;
        emitter.next(value);
        emitter.complete();
        Ok(())
    }
}

// ── Characteristic read ──────────────────────────────────────

pub struct CharacteristicRead {
    pub(crate) link: Arc<dyn GattLink>,
    pub(crate) callback: GattCallback,
    pub(crate) characteristic: Uuid,
    pub(crate) timeout: Duration,
}

impl Operation for CharacteristicRead {
    type Output = Vec<u8>;

    fn name(&self) -> &'static str {
        "CharacteristicRead"
    }

    async fn run(self, emitter: ReleasingEmitter<Vec<u8>>) -> Result<(), BleError> {
        let listener = self.callback.characteristic_reads();
        let started = self.link.read_characteristic(self.characteristic);
        let value = single_response(
            GattOperation::CharacteristicRead,
            self.link.address(),
            started,
            &listener,
            |e| e.uuid == self.characteristic,
            self.timeout,
        )
        .await?;
        emitter.next(value);
        emitter.complete();
        Ok(())
    }
}

// ── Descriptor write ─────────────────────────────────────────

pub struct DescriptorWrite {
    pub(crate) link: Arc<dyn GattLink>,
    pub(crate) callback: GattCallback,
    pub(crate) descriptor: DescriptorId,
    pub(crate) value: Vec<u8>,
    pub(crate) timeout: Duration,
}

impl Operation for DescriptorWrite {
    type Output = Vec<u8>;

    fn name(&self) -> &'static str {
        "DescriptorWrite"
    }

    async fn run(self, emitter: ReleasingEmitter<Vec<u8>>) -> Result<(), BleError> {
        let listener = self.callback.descriptor_writes();
        let started = self.link.write_descriptor(self.descriptor, &self.value);
        let value = single_response(
            GattOperation::DescriptorWrite,
            self.link.address(),
            started,
            &listener,
            |e| e.descriptor == self.descriptor,
            self.timeout,
        )
        .await?;
        emitter.next(value);
        emitter.complete();
        Ok(())
    }
}

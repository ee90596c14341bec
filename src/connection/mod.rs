//! Connection handle, connector and disconnection routing.

pub mod connector;
pub mod disconnection;

use core::time::Duration;
use std::sync::Arc;

pub use connector::{ConnectionStream, Connector};
pub use disconnection::{DisconnectListener, DisconnectionRouter};

use crate::config::ClientConfig;
use crate::error::BleError;
use crate::gatt::{DescriptorId, DeviceAddress, GattCallback, Uuid};
use crate::operations::{
    AckStrategy, CharacteristicRead, CharacteristicWrite, DescriptorWrite, ImmediateAck, LongWriteOperation,
};
use crate::ports::GattLink;
use crate::queue::emitter;
use crate::queue::{Operation, OperationQueue, OperationStream};

/// Per-attempt connection options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionSetup {
    /// Let the stack connect whenever the device shows up, without the
    /// connect timeout.
    pub auto_connect: bool,
}

/// An established connection. Every call is routed through the
/// connection's own operation queue. Cheap to clone.
#[derive(Clone)]
pub struct Connection {
    link: Arc<dyn GattLink>,
    queue: Arc<OperationQueue>,
    callback: GattCallback,
    config: Arc<ClientConfig>,
}

impl Connection {
    pub(crate) fn new(
        link: Arc<dyn GattLink>,
        queue: Arc<OperationQueue>,
        callback: GattCallback,
        config: Arc<ClientConfig>,
    ) -> Self {
        Self {
            link,
            queue,
            callback,
            config,
        }
    }

    pub fn address(&self) -> &DeviceAddress {
        self.link.address()
    }

    /// Link handle for custom operations.
    pub fn link(&self) -> Arc<dyn GattLink> {
        Arc::clone(&self.link)
    }

    /// Callback hub for custom operations.
    pub fn callback(&self) -> &GattCallback {
        &self.callback
    }

    /// Queue a custom operation behind everything already queued.
    pub fn queue<O: Operation>(&self, operation: O) -> OperationStream<O::Output> {
        self.queue.queue(operation)
    }

    pub fn write_characteristic(&self, characteristic: Uuid, value: &[u8]) -> OperationStream<Vec<u8>> {
        self.queue.queue(CharacteristicWrite {
            link: self.link(),
            callback: self.callback.clone(),
            characteristic,
            value: value.to_vec(),
            timeout: self.config.operation_timeout(),
        })
    }

    pub fn read_characteristic(&self, characteristic: Uuid) -> OperationStream<Vec<u8>> {
        self.queue.queue(CharacteristicRead {
            link: self.link(),
            callback: self.callback.clone(),
            characteristic,
            timeout: self.config.operation_timeout(),
        })
    }

    pub fn write_descriptor(&self, descriptor: DescriptorId, value: &[u8]) -> OperationStream<Vec<u8>> {
        self.queue.queue(DescriptorWrite {
            link: self.link(),
            callback: self.callback.clone(),
            descriptor,
            value: value.to_vec(),
            timeout: self.config.operation_timeout(),
        })
    }

    pub fn long_write(&self) -> LongWriteBuilder<ImmediateAck> {
        LongWriteBuilder {
            connection: self.clone(),
            characteristic: None,
            payload: None,
            batch_size: None,
            strategy: ImmediateAck,
            timeout: None,
        }
    }
}

/// Builder for a chunked write. Characteristic and bytes are required.
pub struct LongWriteBuilder<S> {
    connection: Connection,
    characteristic: Option<Uuid>,
    payload: Option<Vec<u8>>,
    batch_size: Option<usize>,
    strategy: S,
    timeout: Option<Duration>,
}

impl<S: AckStrategy> LongWriteBuilder<S> {
    #[must_use]
    pub fn characteristic(mut self, characteristic: Uuid) -> Self {
        self.characteristic = Some(characteristic);
        self
    }

    #[must_use]
    pub fn bytes(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Defaults to the MTU payload size (`default_mtu - 3`).
    #[must_use]
    pub fn max_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Per-batch completion timeout. Defaults to the operation timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn ack_strategy<T: AckStrategy>(self, strategy: T) -> LongWriteBuilder<T> {
        LongWriteBuilder {
            connection: self.connection,
            characteristic: self.characteristic,
            payload: self.payload,
            batch_size: self.batch_size,
            strategy,
            timeout: self.timeout,
        }
    }

    /// Queue the write. Emits the whole payload once every batch is done.
    pub fn write(self) -> OperationStream<Vec<u8>> {
        let Some(characteristic) = self.characteristic else {
            return emitter::failed(BleError::InvalidArgument("long write needs a characteristic"));
        };
        let Some(payload) = self.payload else {
            return emitter::failed(BleError::InvalidArgument("long write needs bytes"));
        };
        let config = &self.connection.config;
        let operation = LongWriteOperation::new(
            self.connection.link(),
            self.connection.callback.clone(),
            characteristic,
            payload,
            self.batch_size.unwrap_or_else(|| config.default_batch_size()),
            self.strategy,
            self.timeout.unwrap_or_else(|| config.operation_timeout()),
        );
        self.connection.queue.queue(operation)
    }
}

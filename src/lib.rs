//! gattqueue: serialized BLE GATT operation queue.
//!
//! A BLE link accepts one GATT procedure at a time and reports completions
//! as uncorrelated callbacks on driver threads. This crate puts a queue in
//! front of the link so callers can issue work from any thread, routes each
//! completion back to the operation waiting for it, and tears everything
//! down exactly once when the link drops.
//!
//! ```text
//!  caller ──▶ Connection ──▶ OperationQueue ──▶ dispatch thread
//!                                                   │ one at a time
//!                                                   ▼
//!                       GattCallback ◀── GattLink (platform stack)
//!                            │
//!                  DisconnectionRouter ──▶ terminate queue
//! ```
//!
//! Platform bindings implement the traits in [`ports`]; the
//! [`adapters::loopback`] peripheral stands in for a radio on the host.

#![deny(unused_must_use)]

pub mod adapters;
pub mod config;
pub mod connection;
pub mod error;
pub mod gatt;
pub mod operations;
pub mod ports;
pub mod queue;
pub mod runtime;
pub mod sync;

pub use config::{ClientConfig, ConfigError};
pub use connection::{Connection, ConnectionSetup, ConnectionStream, Connector, DisconnectionRouter};
pub use error::{BleError, DeadObject, GattOperation};
pub use gatt::{DescriptorId, DeviceAddress, GattCallback, LinkState, Uuid};
pub use queue::{Operation, OperationQueue, OperationStream, Priority, ReleasingEmitter};

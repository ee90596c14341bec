//! Port traits: the boundary between the queue and the platform BLE stack.
//!
//! ```text
//!   Platform stack ──▶ GattLink / LinkProvider ──▶ operations
//!   Platform stack ──▶ GattCallback (completions) ──▶ listeners
//! ```
//!
//! Adapters implement these traits; the queue and its operations consume
//! them as trait objects and never touch the platform directly. The link
//! is only ever invoked from an executing operation.

use std::sync::Arc;

use crate::error::DeadObject;
use crate::gatt::{DescriptorId, DeviceAddress, GattCallback, Uuid};

// ───────────────────────────────────────────────────────────────
// Link port (driven adapter: operation → hardware)
// ───────────────────────────────────────────────────────────────

/// An open GATT link to one peripheral.
///
/// Every call only *starts* a procedure. `Ok(false)` means the stack
/// refused to start it; completion is reported later through the
/// [`GattCallback`] the link was opened with, at least once per accepted
/// call. `Err(DeadObject)` means the link is already gone.
pub trait GattLink: Send + Sync {
    fn address(&self) -> &DeviceAddress;

    fn write_characteristic(&self, characteristic: Uuid, value: &[u8]) -> Result<bool, DeadObject>;

    fn read_characteristic(&self, characteristic: Uuid) -> Result<bool, DeadObject>;

    fn write_descriptor(&self, descriptor: DescriptorId, value: &[u8]) -> Result<bool, DeadObject>;

    /// Close the link. The stack may or may not report the state change.
    fn disconnect(&self);
}

// ───────────────────────────────────────────────────────────────
// Link provider port (driven adapter: connector → hardware)
// ───────────────────────────────────────────────────────────────

/// A discovered peripheral that can be connected to.
pub trait LinkProvider: Send + Sync {
    fn address(&self) -> &DeviceAddress;

    /// Start connecting. Completion arrives as a connection-state callback.
    /// `None` if the stack refused to start.
    fn connect_gatt(&self, callback: GattCallback, auto_connect: bool) -> Option<Arc<dyn GattLink>>;
}

// ───────────────────────────────────────────────────────────────
// Lifecycle port (connection stream subscribe / unsubscribe)
// ───────────────────────────────────────────────────────────────

/// Observer of the connection stream's lifecycle. Each hook fires at most
/// once per connection attempt.
pub trait ConnectionWatcher: Send + Sync {
    fn on_connection_subscribed(&self);

    fn on_connection_unsubscribed(&self);
}

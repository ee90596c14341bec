//! Unified error type for the GATT operation queue.
//!
//! Every failure an operation can report funnels into [`BleError`]. Hardware
//! call failures are translated into one of these kinds at the point of
//! detection and delivered only to the originating operation's result stream.
//! All variants are `Clone` so a single terminal error can be handed to every
//! entry that was still queued when the connection went away.

use core::fmt;

use crate::gatt::DeviceAddress;

// ---------------------------------------------------------------------------
// Operation kinds
// ---------------------------------------------------------------------------

/// The GATT procedure an error relates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GattOperation {
    Connect,
    CharacteristicRead,
    CharacteristicWrite,
    CharacteristicLongWrite,
    DescriptorWrite,
}

impl fmt::Display for GattOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => write!(f, "CONNECTION_STATE"),
            Self::CharacteristicRead => write!(f, "CHARACTERISTIC_READ"),
            Self::CharacteristicWrite => write!(f, "CHARACTERISTIC_WRITE"),
            Self::CharacteristicLongWrite => write!(f, "CHARACTERISTIC_LONG_WRITE"),
            Self::DescriptorWrite => write!(f, "DESCRIPTOR_WRITE"),
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BleError {
    /// Invalid configuration; raised before any hardware interaction.
    InvalidArgument(&'static str),
    /// The link synchronously refused to start the call.
    CannotStart {
        operation: GattOperation,
        address: DeviceAddress,
    },
    /// No matching completion arrived within the configured window.
    Timeout {
        operation: GattOperation,
        address: DeviceAddress,
    },
    /// A completion arrived carrying a non-success GATT status.
    Gatt {
        operation: GattOperation,
        address: DeviceAddress,
        status: u8,
    },
    /// The link was lost. `status` is set when the stack reported one.
    Disconnected {
        address: DeviceAddress,
        status: Option<u8>,
    },
    /// The operation was queued or pending when the queue shut down.
    QueueTerminated,
    /// The acknowledgment strategy failed or stopped a write early.
    AckStrategy(&'static str),
    /// A result stream completed without emitting a value.
    NoValue,
}

impl BleError {
    /// Generic disconnect used when the caller walks away from a connection.
    pub fn disconnected(address: DeviceAddress) -> Self {
        Self::Disconnected {
            address,
            status: None,
        }
    }

    /// Whether this error means the link is gone.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Disconnected { .. })
    }
}

impl fmt::Display for BleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::CannotStart { operation, address } => {
                write!(f, "GATT {operation} could not be started on {address}")
            }
            Self::Timeout { operation, address } => {
                write!(f, "GATT {operation} callback timed out on {address}")
            }
            Self::Gatt {
                operation,
                address,
                status,
            } => write!(f, "GATT {operation} failed on {address} (status {status})"),
            Self::Disconnected {
                address,
                status: Some(status),
            } => write!(f, "disconnected from {address} (status {status})"),
            Self::Disconnected {
                address,
                status: None,
            } => write!(f, "disconnected from {address}"),
            Self::QueueTerminated => write!(f, "operation queue terminated"),
            Self::AckStrategy(msg) => write!(f, "write acknowledgment failed: {msg}"),
            Self::NoValue => write!(f, "operation completed without a value"),
        }
    }
}

impl std::error::Error for BleError {}

// ---------------------------------------------------------------------------
// Dead-object sentinel
// ---------------------------------------------------------------------------

/// Raised by a [`GattLink`](crate::ports::GattLink) when the platform reports
/// that the underlying link object is already dead.
///
/// Operations translate it into [`BleError::Disconnected`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadObject;

impl DeadObject {
    pub fn into_error(self, address: &DeviceAddress) -> BleError {
        BleError::disconnected(address.clone())
    }
}

impl fmt::Display for DeadObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link object is dead")
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, BleError>;

//! Client configuration parameters
//!
//! Timeouts, MTU and worker stack sizes for a [`Connector`](crate::connection::Connector).
//! Loaded from JSON by the simulator binary; every field has a default.

use core::fmt;
use core::time::Duration;

use serde::{Deserialize, Serialize};

/// Smallest ATT MTU a Bluetooth LE link may use.
pub const MIN_MTU: u16 = 23;

/// ATT write request header (opcode + handle).
pub const ATT_WRITE_HEADER: u16 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    // --- Timeouts ---
    /// Per-callback wait for GATT operations, and per batch for long writes
    pub operation_timeout_ms: u32,
    /// Wait for the link to come up (ignored with auto-connect)
    pub connect_timeout_ms: u32,

    // --- Link ---
    /// ATT MTU assumed until negotiated; sets the default long-write batch
    pub default_mtu: u16,

    // --- Threads ---
    /// Stack size of each dispatch thread (KB)
    pub queue_stack_kb: usize,
    /// Stack size of the callback context thread (KB)
    pub callback_stack_kb: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            operation_timeout_ms: 30_000,
            connect_timeout_ms: 35_000,

            default_mtu: MIN_MTU,

            queue_stack_kb: 64,
            callback_stack_kb: 128,
        }
    }
}

impl ClientConfig {
    /// Parse and validate a JSON document. Missing fields take defaults.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw).map_err(|_| ConfigError::Corrupted)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.operation_timeout_ms == 0 {
            return Err(ConfigError::ValidationFailed("operation_timeout_ms must be > 0"));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::ValidationFailed("connect_timeout_ms must be > 0"));
        }
        if self.default_mtu < MIN_MTU {
            return Err(ConfigError::ValidationFailed("default_mtu must be >= 23"));
        }
        if self.queue_stack_kb == 0 || self.callback_stack_kb == 0 {
            return Err(ConfigError::ValidationFailed("stack sizes must be > 0"));
        }
        Ok(())
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.operation_timeout_ms))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.connect_timeout_ms))
    }

    /// Largest payload that fits one ATT write at the default MTU.
    pub fn default_batch_size(&self) -> usize {
        usize::from(self.default_mtu.saturating_sub(ATT_WRITE_HEADER))
    }
}

/// Errors from loading or validating a [`ClientConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The document could not be deserialized.
    Corrupted,
    /// A field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

//! GATT value types shared by the link port, the callback hub and operations.

use core::fmt;

use crate::error::BleError;

/// Status code the stack reports for a successful GATT procedure.
pub const GATT_SUCCESS: u8 = 0;

// ── Identities ───────────────────────────────────────────────

/// 128-bit attribute UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uuid(pub u128);

impl Uuid {
    pub const fn from_u128(value: u128) -> Self {
        Self(value)
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.0;
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
            (v >> 96) as u32,
            (v >> 80) as u16,
            (v >> 64) as u16,
            (v >> 48) as u16,
            v & 0xffff_ffff_ffff
        )
    }
}

/// A descriptor is addressed through its parent characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorId {
    pub characteristic: Uuid,
    pub descriptor: Uuid,
}

const ADDRESS_LEN: usize = 17;

/// Bluetooth device address in `AA:BB:CC:DD:EE:FF` form (upper case).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceAddress(heapless::String<ADDRESS_LEN>);

impl DeviceAddress {
    /// Parse and normalise a colon-separated MAC address.
    pub fn parse(raw: &str) -> Result<Self, BleError> {
        const INVALID: BleError = BleError::InvalidArgument("device address must be AA:BB:CC:DD:EE:FF");

        if raw.len() != ADDRESS_LEN {
            return Err(INVALID);
        }
        let well_formed = raw.bytes().enumerate().all(|(i, b)| {
            if i % 3 == 2 {
                b == b':'
            } else {
                b.is_ascii_hexdigit()
            }
        });
        if !well_formed {
            return Err(INVALID);
        }

        let mut s = heapless::String::new();
        for c in raw.chars() {
            s.push(c.to_ascii_uppercase()).map_err(|()| INVALID)?;
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Callback payloads ────────────────────────────────────────

/// A characteristic read or write completion reported by the stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicEvent {
    pub uuid: Uuid,
    pub value: Vec<u8>,
    pub status: u8,
}

/// A descriptor write completion reported by the stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorEvent {
    pub descriptor: DescriptorId,
    pub value: Vec<u8>,
    pub status: u8,
}

/// Link-level connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
}

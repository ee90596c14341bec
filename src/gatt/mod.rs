//! GATT-level types and the platform callback hub.

pub mod callback;
pub mod types;

pub use callback::{GattCallback, GattListener};
pub use types::{
    CharacteristicEvent, DescriptorEvent, DescriptorId, DeviceAddress, GATT_SUCCESS, LinkState, Uuid,
};

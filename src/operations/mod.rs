//! Concrete queue operations.

pub mod ack;
pub mod connect;
pub mod gatt_ops;
pub mod long_write;

pub use ack::{AckDecision, AckStrategy, AckTrigger, ImmediateAck, TriggeredAck};
pub use connect::ConnectOperation;
pub use gatt_ops::{CharacteristicRead, CharacteristicWrite, DescriptorWrite};
pub use long_write::{BatchCursor, LongWriteOperation};

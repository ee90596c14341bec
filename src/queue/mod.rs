//! Serialized operation queue: priority FIFO, single-flight gate,
//! dispatch loop and the result sink connecting operations to callers.

pub mod dispatch;
pub mod emitter;
pub mod fifo;
pub mod gate;
pub mod operation;

pub use dispatch::OperationQueue;
pub use emitter::{Emitter, OperationStream, ReleasingEmitter};
pub use fifo::{EntryId, Priority, PriorityFifo};
pub use gate::QueueGate;
pub use operation::Operation;

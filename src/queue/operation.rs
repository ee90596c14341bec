//! Operation contract and the type-erased job the dispatch loop runs.

use core::future::Future;

use futures_lite::FutureExt;
use futures_lite::future::Boxed;

use super::emitter::{Emitter, ReleasingEmitter};
use super::fifo::Priority;
use super::gate::QueueGate;
use crate::error::BleError;

/// A unit of work against the hardware link.
///
/// The body must release the queue through its emitter once the hardware
/// interaction is fully resolved. Returning `Err` does that implicitly:
/// the error is delivered to the caller and the gate is released. A body
/// that drops every emitter clone without a terminal notification releases
/// the gate and fails the caller with [`BleError::QueueTerminated`].
pub trait Operation: Send + 'static {
    type Output: Send + 'static;

    /// Short name used in queue logs.
    fn name(&self) -> &'static str;

    fn priority(&self) -> Priority {
        Priority::Normal
    }

    fn run(
        self,
        emitter: ReleasingEmitter<Self::Output>,
    ) -> impl Future<Output = Result<(), BleError>> + Send;
}

/// Object-safe view of a queued operation.
pub(crate) trait Runnable: Send {
    fn name(&self) -> &'static str;

    /// The caller dropped its stream before the body started.
    fn is_disposed(&self) -> bool;

    fn start(self: Box<Self>, gate: QueueGate) -> Boxed<()>;

    /// Fail without running (queue shut down).
    fn reject(self: Box<Self>, error: BleError);
}

pub(crate) struct Job<O: Operation> {
    operation: O,
    emitter: Emitter<O::Output>,
}

impl<O: Operation> Job<O> {
    pub(crate) fn new(operation: O, emitter: Emitter<O::Output>) -> Self {
        Self { operation, emitter }
    }
}

impl<O: Operation> Runnable for Job<O> {
    fn name(&self) -> &'static str {
        self.operation.name()
    }

    fn is_disposed(&self) -> bool {
        self.emitter.is_disposed()
    }

    fn start(self: Box<Self>, gate: QueueGate) -> Boxed<()> {
        let Job { operation, emitter } = *self;
        let emitter = ReleasingEmitter::new(emitter, gate);
        async move {
            if let Err(error) = operation.run(emitter.clone()).await {
                emitter.error(error);
            }
        }
        .boxed()
    }

    fn reject(self: Box<Self>, error: BleError) {
        self.emitter.error(error);
    }
}

//! Result sink shared by an operation (producer) and its caller (consumer).
//!
//! ```text
//!   operation body                          caller
//!  ┌──────────────────┐  Next/Error/Complete  ┌────────────────┐
//!  │ ReleasingEmitter │─────────────────────▶│ OperationStream │
//!  │  └ QueueGate     │◀──── dispose ────────│  (drop)         │
//!  └──────────────────┘                       └────────────────┘
//! ```
//!
//! The sink accepts exactly one terminal notification. Dropping the
//! [`OperationStream`] disposes the sink: later emissions are discarded and
//! the cancel hook (if any) runs. The hook also runs on the terminal
//! notification, whichever comes first, and never more than once.
//!
//! Dropping the last producer handle without a terminal notification fails
//! the stream with [`BleError::QueueTerminated`], so an abandoned operation
//! body still ends its caller's wait.

use core::future::Future;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use futures_lite::future;

use super::gate::QueueGate;
use crate::error::BleError;
use crate::sync::lock;

enum Notification<T> {
    Next(T),
    Error(BleError),
    Complete,
}

type CancelHook = Box<dyn FnOnce() + Send>;

struct SinkState<T> {
    pending: VecDeque<Notification<T>>,
    terminated: bool,
    disposed: bool,
    on_cancel: Option<CancelHook>,
}

struct Sink<T> {
    state: Mutex<SinkState<T>>,
    producers: AtomicUsize,
    ready: Signal<CriticalSectionRawMutex, ()>,
    dispose: Signal<CriticalSectionRawMutex, ()>,
}

/// Create a connected producer/consumer pair.
pub fn channel<T>() -> (Emitter<T>, OperationStream<T>) {
    let sink = Arc::new(Sink {
        state: Mutex::new(SinkState {
            pending: VecDeque::new(),
            terminated: false,
            disposed: false,
            on_cancel: None,
        }),
        producers: AtomicUsize::new(1),
        ready: Signal::new(),
        dispose: Signal::new(),
    });
    (
        Emitter {
            sink: Arc::clone(&sink),
        },
        OperationStream {
            sink,
            finished: false,
        },
    )
}

/// A stream that has already failed with `error`.
pub fn failed<T>(error: BleError) -> OperationStream<T> {
    let (emitter, stream) = channel();
    emitter.error(error);
    stream
}

// ── Producer side ────────────────────────────────────────────

pub struct Emitter<T> {
    sink: Arc<Sink<T>>,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        self.sink.producers.fetch_add(1, Ordering::Relaxed);
        Self {
            sink: Arc::clone(&self.sink),
        }
    }
}

impl<T> Drop for Emitter<T> {
    fn drop(&mut self) {
        if self.sink.producers.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.terminate(Notification::Error(BleError::QueueTerminated));
        }
    }
}

impl<T> Emitter<T> {
    pub fn next(&self, value: T) {
        {
            let mut state = lock(&self.sink.state);
            if state.terminated || state.disposed {
                return;
            }
            state.pending.push_back(Notification::Next(value));
        }
        self.sink.ready.signal(());
    }

    pub fn complete(&self) {
        self.terminate(Notification::Complete);
    }

    pub fn error(&self, error: BleError) {
        self.terminate(Notification::Error(error));
    }

    fn terminate(&self, notification: Notification<T>) {
        let hook = {
            let mut state = lock(&self.sink.state);
            if state.terminated {
                return;
            }
            state.terminated = true;
            if !state.disposed {
                state.pending.push_back(notification);
            }
            state.on_cancel.take()
        };
        self.sink.ready.signal(());
        if let Some(hook) = hook {
            hook();
        }
    }

    /// Whether the consumer has dropped its stream.
    pub fn is_disposed(&self) -> bool {
        lock(&self.sink.state).disposed
    }

    pub fn is_terminated(&self) -> bool {
        lock(&self.sink.state).terminated
    }

    /// Resolves once the consumer drops its stream. One waiter at a time.
    pub async fn disposed(&self) {
        while !self.is_disposed() {
            self.sink.dispose.wait().await;
        }
    }

    /// Install the hook run on dispose or on the terminal notification.
    /// Runs immediately if either already happened.
    pub fn set_cancellable(&self, hook: impl FnOnce() + Send + 'static) {
        {
            let mut state = lock(&self.sink.state);
            if !state.terminated && !state.disposed {
                state.on_cancel = Some(Box::new(hook));
                return;
            }
        }
        hook();
    }
}

struct Releasing<T> {
    emitter: Emitter<T>,
    gate: QueueGate,
}

impl<T> Drop for Releasing<T> {
    fn drop(&mut self) {
        // Abandoned body: open the queue before the emitter fails the stream.
        self.gate.release();
    }
}

/// Emitter handed to a running operation. Terminal notifications release
/// the queue's gate before they are delivered.
///
/// Dropping every clone releases the gate too and, if no terminal
/// notification was sent, fails the caller with
/// [`BleError::QueueTerminated`].
pub struct ReleasingEmitter<T> {
    inner: Arc<Releasing<T>>,
}

impl<T> Clone for ReleasingEmitter<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> ReleasingEmitter<T> {
    pub fn new(emitter: Emitter<T>, gate: QueueGate) -> Self {
        Self {
            inner: Arc::new(Releasing { emitter, gate }),
        }
    }

    pub fn next(&self, value: T) {
        self.inner.emitter.next(value);
    }

    pub fn complete(&self) {
        self.inner.gate.release();
        self.inner.emitter.complete();
    }

    pub fn error(&self, error: BleError) {
        self.inner.gate.release();
        self.inner.emitter.error(error);
    }

    /// Release the queue without notifying the caller.
    pub fn release(&self) {
        self.inner.gate.release();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.emitter.is_disposed()
    }

    pub async fn disposed(&self) {
        self.inner.emitter.disposed().await;
    }

    /// Run `fut` unless the caller detaches first, in which case `None`.
    pub async fn or_disposed<F: Future>(&self, fut: F) -> Option<F::Output> {
        future::or(
            async {
                self.disposed().await;
                None
            },
            async { Some(fut.await) },
        )
        .await
    }
}

// ── Consumer side ────────────────────────────────────────────

/// Caller's view of a queued operation. Dropping it cancels the operation
/// if it has not started yet, and stops delivery if it has.
pub struct OperationStream<T> {
    sink: Arc<Sink<T>>,
    finished: bool,
}

impl<T> OperationStream<T> {
    /// Next value; `Some(Err)` on failure, `None` once complete.
    pub async fn next(&mut self) -> Option<Result<T, BleError>> {
        if self.finished {
            return None;
        }
        loop {
            let notification = lock(&self.sink.state).pending.pop_front();
            match notification {
                Some(Notification::Next(value)) => return Some(Ok(value)),
                Some(Notification::Error(error)) => {
                    self.finished = true;
                    return Some(Err(error));
                }
                Some(Notification::Complete) => {
                    self.finished = true;
                    return None;
                }
                None => self.sink.ready.wait().await,
            }
        }
    }

    /// First value; fails with [`BleError::NoValue`] if the operation
    /// completes without emitting.
    pub async fn first(mut self) -> Result<T, BleError> {
        match self.next().await {
            Some(result) => result,
            None => Err(BleError::NoValue),
        }
    }

    pub fn blocking_next(&mut self) -> Option<Result<T, BleError>> {
        future::block_on(self.next())
    }

    pub fn blocking_first(self) -> Result<T, BleError> {
        future::block_on(self.first())
    }

    /// Whether a terminal notification has been delivered or is pending.
    pub fn is_terminated(&self) -> bool {
        self.finished || lock(&self.sink.state).terminated
    }
}

impl<T> Drop for OperationStream<T> {
    fn drop(&mut self) {
        let hook = {
            let mut state = lock(&self.sink.state);
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.pending.clear();
            state.on_cancel.take()
        };
        self.sink.dispose.signal(());
        if let Some(hook) = hook {
            hook();
        }
    }
}

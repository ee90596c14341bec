//! Operation queue and its dispatch loop.
//!
//! ```text
//!  queue(op) ──▶ PriorityFifo ──take()──▶ dispatch thread
//!                    ▲                       │ STARTED
//!    drop stream ────┘ remove(id)            ▼
//!                                  callback context runs body
//!                                            │ emitter.complete/error
//!                                            ▼
//!                                   QueueGate released ── FINISHED ──┐
//!                                            ▲                       │
//!                                            └──────── loop ◀───────┘
//! ```
//!
//! The dispatch thread owns the consuming side. Entries, the running flag
//! and the terminal error live under one mutex, so an entry added while
//! the queue shuts down is either drained or rejected, never lost.

use std::sync::{Arc, Mutex, Weak};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use futures_lite::future;
use log::{debug, info};

use super::emitter::{self, OperationStream};
use super::fifo::{EntryId, PriorityFifo};
use super::gate::QueueGate;
use super::operation::{Job, Operation, Runnable};
use crate::connection::disconnection::DisconnectionRouter;
use crate::error::BleError;
use crate::ports::ConnectionWatcher;
use crate::runtime::{CallbackContext, spawn_worker};
use crate::sync::{CallbackGuard, lock};

struct QueueState {
    entries: PriorityFifo<Box<dyn Runnable>>,
    running: bool,
    terminal: Option<BleError>,
    disconnect_guard: Option<CallbackGuard<BleError>>,
}

struct Shared {
    label: String,
    state: Mutex<QueueState>,
    wake: Signal<CriticalSectionRawMutex, ()>,
    router: Option<DisconnectionRouter>,
}

impl Shared {
    fn terminate(&self, error: BleError) -> bool {
        let guard = {
            let mut state = lock(&self.state);
            if !state.running {
                return false;
            }
            state.running = false;
            state.terminal = Some(error.clone());
            state.disconnect_guard.take()
        };
        drop(guard);
        info!("Queue {} terminated: {}", self.label, error);
        self.wake.signal(());
        true
    }

    fn is_running(&self) -> bool {
        lock(&self.state).running
    }

    /// Wait for the next entry; `None` once terminated.
    async fn take(&self) -> Option<(EntryId, Box<dyn Runnable>)> {
        loop {
            {
                let mut state = lock(&self.state);
                if !state.running {
                    return None;
                }
                if let Some(entry) = state.entries.pop() {
                    return Some(entry);
                }
            }
            self.wake.wait().await;
        }
    }

    async fn stopped(&self) {
        while self.is_running() {
            self.wake.wait().await;
        }
    }

    fn flush(&self) {
        let (error, entries) = {
            let mut state = lock(&self.state);
            let error = state.terminal.clone().unwrap_or(BleError::QueueTerminated);
            (error, state.entries.drain())
        };
        for (id, job) in entries {
            debug!("{:>8} {}({})", "REMOVED", job.name(), id);
            job.reject(error.clone());
        }
    }
}

/// Serializes operations against one hardware link.
///
/// At most one operation executes at a time; the next starts only once
/// the previous one has released its gate. Dropping the queue terminates
/// it with [`BleError::QueueTerminated`].
pub struct OperationQueue {
    shared: Arc<Shared>,
}

impl OperationQueue {
    /// A queue not tied to any connection (client-wide connect queue).
    pub fn new(label: impl Into<String>, context: CallbackContext, stack_kb: usize) -> Self {
        Self::start(label.into(), None, context, stack_kb)
    }

    /// The queue of one connection. It arms itself on `router` when the
    /// connection stream is subscribed.
    pub fn for_connection(router: DisconnectionRouter, context: CallbackContext, stack_kb: usize) -> Self {
        let label = router.address().to_string();
        Self::start(label, Some(router), context, stack_kb)
    }

    fn start(
        label: String,
        router: Option<DisconnectionRouter>,
        context: CallbackContext,
        stack_kb: usize,
    ) -> Self {
        let shared = Arc::new(Shared {
            label,
            state: Mutex::new(QueueState {
                entries: PriorityFifo::new(),
                running: true,
                terminal: None,
                disconnect_guard: None,
            }),
            wake: Signal::new(),
            router,
        });

        let worker = Arc::clone(&shared);
        spawn_worker(format!("gattq-{}", shared.label), stack_kb, move || {
            future::block_on(dispatch_loop(&worker, &context));
        });

        Self { shared }
    }

    /// Enqueue `operation`. Fails immediately with the recorded terminal
    /// error once the queue has stopped. Dropping the returned stream
    /// before the operation starts removes it from the queue.
    pub fn queue<O: Operation>(&self, operation: O) -> OperationStream<O::Output> {
        let (tx, rx) = emitter::channel();
        let name = operation.name();
        let priority = operation.priority();

        let id = {
            let mut state = lock(&self.shared.state);
            if !state.running {
                let error = state.terminal.clone().unwrap_or(BleError::QueueTerminated);
                drop(state);
                tx.error(error);
                return rx;
            }
            state
                .entries
                .add(priority, Box::new(Job::new(operation, tx.clone())))
        };
        debug!("{:>8} {}({})", "QUEUED", name, id);

        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        tx.set_cancellable(move || {
            let Some(shared) = weak.upgrade() else { return };
            let removed = lock(&shared.state).entries.remove(id);
            if removed.is_some() {
                debug!("{:>8} {}({})", "REMOVED", name, id);
            }
        });

        self.shared.wake.signal(());
        rx
    }

    /// Stop the queue. The first call wins; later calls are ignored.
    /// Every entry still waiting receives the recorded error.
    pub fn terminate(&self, error: BleError) -> bool {
        self.shared.terminate(error)
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    pub fn terminal_error(&self) -> Option<BleError> {
        lock(&self.shared.state).terminal.clone()
    }

    pub fn pending(&self) -> usize {
        lock(&self.shared.state).entries.len()
    }
}

impl Drop for OperationQueue {
    fn drop(&mut self) {
        self.shared.terminate(BleError::QueueTerminated);
    }
}

impl ConnectionWatcher for OperationQueue {
    fn on_connection_subscribed(&self) {
        let Some(router) = &self.shared.router else {
            return;
        };
        let weak = Arc::downgrade(&self.shared);
        let guard = router.on_error(move |error| {
            if let Some(shared) = weak.upgrade() {
                shared.terminate(error.clone());
            }
        });
        let mut state = lock(&self.shared.state);
        if state.running {
            state.disconnect_guard = Some(guard);
        }
    }

    fn on_connection_unsubscribed(&self) {
        let guard = lock(&self.shared.state).disconnect_guard.take();
        drop(guard);
        let error = match &self.shared.router {
            Some(router) => BleError::disconnected(router.address().clone()),
            None => BleError::QueueTerminated,
        };
        self.shared.terminate(error);
    }
}

async fn dispatch_loop(shared: &Shared, context: &CallbackContext) {
    while let Some((id, job)) = shared.take().await {
        let name = job.name();
        if job.is_disposed() {
            debug!("{:>8} {}({})", "SKIPPED", name, id);
            continue;
        }

        debug!("{:>8} {}({})", "STARTED", name, id);
        let gate = QueueGate::new();
        context.spawn(job.start(gate.clone()));

        let finished = future::or(
            async {
                gate.released().await;
                true
            },
            async {
                shared.stopped().await;
                false
            },
        )
        .await;

        if finished {
            debug!("{:>8} {}({})", "FINISHED", name, id);
        }
    }

    shared.flush();
    debug!("Queue {} dispatch loop exited", shared.label);
}

//! Worker threads, the callback context and timeouts.
//!
//! ```text
//!  any thread                      gattq-callbacks thread
//!  ┌──────────────┐  try_send  ┌───────────────────────────────────┐
//!  │ spawn(fut)   │──────────▶│ INBOX (embassy Channel)           │
//!  └──────────────┘            │   │ admitted while live < CAP     │
//!                              │   ▼                               │
//!                              │ edge_executor::LocalExecutor<CAP> │
//!                              │   op bodies, connection tasks     │
//!                              └───────────────────────────────────┘
//! ```
//!
//! Operation bodies and connection lifecycle tasks are submitted from any
//! thread and run concurrently on the one context thread, never on a
//! caller's thread. The inbox only hands a task to the executor while
//! fewer than [`CONTEXT_TASKS`] are alive, so the executor's run queue
//! can never overflow. When the last handle drops, the thread stops
//! accepting work and exits once every admitted task has finished.

use core::cell::Cell;
use core::future::Future;
use core::time::Duration;
use std::rc::Rc;
use std::sync::Arc;
use std::thread::{JoinHandle, ThreadId};

use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, NoopRawMutex};
use embassy_sync::channel::{Channel, TrySendError};
use embassy_sync::signal::Signal;
use futures_lite::FutureExt;
use futures_lite::future::{self, Boxed};
use log::{debug, info, warn};

/// Tasks alive on the context at once. Also the executor's queue size.
pub const CONTEXT_TASKS: usize = 64;

/// Submitted tasks waiting for an executor slot.
const INBOX_DEPTH: usize = 32;

/// Spawn a named worker thread with an explicit stack size.
pub fn spawn_worker(
    name: String,
    stack_kb: usize,
    f: impl FnOnce() + Send + 'static,
) -> JoinHandle<()> {
    debug!("Spawning '{}' (stack={}KB)", name, stack_kb);
    std::thread::Builder::new()
        .name(name)
        .stack_size(stack_kb * 1024)
        .spawn(f)
        .expect("spawn_worker: thread creation failed")
}

// ── Callback context ─────────────────────────────────────────

struct Inbox {
    tasks: Channel<CriticalSectionRawMutex, Boxed<()>, INBOX_DEPTH>,
    closed: Signal<CriticalSectionRawMutex, ()>,
}

struct ContextInner {
    inbox: Arc<Inbox>,
    thread: ThreadId,
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        self.inbox.closed.signal(());
    }
}

/// Handle to the executor thread running operation bodies.
///
/// Cloning shares the thread. It exits when the last handle drops and
/// every task it already accepted has run to completion.
#[derive(Clone)]
pub struct CallbackContext {
    inner: Arc<ContextInner>,
}

impl CallbackContext {
    pub fn new(stack_kb: usize) -> Self {
        let inbox = Arc::new(Inbox {
            tasks: Channel::new(),
            closed: Signal::new(),
        });
        let worker_inbox = Arc::clone(&inbox);
        let handle = spawn_worker("gattq-callbacks".into(), stack_kb, move || {
            run_context(&worker_inbox);
        });
        Self {
            inner: Arc::new(ContextInner {
                inbox,
                thread: handle.thread().id(),
            }),
        }
    }

    /// Whether the caller is running on the context thread.
    pub fn is_current(&self) -> bool {
        std::thread::current().id() == self.inner.thread
    }

    /// Run `fut` on the context thread. The task is detached.
    ///
    /// A full inbox blocks the calling thread until the context catches
    /// up. On the context thread itself the task is dropped instead, which
    /// fails any operation stream it was driving.
    pub fn spawn(&self, fut: impl Future<Output = ()> + Send + 'static) {
        let tasks = &self.inner.inbox.tasks;
        let Err(TrySendError::Full(task)) = tasks.try_send(fut.boxed()) else {
            return;
        };
        if self.is_current() {
            warn!("Callback context: inbox full, dropping task");
            return;
        }
        warn!("Callback context: inbox full, waiting for room");
        future::block_on(tasks.send(task));
    }

    /// Run `f` on the context thread: inline when already there,
    /// otherwise as a task.
    pub fn execute(&self, f: impl FnOnce() + Send + 'static) {
        if self.is_current() {
            f();
        } else {
            self.spawn(async move { f() });
        }
    }
}

// ── Executor slots ───────────────────────────────────────────

struct Slots {
    live: Cell<usize>,
    freed: Signal<NoopRawMutex, ()>,
}

impl Slots {
    async fn room(&self) {
        while self.live.get() >= CONTEXT_TASKS {
            self.freed.wait().await;
        }
    }

    async fn drained(&self) {
        while self.live.get() > 0 {
            self.freed.wait().await;
        }
    }
}

/// Held by a running task; frees its slot on completion or drop.
struct SlotToken(Rc<Slots>);

impl SlotToken {
    fn acquire(slots: &Rc<Slots>) -> Self {
        slots.live.set(slots.live.get() + 1);
        Self(Rc::clone(slots))
    }
}

impl Drop for SlotToken {
    fn drop(&mut self) {
        self.0.live.set(self.0.live.get() - 1);
        self.0.freed.signal(());
    }
}

fn run_context(inbox: &Inbox) {
    let executor: edge_executor::LocalExecutor<'static, CONTEXT_TASKS> =
        edge_executor::LocalExecutor::new();
    let slots = Rc::new(Slots {
        live: Cell::new(0),
        freed: Signal::new(),
    });

    let admit = |task: Boxed<()>| {
        let token = SlotToken::acquire(&slots);
        executor
            .spawn(async move {
                let _token = token;
                task.await;
            })
            .detach();
    };

    future::block_on(executor.run(async {
        loop {
            slots.room().await;
            let next = future::or(async { Some(inbox.tasks.receive().await) }, async {
                inbox.closed.wait().await;
                None
            })
            .await;
            match next {
                Some(task) => admit(task),
                None => break,
            }
        }

        // Nothing new can arrive once the last handle is gone.
        while let Ok(task) = inbox.tasks.try_receive() {
            slots.room().await;
            admit(task);
        }
        if slots.live.get() > 0 {
            debug!("Callback context draining {} task(s)", slots.live.get());
        }
        slots.drained().await;
    }));
    info!("Callback context stopped");
}

// ── Timeouts ─────────────────────────────────────────────────

/// The wrapped future did not resolve in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elapsed;

/// Resolve `fut` or fail with [`Elapsed`] after `limit`.
pub async fn timeout<F: Future>(limit: Duration, fut: F) -> Result<F::Output, Elapsed> {
    let micros = u64::try_from(limit.as_micros()).unwrap_or(u64::MAX);
    embassy_time::with_timeout(embassy_time::Duration::from_micros(micros), fut)
        .await
        .map_err(|_| Elapsed)
}

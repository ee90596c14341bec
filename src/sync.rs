//! Cross-thread fan-out primitives.
//!
//! Hardware callbacks arrive on arbitrary driver threads while their
//! consumers are futures running on the callback context. Every consumer
//! owns a bounded embassy [`Channel`] and a [`Broadcast`] copies each value
//! into all of them with `try_send`, so a publisher never blocks on a slow
//! listener.
//!
//! ```text
//!   driver thread               callback context
//!  ┌──────────────┐  publish   ┌───────────────────┐
//!  │ GattCallback │──┬───────▶│ Listener (op A)   │
//!  └──────────────┘  ├───────▶│ Listener (op B)   │
//!                    └──▶ Fn  │ (router hooks)    │
//!                             └───────────────────┘
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::warn;

/// Values a listener may hold before new ones are dropped.
pub const LISTENER_DEPTH: usize = 16;

type Inbox<T> = Channel<CriticalSectionRawMutex, T, LISTENER_DEPTH>;

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Broadcast ────────────────────────────────────────────────

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(u64, Arc<Inbox<T>>)>>,
    callbacks: Mutex<Vec<(u64, Callback<T>)>>,
}

/// Multi-consumer fan-out of values published from any thread.
///
/// Values published before a listener subscribes are not replayed.
pub struct Broadcast<T> {
    registry: Arc<Registry<T>>,
}

impl<T> Clone for Broadcast<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<T: Clone + Send + 'static> Broadcast<T> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry {
                next_id: AtomicU64::new(0),
                listeners: Mutex::new(Vec::new()),
                callbacks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Deliver `value` to every live listener and callback.
    ///
    /// Delivery happens outside the registry locks, so a callback may
    /// subscribe or unsubscribe without deadlocking.
    pub fn publish(&self, value: T) {
        let inboxes: Vec<_> = lock(&self.registry.listeners)
            .iter()
            .map(|(id, inbox)| (*id, Arc::clone(inbox)))
            .collect();
        let callbacks: Vec<_> = lock(&self.registry.callbacks)
            .iter()
            .map(|(_, f)| Arc::clone(f))
            .collect();

        for (id, inbox) in inboxes {
            if inbox.try_send(value.clone()).is_err() {
                warn!("Broadcast: listener {} full, dropping value", id);
            }
        }
        for callback in callbacks {
            callback(&value);
        }
    }

    pub fn subscribe(&self) -> Listener<T> {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let inbox = Arc::new(Channel::new());
        lock(&self.registry.listeners).push((id, Arc::clone(&inbox)));
        Listener {
            id,
            inbox,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Register a synchronous callback, removed when the guard drops.
    pub fn on_value(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> CallbackGuard<T> {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.registry.callbacks).push((id, Arc::new(callback)));
        CallbackGuard {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.registry.listeners).len() + lock(&self.registry.callbacks).len()
    }
}

impl<T: Clone + Send + 'static> Default for Broadcast<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving end of a [`Broadcast`] subscription.
pub struct Listener<T> {
    id: u64,
    inbox: Arc<Inbox<T>>,
    registry: Weak<Registry<T>>,
}

impl<T> Listener<T> {
    /// Wait for the next value. Only one task may wait at a time.
    pub async fn recv(&self) -> T {
        self.inbox.receive().await
    }

    pub fn try_recv(&self) -> Option<T> {
        self.inbox.try_receive().ok()
    }
}

impl<T> Drop for Listener<T> {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry.listeners).retain(|(id, _)| *id != self.id);
        }
    }
}

/// Keeps a [`Broadcast::on_value`] callback registered.
pub struct CallbackGuard<T> {
    id: u64,
    registry: Weak<Registry<T>>,
}

impl<T> Drop for CallbackGuard<T> {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry.callbacks).retain(|(id, _)| *id != self.id);
        }
    }
}

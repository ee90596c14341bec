//! Single-flight gate between the dispatch loop and a running operation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

struct GateState {
    released: AtomicBool,
    signal: Signal<CriticalSectionRawMutex, ()>,
}

/// One-shot release signal. A fresh gate is armed for every dispatched
/// operation; only the first [`release`](Self::release) has an effect.
#[derive(Clone)]
pub struct QueueGate {
    state: Arc<GateState>,
}

impl QueueGate {
    pub fn new() -> Self {
        Self {
            state: Arc::new(GateState {
                released: AtomicBool::new(false),
                signal: Signal::new(),
            }),
        }
    }

    /// Returns `true` only for the call that actually released the gate.
    pub fn release(&self) -> bool {
        if self.state.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.state.signal.signal(());
        true
    }

    pub fn is_released(&self) -> bool {
        self.state.released.load(Ordering::Acquire)
    }

    /// Wait until released. Intended for the dispatch loop only.
    pub async fn released(&self) {
        while !self.is_released() {
            self.state.signal.wait().await;
        }
    }
}

impl Default for QueueGate {
    fn default() -> Self {
        Self::new()
    }
}

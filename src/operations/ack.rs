//! Acknowledgment strategies for the chunked long write.
//!
//! After every batch completion the long write asks its strategy whether
//! to send the next batch. [`ImmediateAck`] always continues; a
//! [`TriggeredAck`] waits for the application to grant each batch through
//! its [`AckTrigger`] (e.g. after the peripheral confirms over a separate
//! notification channel).

use core::future::Future;
use std::sync::{Arc, Mutex};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

use crate::error::BleError;
use crate::sync::lock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckDecision {
    /// Send the next batch.
    Continue,
    /// Send nothing more.
    Stop,
}

/// Decides how the long write proceeds after each batch completion.
pub trait AckStrategy: Send + 'static {
    /// Called once per completed batch. `has_remaining` is `false` for the
    /// final batch.
    fn on_batch_written(
        &mut self,
        has_remaining: bool,
    ) -> impl Future<Output = Result<AckDecision, BleError>> + Send;
}

/// Continue as soon as the completion callback arrives.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateAck;

impl AckStrategy for ImmediateAck {
    async fn on_batch_written(&mut self, _has_remaining: bool) -> Result<AckDecision, BleError> {
        Ok(AckDecision::Continue)
    }
}

// ── Externally triggered ─────────────────────────────────────

#[derive(Default)]
struct TriggerState {
    credits: usize,
    stopped: bool,
    failure: Option<&'static str>,
}

struct TriggerShared {
    state: Mutex<TriggerState>,
    changed: Signal<CriticalSectionRawMutex, ()>,
}

/// Application-side handle driving a [`TriggeredAck`].
#[derive(Clone)]
pub struct AckTrigger {
    shared: Arc<TriggerShared>,
}

impl AckTrigger {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(TriggerShared {
                state: Mutex::new(TriggerState::default()),
                changed: Signal::new(),
            }),
        }
    }

    /// Grant one more batch. Grants may arrive before they are needed.
    pub fn acknowledge(&self) {
        lock(&self.shared.state).credits += 1;
        self.shared.changed.signal(());
    }

    pub fn stop(&self) {
        lock(&self.shared.state).stopped = true;
        self.shared.changed.signal(());
    }

    /// Fail the write with [`BleError::AckStrategy`].
    pub fn fail(&self, reason: &'static str) {
        {
            let mut state = lock(&self.shared.state);
            if state.failure.is_none() {
                state.failure = Some(reason);
            }
        }
        self.shared.changed.signal(());
    }

    pub fn strategy(&self) -> TriggeredAck {
        TriggeredAck {
            trigger: self.clone(),
        }
    }
}

impl Default for AckTrigger {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits for one [`AckTrigger::acknowledge`] per intermediate batch.
pub struct TriggeredAck {
    trigger: AckTrigger,
}

impl TriggeredAck {
    fn poll_state(&self) -> Option<Result<AckDecision, BleError>> {
        let mut state = lock(&self.trigger.shared.state);
        if let Some(reason) = state.failure {
            return Some(Err(BleError::AckStrategy(reason)));
        }
        if state.stopped {
            return Some(Ok(AckDecision::Stop));
        }
        if state.credits > 0 {
            state.credits -= 1;
            return Some(Ok(AckDecision::Continue));
        }
        None
    }
}

impl AckStrategy for TriggeredAck {
    async fn on_batch_written(&mut self, has_remaining: bool) -> Result<AckDecision, BleError> {
        if !has_remaining {
            return Ok(AckDecision::Continue);
        }
        loop {
            if let Some(decision) = self.poll_state() {
                return decision;
            }
            self.trigger.shared.changed.wait().await;
        }
    }
}

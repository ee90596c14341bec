//! Disconnection router: the single terminal-error broadcast point of a
//! connection.
//!
//! The first error reported wins and is latched. Every hook registered
//! with [`DisconnectionRouter::on_error`] and every listener created with
//! [`DisconnectionRouter::listen`] observes it exactly once, including
//! those that register after the fact.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::info;

use crate::error::BleError;
use crate::gatt::DeviceAddress;
use crate::sync::{Broadcast, CallbackGuard, Listener, lock};

struct RouterState {
    address: DeviceAddress,
    latched: Mutex<Option<BleError>>,
    errors: Broadcast<BleError>,
}

/// Per-connection disconnect broadcaster. Cheap to clone.
#[derive(Clone)]
pub struct DisconnectionRouter {
    state: Arc<RouterState>,
}

impl DisconnectionRouter {
    pub fn new(address: DeviceAddress) -> Self {
        Self {
            state: Arc::new(RouterState {
                address,
                latched: Mutex::new(None),
                errors: Broadcast::new(),
            }),
        }
    }

    pub fn address(&self) -> &DeviceAddress {
        &self.state.address
    }

    /// Report the terminal error. Returns `false` if one was already latched.
    pub fn on_disconnected(&self, error: BleError) -> bool {
        {
            let mut latched = lock(&self.state.latched);
            if latched.is_some() {
                return false;
            }
            *latched = Some(error.clone());
        }
        info!("{}: connection lost: {}", self.state.address, error);
        self.state.errors.publish(error);
        true
    }

    pub fn error(&self) -> Option<BleError> {
        lock(&self.state.latched).clone()
    }

    /// Run `hook` once with the terminal error, immediately if already
    /// latched. Dropping the guard disarms it.
    pub fn on_error(
        &self,
        hook: impl Fn(&BleError) + Send + Sync + 'static,
    ) -> CallbackGuard<BleError> {
        let fired = Arc::new(AtomicBool::new(false));
        let once = {
            let fired = Arc::clone(&fired);
            move |error: &BleError| {
                if !fired.swap(true, Ordering::AcqRel) {
                    hook(error);
                }
            }
        };
        let once = Arc::new(once);
        let registered = Arc::clone(&once);
        let guard = self.state.errors.on_value(move |e| (*registered)(e));
        if let Some(error) = self.error() {
            (*once)(&error);
        }
        guard
    }

    /// Subscribe before checking the latch so nothing slips between.
    pub fn listen(&self) -> DisconnectListener {
        DisconnectListener {
            errors: self.state.errors.subscribe(),
            router: self.clone(),
        }
    }

    /// Resolves with the terminal error once the link is gone.
    pub async fn disconnected(&self) -> BleError {
        self.listen().wait().await
    }
}

/// Awaitable view of a router's terminal error.
pub struct DisconnectListener {
    errors: Listener<BleError>,
    router: DisconnectionRouter,
}

impl DisconnectListener {
    pub async fn wait(&self) -> BleError {
        if let Some(error) = self.router.error() {
            return error;
        }
        self.errors.recv().await
    }
}

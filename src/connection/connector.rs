//! Connector: turns a [`LinkProvider`] into a stream of one [`Connection`].
//!
//! ```text
//!  prepare_connection()
//!     │  fresh scope: router, callback hub, connection queue,
//!     │               watcher set [queue, disconnect action], link slot
//!     ▼
//!  router.on_error ─▶ stream error (forwarded for the stream's lifetime)
//!     │
//!  callback context task
//!     ├─ watchers.subscribed()      (queue arms itself on the router)
//!     ├─ client queue ◀── ConnectOperation
//!     └─ or( router.disconnected(),
//!            connect.first() ─▶ emit Connection )   then the task ends
//!
//!  stream dropped / errored ───────────────▶ watchers.unsubscribed()
//!                                            (queue terminated, slot closed)
//! ```
//!
//! Every attempt gets a new scope, so a reconnect never sees the previous
//! attempt's terminal error. No task stays parked for the life of a
//! connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_lite::future;
use log::{debug, info};

use super::{Connection, ConnectionSetup, DisconnectionRouter};
use crate::config::{ClientConfig, ConfigError};
use crate::error::BleError;
use crate::gatt::GattCallback;
use crate::operations::ConnectOperation;
use crate::operations::connect::LinkSlot;
use crate::ports::{ConnectionWatcher, LinkProvider};
use crate::queue::{OperationQueue, OperationStream, emitter};
use crate::runtime::CallbackContext;

/// Emits the [`Connection`] once established, then fails with the
/// disconnect error. Dropping it disconnects.
pub type ConnectionStream = OperationStream<Connection>;

const MAX_WATCHERS: usize = 4;

// ── Watchers ─────────────────────────────────────────────────

/// Fixed watcher membership for one attempt, each hook fired once.
struct WatcherSet {
    watchers: heapless::Vec<Arc<dyn ConnectionWatcher>, MAX_WATCHERS>,
    subscribed: AtomicBool,
    unsubscribed: AtomicBool,
}

impl WatcherSet {
    fn new(watchers: impl IntoIterator<Item = Arc<dyn ConnectionWatcher>>) -> Self {
        Self {
            watchers: watchers.into_iter().collect(),
            subscribed: AtomicBool::new(false),
            unsubscribed: AtomicBool::new(false),
        }
    }

    fn notify_subscribed(&self) {
        if self.subscribed.swap(true, Ordering::AcqRel) {
            return;
        }
        for watcher in &self.watchers {
            watcher.on_connection_subscribed();
        }
    }

    fn notify_unsubscribed(&self) {
        if self.unsubscribed.swap(true, Ordering::AcqRel) {
            return;
        }
        for watcher in &self.watchers {
            watcher.on_connection_unsubscribed();
        }
    }
}

/// Closes the link and reports the disconnect when the caller walks away.
///
/// Closing the slot also covers a connect that is still in flight: the
/// connect operation disconnects any link it opens afterwards.
struct DisconnectAction {
    slot: Arc<LinkSlot>,
    router: DisconnectionRouter,
}

impl ConnectionWatcher for DisconnectAction {
    fn on_connection_subscribed(&self) {}

    fn on_connection_unsubscribed(&self) {
        if let Some(link) = self.slot.close() {
            debug!("{}: closing link", link.address());
            link.disconnect();
        }
        self.router
            .on_disconnected(BleError::disconnected(self.router.address().clone()));
    }
}

// ── Connector ────────────────────────────────────────────────

/// Client-wide entry point. Owns the callback context and the queue that
/// serializes connect attempts across devices.
pub struct Connector {
    context: CallbackContext,
    client_queue: Arc<OperationQueue>,
    config: Arc<ClientConfig>,
}

impl Connector {
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let context = CallbackContext::new(config.callback_stack_kb);
        let client_queue = Arc::new(OperationQueue::new(
            "client",
            context.clone(),
            config.queue_stack_kb,
        ));
        info!(
            "Connector ready (op timeout {}ms, connect timeout {}ms, mtu {})",
            config.operation_timeout_ms, config.connect_timeout_ms, config.default_mtu
        );
        Ok(Self {
            context,
            client_queue,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Start a connection attempt to `device`.
    pub fn prepare_connection(
        &self,
        device: Arc<dyn LinkProvider>,
        setup: ConnectionSetup,
    ) -> ConnectionStream {
        let router = DisconnectionRouter::new(device.address().clone());
        let callback = GattCallback::new(router.clone());
        let queue = Arc::new(OperationQueue::for_connection(
            router.clone(),
            self.context.clone(),
            self.config.queue_stack_kb,
        ));
        let slot = Arc::new(LinkSlot::default());
        let watchers = Arc::new(WatcherSet::new([
            Arc::clone(&queue) as Arc<dyn ConnectionWatcher>,
            Arc::new(DisconnectAction {
                slot: Arc::clone(&slot),
                router: router.clone(),
            }),
        ]));

        let (tx, rx) = emitter::channel();
        let forwarding = {
            let tx = tx.clone();
            router.on_error(move |error| tx.error(error.clone()))
        };
        {
            let watchers = Arc::clone(&watchers);
            let context = self.context.clone();
            tx.set_cancellable(move || {
                drop(forwarding);
                context.execute(move || watchers.notify_unsubscribed());
            });
        }

        let connect = ConnectOperation {
            device,
            callback: callback.clone(),
            slot,
            auto_connect: setup.auto_connect,
            timeout: self.config.connect_timeout(),
        };
        let client_queue = Arc::clone(&self.client_queue);
        let config = Arc::clone(&self.config);

        self.context.spawn(async move {
            watchers.notify_subscribed();
            let connecting = client_queue.queue(connect);

            // A router error reaches the stream through `forwarding`.
            let outcome = future::or(
                async { Err(router.disconnected().await) },
                connecting.first(),
            )
            .await;

            match outcome {
                Ok(link) => tx.next(Connection::new(link, queue, callback, config)),
                Err(error) => tx.error(error),
            }
        });

        rx
    }
}

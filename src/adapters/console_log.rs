//! Stderr logging for host builds.
//!
//! `log` records are bridged into a `tracing-subscriber` registry with a
//! fmt layer. The filter comes from `GATTQ_LOG` (`EnvFilter` syntax, e.g.
//! `gattqueue=debug`), default `info`.

use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt};

pub const FILTER_ENV: &str = "GATTQ_LOG";

fn filter() -> EnvFilter {
    EnvFilter::try_from_env(FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the subscriber. Fails if one is already set.
pub fn init() -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(filter())
        .with(fmt::layer().with_writer(std::io::stderr).with_thread_names(true))
        .try_init()
}

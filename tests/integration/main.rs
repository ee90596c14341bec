//! Integration test driver for `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that exercises one subsystem against
//! the mock BLE stack. All tests run on the host with no radio.

mod connector_tests;
mod long_write_tests;
mod mock_link;

use std::sync::Arc;
use std::time::{Duration, Instant};

use gattqueue::{ClientConfig, Connection, ConnectionSetup, ConnectionStream, Connector};

use mock_link::MockDevice;

/// Short timeouts so failure paths finish quickly.
pub fn test_config() -> ClientConfig {
    ClientConfig {
        operation_timeout_ms: 500,
        connect_timeout_ms: 500,
        ..ClientConfig::default()
    }
}

/// Poll `cond` until it holds or `limit` passes.
pub fn wait_until(limit: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

/// Connect to `device` and hand back the live stream with its connection.
pub fn connect(connector: &Connector, device: &Arc<MockDevice>) -> (ConnectionStream, Connection) {
    let mut stream = connector.prepare_connection(device.clone(), ConnectionSetup::default());
    let connection = stream
        .blocking_next()
        .expect("stream ended before connecting")
        .expect("connect failed");
    (stream, connection)
}

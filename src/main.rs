//! gattq-sim: end-to-end run against the loopback peripheral.
//!
//! ```text
//!  Connector ──connect──▶ LoopbackDevice
//!      │
//!      ▼
//!  Connection ── long write (100 B / 20 B batches) ──▶ LoopbackLink
//!      │      ── read back ─────────────────────────▶
//!      ▼
//!  drop stream ─▶ queue terminated, link closed
//! ```
//!
//! Usage: `gattq-sim [config.json]`. Log level from `GATTQ_LOG`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, ensure};
use log::info;

use gattqueue::adapters::console_log;
use gattqueue::adapters::loopback::LoopbackDevice;
use gattqueue::{ClientConfig, ConnectionSetup, Connector, DeviceAddress, Uuid};

const DEVICE: &str = "C0:FF:EE:00:00:01";
const DATA_CHARACTERISTIC: Uuid = Uuid(0x6e40_0002_b5a3_f393_e0a9_e50e_24dc_ca9e);
const PAYLOAD_LEN: u8 = 100;
const BATCH: usize = 20;

fn load_config() -> Result<ClientConfig> {
    let Some(path) = std::env::args().nth(1) else {
        return Ok(ClientConfig::default());
    };
    let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let config = ClientConfig::from_json(&raw).with_context(|| format!("parsing {path}"))?;
    info!("Config loaded from {}", path);
    Ok(config)
}

fn main() -> Result<()> {
    console_log::init().map_err(|e| anyhow!("logger init failed: {e}"))?;
    info!("gattq-sim v{}", env!("CARGO_PKG_VERSION"));

    let connector = Connector::new(load_config()?)?;
    let device = Arc::new(LoopbackDevice::new(
        DeviceAddress::parse(DEVICE)?,
        Duration::from_millis(5),
    ));

    let mut stream = connector.prepare_connection(device.clone(), ConnectionSetup::default());
    let connection = stream
        .blocking_next()
        .context("connection stream ended before connecting")??;
    info!("Connected to {}", connection.address());

    let payload: Vec<u8> = (0..PAYLOAD_LEN).collect();
    let written = connection
        .long_write()
        .characteristic(DATA_CHARACTERISTIC)
        .bytes(payload.clone())
        .max_batch_size(BATCH)
        .write()
        .blocking_first()?;
    info!("Long write done: {} bytes", written.len());

    let echoed = connection
        .read_characteristic(DATA_CHARACTERISTIC)
        .blocking_first()?;
    ensure!(echoed == payload, "read back {} bytes, expected {}", echoed.len(), payload.len());
    ensure!(device.stored(DATA_CHARACTERISTIC) == payload, "device store mismatch");

    drop(connection);
    drop(stream);
    // Let the disconnect path run before the process exits.
    std::thread::sleep(Duration::from_millis(50));
    info!("Done");
    Ok(())
}

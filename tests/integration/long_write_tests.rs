//! Chunked long write against the mock stack.

use std::time::Duration;

use gattqueue::operations::AckTrigger;
use gattqueue::{BleError, Connector, DeviceAddress, GattOperation, Uuid};

use super::mock_link::{ADDRESS, ConnectMode, MockDevice, WritePlan};
use super::{connect, test_config, wait_until};

const CHAR: Uuid = Uuid(0x1234_0001);
const OTHER: Uuid = Uuid(0x1234_0002);
const WAIT: Duration = Duration::from_secs(2);

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| i as u8).collect()
}

fn address() -> DeviceAddress {
    DeviceAddress::parse(ADDRESS).unwrap()
}

fn device_with(plan: WritePlan) -> std::sync::Arc<MockDevice> {
    MockDevice::new(ConnectMode::Immediate, plan)
}

// ── Batching ─────────────────────────────────────────────────

#[test]
fn immediate_acks_write_every_batch_and_emit_payload() {
    let connector = Connector::new(test_config()).unwrap();
    let device = MockDevice::ready();
    let (_stream, connection) = connect(&connector, &device);

    let data = payload(100);
    let written = connection
        .long_write()
        .characteristic(CHAR)
        .bytes(data.clone())
        .max_batch_size(20)
        .write()
        .blocking_first()
        .unwrap();

    assert_eq!(written, data);
    let batches = device.last_link().writes();
    assert_eq!(batches.len(), 5);
    assert!(batches.iter().all(|b| b.len() == 20));
    assert_eq!(batches.concat(), data);
}

#[test]
fn trailing_partial_batch() {
    let connector = Connector::new(test_config()).unwrap();
    let device = MockDevice::ready();
    let (_stream, connection) = connect(&connector, &device);

    connection
        .long_write()
        .characteristic(CHAR)
        .bytes(payload(45))
        .max_batch_size(20)
        .write()
        .blocking_first()
        .unwrap();

    let sizes: Vec<_> = device.last_link().writes().iter().map(Vec::len).collect();
    assert_eq!(sizes, [20, 20, 5]);
}

#[test]
fn default_batch_is_mtu_payload() {
    let connector = Connector::new(test_config()).unwrap();
    let device = MockDevice::ready();
    let (_stream, connection) = connect(&connector, &device);

    connection
        .long_write()
        .characteristic(CHAR)
        .bytes(payload(50))
        .write()
        .blocking_first()
        .unwrap();

    let sizes: Vec<_> = device.last_link().writes().iter().map(Vec::len).collect();
    assert_eq!(sizes, [20, 20, 10]);
}

#[test]
fn completions_for_other_characteristics_are_ignored() {
    let connector = Connector::new(test_config()).unwrap();
    let device = device_with(WritePlan {
        ack_below: Some(0),
        ..WritePlan::default()
    });
    let (_stream, connection) = connect(&connector, &device);

    let mut write = connection
        .long_write()
        .characteristic(CHAR)
        .bytes(payload(20))
        .max_batch_size(20)
        .write();
    let link = device.last_link();
    assert!(wait_until(WAIT, || link.write_count() == 1));

    link.callback().on_characteristic_write(OTHER, &[0; 20], 0);
    std::thread::sleep(Duration::from_millis(30));
    assert!(!write.is_terminated());

    link.ack(0);
    assert_eq!(write.blocking_next(), Some(Ok(payload(20))));
}

// ── Failures ─────────────────────────────────────────────────

#[test]
fn missing_completion_times_out_without_next_batch() {
    let connector = Connector::new(test_config()).unwrap();
    let device = device_with(WritePlan {
        ack_below: Some(2),
        ..WritePlan::default()
    });
    let (_stream, connection) = connect(&connector, &device);

    let result = connection
        .long_write()
        .characteristic(CHAR)
        .bytes(payload(100))
        .max_batch_size(20)
        .timeout(Duration::from_millis(100))
        .write()
        .blocking_first();

    assert_eq!(
        result,
        Err(BleError::Timeout {
            operation: GattOperation::CharacteristicLongWrite,
            address: address(),
        })
    );
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(device.last_link().write_count(), 3);
}

#[test]
fn zero_batch_size_fails_before_any_write() {
    let connector = Connector::new(test_config()).unwrap();
    let device = MockDevice::ready();
    let (_stream, connection) = connect(&connector, &device);

    let result = connection
        .long_write()
        .characteristic(CHAR)
        .bytes(payload(10))
        .max_batch_size(0)
        .write()
        .blocking_first();

    assert!(matches!(result, Err(BleError::InvalidArgument(_))));
    assert_eq!(device.last_link().write_count(), 0);
}

#[test]
fn missing_characteristic_is_invalid() {
    let connector = Connector::new(test_config()).unwrap();
    let device = MockDevice::ready();
    let (_stream, connection) = connect(&connector, &device);

    let result = connection.long_write().bytes(payload(10)).write().blocking_first();
    assert!(matches!(result, Err(BleError::InvalidArgument(_))));
}

#[test]
fn refused_write_cannot_start() {
    let connector = Connector::new(test_config()).unwrap();
    let device = device_with(WritePlan {
        refuse_at: Some(1),
        ..WritePlan::default()
    });
    let (_stream, connection) = connect(&connector, &device);

    let result = connection
        .long_write()
        .characteristic(CHAR)
        .bytes(payload(60))
        .max_batch_size(20)
        .write()
        .blocking_first();

    assert_eq!(
        result,
        Err(BleError::CannotStart {
            operation: GattOperation::CharacteristicLongWrite,
            address: address(),
        })
    );
    assert_eq!(device.last_link().write_count(), 1);
}

#[test]
fn dead_link_is_a_disconnect() {
    let connector = Connector::new(test_config()).unwrap();
    let device = device_with(WritePlan {
        dead_at: Some(0),
        ..WritePlan::default()
    });
    let (_stream, connection) = connect(&connector, &device);

    let result = connection
        .long_write()
        .characteristic(CHAR)
        .bytes(payload(60))
        .max_batch_size(20)
        .write()
        .blocking_first();

    assert!(result.unwrap_err().is_disconnect());
}

#[test]
fn failure_status_aborts_write() {
    let connector = Connector::new(test_config()).unwrap();
    let device = device_with(WritePlan {
        status: 0x0d,
        ..WritePlan::default()
    });
    let (_stream, connection) = connect(&connector, &device);

    let result = connection
        .long_write()
        .characteristic(CHAR)
        .bytes(payload(60))
        .max_batch_size(20)
        .write()
        .blocking_first();

    assert_eq!(
        result,
        Err(BleError::Gatt {
            operation: GattOperation::CharacteristicLongWrite,
            address: address(),
            status: 0x0d,
        })
    );
    assert_eq!(device.last_link().write_count(), 1);
}

// ── Acknowledgment strategies ────────────────────────────────

#[test]
fn triggered_ack_gates_each_intermediate_batch() {
    let connector = Connector::new(test_config()).unwrap();
    let device = MockDevice::ready();
    let (_stream, connection) = connect(&connector, &device);
    let trigger = AckTrigger::new();

    let mut write = connection
        .long_write()
        .characteristic(CHAR)
        .bytes(payload(60))
        .max_batch_size(20)
        .ack_strategy(trigger.strategy())
        .write();
    let link = device.last_link();

    assert!(wait_until(WAIT, || link.write_count() == 1));
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(link.write_count(), 1);

    trigger.acknowledge();
    assert!(wait_until(WAIT, || link.write_count() == 2));
    trigger.acknowledge();

    // The last batch completes without a grant.
    assert_eq!(write.blocking_next(), Some(Ok(payload(60))));
    assert_eq!(link.write_count(), 3);
}

#[test]
fn strategy_failure_fails_write() {
    let connector = Connector::new(test_config()).unwrap();
    let device = MockDevice::ready();
    let (_stream, connection) = connect(&connector, &device);
    let trigger = AckTrigger::new();

    let write = connection
        .long_write()
        .characteristic(CHAR)
        .bytes(payload(60))
        .max_batch_size(20)
        .ack_strategy(trigger.strategy())
        .write();
    let link = device.last_link();
    assert!(wait_until(WAIT, || link.write_count() == 1));

    trigger.fail("peer busy");
    assert_eq!(write.blocking_first(), Err(BleError::AckStrategy("peer busy")));
    assert_eq!(link.write_count(), 1);
}

#[test]
fn early_stop_is_an_error() {
    let connector = Connector::new(test_config()).unwrap();
    let device = MockDevice::ready();
    let (_stream, connection) = connect(&connector, &device);
    let trigger = AckTrigger::new();
    trigger.stop();

    let result = connection
        .long_write()
        .characteristic(CHAR)
        .bytes(payload(60))
        .max_batch_size(20)
        .ack_strategy(trigger.strategy())
        .write()
        .blocking_first();

    assert!(matches!(result, Err(BleError::AckStrategy(_))));
    assert_eq!(device.last_link().write_count(), 1);
}

#[test]
fn detached_caller_stops_further_batches() {
    let connector = Connector::new(test_config()).unwrap();
    let device = MockDevice::ready();
    let (_stream, connection) = connect(&connector, &device);
    let trigger = AckTrigger::new();

    let write = connection
        .long_write()
        .characteristic(CHAR)
        .bytes(payload(100))
        .max_batch_size(20)
        .ack_strategy(trigger.strategy())
        .write();
    let link = device.last_link();
    assert!(wait_until(WAIT, || link.write_count() == 1));

    drop(write);
    trigger.acknowledge();

    // The queue is released: a following operation runs.
    link.set_read_value(&[7]);
    let read = connection.read_characteristic(CHAR).blocking_first();
    assert_eq!(read, Ok(vec![7]));
    assert_eq!(link.write_count(), 1);
}

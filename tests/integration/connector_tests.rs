//! Connector lifecycle: connect, detach, peripheral disconnects and
//! reconnects, plus the single-response operations on a live connection.

use std::time::Duration;

use gattqueue::{
    BleError, ClientConfig, ConnectionSetup, Connector, DescriptorId, DeviceAddress, GattOperation, LinkState,
    Uuid,
};

use super::mock_link::{ADDRESS, ConnectMode, MockDevice, WritePlan};
use super::{connect, test_config, wait_until};

const CHAR: Uuid = Uuid(0xFEED_0001);
const CCCD: Uuid = Uuid(0x2902);
const WAIT: Duration = Duration::from_secs(2);

fn address() -> DeviceAddress {
    DeviceAddress::parse(ADDRESS).unwrap()
}

// ── Detach ───────────────────────────────────────────────────

#[test]
fn detaching_mid_long_write_fails_it_with_disconnect() {
    let connector = Connector::new(test_config()).unwrap();
    let device = MockDevice::new(
        ConnectMode::Immediate,
        WritePlan {
            ack_below: Some(2),
            ..WritePlan::default()
        },
    );
    let (stream, connection) = connect(&connector, &device);
    let link = device.last_link();

    let data: Vec<u8> = (0..100).collect();
    let write = connection
        .long_write()
        .characteristic(CHAR)
        .bytes(data)
        .max_batch_size(20)
        .write();

    // Batches 1 and 2 are acknowledged, batch 3 is in flight.
    assert!(wait_until(WAIT, || link.write_count() == 3));
    drop(stream);

    let err = write.blocking_first().unwrap_err();
    assert!(err.is_disconnect(), "unexpected {err:?}");
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(link.write_count(), 3);
    assert_eq!(link.disconnect_calls(), 1);
}

#[test]
fn detaching_terminates_connection_queue() {
    let connector = Connector::new(test_config()).unwrap();
    let device = MockDevice::ready();
    let (stream, connection) = connect(&connector, &device);

    drop(stream);
    let link = device.last_link();
    assert!(wait_until(WAIT, || link.disconnect_calls() == 1));

    let result = connection.write_characteristic(CHAR, &[1]).blocking_first();
    assert!(result.unwrap_err().is_disconnect());
}

#[test]
fn detaching_while_connect_is_dequeued_closes_every_link() {
    let connector = Connector::new(test_config()).unwrap();
    let device = MockDevice::ready();

    // Walk away at staggered points so some attempts are dropped before
    // the connect body runs and some while it opens the link.
    for attempt in 0..24 {
        let stream = connector.prepare_connection(device.clone(), ConnectionSetup::default());
        for _ in 0..attempt * 40 {
            std::thread::yield_now();
        }
        drop(stream);
    }

    std::thread::sleep(Duration::from_millis(50));
    assert!(wait_until(WAIT, || device
        .links()
        .iter()
        .all(|link| link.disconnect_calls() == 1)));

    let opened = device.link_count();
    let (_stream, connection) = connect(&connector, &device);
    assert_eq!(device.link_count(), opened + 1);
    assert_eq!(connection.write_characteristic(CHAR, &[3]).blocking_first(), Ok(vec![3]));
    assert_eq!(device.last_link().disconnect_calls(), 0);
}

// ── Disconnects ──────────────────────────────────────────────

#[test]
fn peripheral_disconnect_fails_stream_and_in_flight_write() {
    let connector = Connector::new(test_config()).unwrap();
    let device = MockDevice::new(
        ConnectMode::Immediate,
        WritePlan {
            ack_below: Some(0),
            ..WritePlan::default()
        },
    );
    let (mut stream, connection) = connect(&connector, &device);
    let link = device.last_link();

    let write = connection
        .long_write()
        .characteristic(CHAR)
        .bytes(vec![0; 40])
        .max_batch_size(20)
        .write();
    assert!(wait_until(WAIT, || link.write_count() == 1));

    device.report_state(8, LinkState::Disconnected);

    let expected = BleError::Disconnected {
        address: address(),
        status: Some(8),
    };
    assert_eq!(write.blocking_first(), Err(expected.clone()));
    assert!(matches!(stream.blocking_next(), Some(Err(e)) if e == expected));
    assert_eq!(link.write_count(), 1);
}

#[test]
fn disconnect_before_connect_completes_is_propagated() {
    let connector = Connector::new(test_config()).unwrap();
    let device = MockDevice::new(ConnectMode::Never, WritePlan::default());

    let mut stream = connector.prepare_connection(device.clone(), ConnectionSetup::default());
    assert!(wait_until(WAIT, || device.connect_attempts() == 1));
    device.report_state(19, LinkState::Disconnected);

    match stream.blocking_next() {
        Some(Err(BleError::Disconnected { status, .. })) => assert_eq!(status, Some(19)),
        _ => panic!("expected a disconnect before connecting"),
    }
}

#[test]
fn refused_connect_cannot_start() {
    let connector = Connector::new(test_config()).unwrap();
    let device = MockDevice::new(ConnectMode::Refuse, WritePlan::default());

    let mut stream = connector.prepare_connection(device.clone(), ConnectionSetup::default());
    match stream.blocking_next() {
        Some(Err(err)) => assert_eq!(
            err,
            BleError::CannotStart {
                operation: GattOperation::Connect,
                address: address(),
            }
        ),
        _ => panic!("expected CannotStart"),
    }
}

#[test]
fn silent_peripheral_times_out() {
    let config = ClientConfig {
        connect_timeout_ms: 80,
        ..test_config()
    };
    let connector = Connector::new(config).unwrap();
    let device = MockDevice::new(ConnectMode::Never, WritePlan::default());

    let mut stream = connector.prepare_connection(device.clone(), ConnectionSetup::default());
    match stream.blocking_next() {
        Some(Err(err)) => assert_eq!(
            err,
            BleError::Timeout {
                operation: GattOperation::Connect,
                address: address(),
            }
        ),
        _ => panic!("expected a connect timeout"),
    }
    assert!(wait_until(WAIT, || device.last_link().disconnect_calls() == 1));
}

#[test]
fn auto_connect_waits_past_connect_timeout() {
    let config = ClientConfig {
        connect_timeout_ms: 30,
        ..test_config()
    };
    let connector = Connector::new(config).unwrap();
    let device = MockDevice::new(ConnectMode::Never, WritePlan::default());

    let mut stream = connector.prepare_connection(device.clone(), ConnectionSetup { auto_connect: true });
    assert!(wait_until(WAIT, || device.connect_attempts() == 1));
    std::thread::sleep(Duration::from_millis(80));
    device.report_state(0, LinkState::Connected);

    let connection = stream.blocking_next().unwrap().unwrap();
    assert_eq!(connection.address(), &address());
}

#[test]
fn reconnect_does_not_inherit_previous_error() {
    let connector = Connector::new(test_config()).unwrap();
    let device = MockDevice::ready();

    let (stream, first) = connect(&connector, &device);
    drop(stream);
    assert!(first.write_characteristic(CHAR, &[1]).blocking_first().is_err());

    let (_stream, second) = connect(&connector, &device);
    assert_eq!(device.link_count(), 2);
    assert_eq!(second.write_characteristic(CHAR, &[2]).blocking_first(), Ok(vec![2]));
}

// ── Single-response operations ───────────────────────────────

#[test]
fn characteristic_read_returns_value() {
    let connector = Connector::new(test_config()).unwrap();
    let device = MockDevice::ready();
    let (_stream, connection) = connect(&connector, &device);
    device.last_link().set_read_value(b"hello");

    assert_eq!(
        connection.read_characteristic(CHAR).blocking_first(),
        Ok(b"hello".to_vec())
    );
}

#[test]
fn descriptor_write_echoes_value() {
    let connector = Connector::new(test_config()).unwrap();
    let device = MockDevice::ready();
    let (_stream, connection) = connect(&connector, &device);
    let cccd = DescriptorId {
        characteristic: CHAR,
        descriptor: CCCD,
    };

    assert_eq!(
        connection.write_descriptor(cccd, &[1, 0]).blocking_first(),
        Ok(vec![1, 0])
    );
}

#[test]
fn unanswered_write_times_out() {
    let config = ClientConfig {
        operation_timeout_ms: 60,
        ..test_config()
    };
    let connector = Connector::new(config).unwrap();
    let device = MockDevice::new(
        ConnectMode::Immediate,
        WritePlan {
            ack_below: Some(0),
            ..WritePlan::default()
        },
    );
    let (_stream, connection) = connect(&connector, &device);

    assert_eq!(
        connection.write_characteristic(CHAR, &[9]).blocking_first(),
        Err(BleError::Timeout {
            operation: GattOperation::CharacteristicWrite,
            address: address(),
        })
    );
}

#[test]
fn invalid_config_is_rejected() {
    let config = ClientConfig {
        default_mtu: 10,
        ..ClientConfig::default()
    };
    assert!(Connector::new(config).is_err());
}

//! Serial endpoint over the in-memory transport

use super::harness::{eventually, wait_for};
use onebox_io::transport::{MockTransport, SerialSettings};
use onebox_io::{Endpoint, EndpointEvent, EndpointOptions, SerialPortEndpoint};
use std::time::Duration;

fn open_mock(options: EndpointOptions) -> (SerialPortEndpoint, MockTransport) {
    let settings = SerialSettings::new("/dev/ttyMOCK", 115200);
    let mock = MockTransport::new(settings.clone());
    let mut port = SerialPortEndpoint::new(settings, options);
    port.open_with(Box::new(mock.clone())).unwrap();
    (port, mock)
}

fn fast() -> EndpointOptions {
    EndpointOptions {
        poll_interval: Duration::from_millis(5),
        ..EndpointOptions::default()
    }
}

#[test]
fn test_polled_bytes_reach_consumer() {
    let (port, mock) = open_mock(fast());
    let events = port.events();

    mock.inject_read(b"HELLO");
    wait_for(&events, |e| *e == EndpointEvent::DataReady { peer: None });
    assert_eq!(port.read_pending().unwrap(), b"HELLO");
    assert!(port.read_pending().is_none());

    let c = port.counters();
    assert_eq!(c.rx_bytes, 5);
    assert!(c.rx_packets >= 1);
}

#[test]
fn test_terminator_holds_partial_message() {
    let (port, mock) = open_mock(fast());
    let events = port.events();
    port.set_terminator(Some(b'\n'));

    mock.inject_read(b"AB");
    wait_for(&events, |e| matches!(e, EndpointEvent::DataReady { .. }));
    assert!(port.read_pending().is_none());

    mock.inject_read(b"C\n");
    assert!(eventually(|| port.counters().rx_bytes == 4));
    assert_eq!(port.read_pending().unwrap(), b"ABC\n");
}

#[test]
fn test_ring_overflow_keeps_newest() {
    let options = EndpointOptions {
        ring_capacity: 8,
        ..fast()
    };
    let (port, mock) = open_mock(options);

    mock.inject_read(b"0123456789ABCDEF");
    assert!(eventually(|| port.counters().rx_bytes == 16));
    assert_eq!(port.read_pending().unwrap(), b"89ABCDEF");
}

#[test]
fn test_close_and_reopen() {
    let (mut port, mock) = open_mock(fast());
    let events = port.events();

    port.close().unwrap();
    wait_for(&events, |e| *e == EndpointEvent::StateChanged(false));
    assert!(!port.is_open());

    // Nothing is polled while closed
    mock.inject_read(b"late");
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(port.counters().rx_bytes, 0);

    port.open_with(Box::new(mock.clone())).unwrap();
    assert!(eventually(|| port.counters().rx_bytes == 4));
    assert_eq!(port.read_pending().unwrap(), b"late");
}

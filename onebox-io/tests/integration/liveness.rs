//! Liveness-driven rebinds of a UDP server

use super::harness::{WAIT, eventually, wait_for};
use onebox_io::config::LivenessConfig;
use onebox_io::{Endpoint, EndpointEvent, EndpointOptions, UdpServerEndpoint};
use std::net::UdpSocket;

fn watched_server() -> UdpServerEndpoint {
    let options = EndpointOptions {
        liveness: LivenessConfig {
            enabled: true,
            check_interval_ms: 100,
            max_error_count: 2,
        },
        ..EndpointOptions::default()
    };
    let mut server = UdpServerEndpoint::new(options);
    server.bind("127.0.0.1:0").unwrap();
    server
}

#[test]
fn test_silent_server_is_rebound_in_place() {
    let server = watched_server();
    let addr = server.local_addr().unwrap();
    let events = server.events();
    wait_for(&events, |e| *e == EndpointEvent::StateChanged(true));

    let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
    peer.set_read_timeout(Some(WAIT)).unwrap();
    // Resent in case it lands while the socket is being replaced
    assert!(eventually(|| {
        peer.send_to(b"hello", addr).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        server.counters().rx_packets > 0
    }));

    // Reception stops; the monitor closes and rebinds the socket
    wait_for(&events, |e| *e == EndpointEvent::StateChanged(false));
    wait_for(&events, |e| *e == EndpointEvent::StateChanged(true));

    assert!(server.is_open());
    assert_eq!(server.local_addr(), Some(addr));
    assert_eq!(server.connection_count(), 1);

    // The new socket still talks to the known peer
    server.send(Some(0), b"back").unwrap();
    let mut buf = [0u8; 8];
    let (n, _) = peer.recv_from(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"back");
}

#[test]
fn test_disabled_monitor_never_rebinds() {
    let mut server = UdpServerEndpoint::new(EndpointOptions::default());
    let events = server.events();
    server.bind("127.0.0.1:0").unwrap();
    wait_for(&events, |e| *e == EndpointEvent::StateChanged(true));

    std::thread::sleep(std::time::Duration::from_millis(1200));
    assert!(events.try_recv().is_err());
    assert!(server.is_open());
}

//! UDP server and client over loopback

use super::harness::{WAIT, wait_for};
use onebox_io::{
    Endpoint, EndpointCounters, EndpointEvent, EndpointOptions, Error, UdpClientEndpoint,
    UdpServerEndpoint,
};
use std::net::UdpSocket;

fn bound_server() -> UdpServerEndpoint {
    let mut server = UdpServerEndpoint::new(EndpointOptions::default());
    server.bind("127.0.0.1:0").unwrap();
    server
}

fn peer_socket() -> UdpSocket {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.set_read_timeout(Some(WAIT)).unwrap();
    socket
}

#[test]
fn test_two_peer_scenario() {
    let server = bound_server();
    let server_addr = server.local_addr().unwrap();
    let events = server.events();

    let a = peer_socket();
    let b = peer_socket();
    let a_addr = a.local_addr().unwrap();
    let b_addr = b.local_addr().unwrap();

    a.send_to(b"from a", server_addr).unwrap();
    wait_for(&events, |e| matches!(e, EndpointEvent::DataReady { .. }));
    b.send_to(b"from b", server_addr).unwrap();
    let ready = wait_for(&events, |e| {
        matches!(e, EndpointEvent::DataReady { peer: Some(1) })
    });
    assert_eq!(ready, EndpointEvent::DataReady { peer: Some(1) });

    // A second datagram from a known peer does not register it again
    a.send_to(b"again", server_addr).unwrap();
    wait_for(&events, |e| {
        matches!(e, EndpointEvent::DataReady { peer: Some(0) })
    });

    assert_eq!(server.connection_count(), 2);
    assert_eq!(server.peer_info(0), Some(a_addr.to_string()));
    assert_eq!(server.peer_info(1), Some(b_addr.to_string()));
    assert_eq!(server.peer_info(2), None);

    assert_eq!(server.read_pending().unwrap(), b"from a");
    assert_eq!(server.read_pending().unwrap(), b"from b");
    assert_eq!(server.read_pending().unwrap(), b"again");

    let before = server.counters();
    assert!(matches!(
        server.send(Some(5), b"nope"),
        Err(Error::PeerNotFound(5))
    ));
    assert_eq!(server.counters(), before);

    assert_eq!(server.send(Some(1), b"to b").unwrap(), 4);
    let mut buf = [0u8; 16];
    let (n, from) = b.recv_from(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"to b");
    assert_eq!(from, server_addr);
}

#[test]
fn test_peer_events_and_removal() {
    let server = bound_server();
    let server_addr = server.local_addr().unwrap();
    let events = server.events();

    let a = peer_socket();
    let b = peer_socket();
    a.send_to(b"1", server_addr).unwrap();
    wait_for(&events, |e| matches!(e, EndpointEvent::DataReady { .. }));
    b.send_to(b"2", server_addr).unwrap();
    let connected = wait_for(&events, |e| {
        *e == EndpointEvent::PeerConnected(b.local_addr().unwrap().to_string())
    });
    assert!(matches!(connected, EndpointEvent::PeerConnected(_)));

    assert_eq!(server.remove_peer(a.local_addr().unwrap()), Some(0));
    wait_for(&events, |e| {
        *e == EndpointEvent::PeerDisconnected(a.local_addr().unwrap().to_string())
    });
    assert_eq!(server.connection_count(), 1);
    assert_eq!(server.peer_info(0), Some(b.local_addr().unwrap().to_string()));
    assert_eq!(server.remove_peer(a.local_addr().unwrap()), None);
}

#[test]
fn test_client_server_exchange() {
    let server = bound_server();
    let server_addr = server.local_addr().unwrap();
    let server_events = server.events();

    let mut client = UdpClientEndpoint::new(EndpointOptions::default());
    let client_events = client.events();
    client.bind("127.0.0.1:0").unwrap();
    client.set_target(&server_addr.to_string()).unwrap();

    assert_eq!(client.send(None, b"ping").unwrap(), 4);
    wait_for(&server_events, |e| matches!(e, EndpointEvent::DataReady { .. }));
    assert_eq!(server.read_pending().unwrap(), b"ping");
    assert_eq!(
        server.peer_info(0),
        Some(client.local_addr().unwrap().to_string())
    );

    server.send(Some(0), b"pong").unwrap();
    wait_for(&client_events, |e| matches!(e, EndpointEvent::DataReady { .. }));
    assert_eq!(client.read_pending().unwrap(), b"pong");

    let sent = wait_for(&client_events, |e| matches!(e, EndpointEvent::DataSent { .. }));
    assert_eq!(
        sent,
        EndpointEvent::DataSent {
            target: Some(server_addr),
            data: b"ping".to_vec()
        }
    );
}

#[test]
fn test_counter_reset() {
    let server = bound_server();
    let server_addr = server.local_addr().unwrap();
    let events = server.events();
    let peer = peer_socket();

    for _ in 0..3 {
        peer.send_to(b"abcd", server_addr).unwrap();
        wait_for(&events, |e| matches!(e, EndpointEvent::DataReady { .. }));
    }
    server.send(Some(0), b"xy").unwrap();
    assert_eq!(server.counters().rx_packets, 3);

    server.reset_counters();
    assert_eq!(server.counters(), EndpointCounters::default());
    server.reset_counters();
    assert_eq!(server.counters(), EndpointCounters::default());

    peer.send_to(b"z", server_addr).unwrap();
    wait_for(&events, |e| matches!(e, EndpointEvent::DataReady { .. }));
    server.send(Some(0), b"12345").unwrap();
    assert_eq!(
        server.counters(),
        EndpointCounters {
            tx_packets: 1,
            rx_packets: 1,
            tx_bytes: 5,
            rx_bytes: 1,
        }
    );
}

#[test]
fn test_close_clears_peers() {
    let mut server = bound_server();
    let server_addr = server.local_addr().unwrap();
    let events = server.events();
    let peer = peer_socket();

    peer.send_to(b"hi", server_addr).unwrap();
    wait_for(&events, |e| matches!(e, EndpointEvent::DataReady { .. }));

    server.close().unwrap();
    wait_for(&events, |e| matches!(e, EndpointEvent::PeerDisconnected(_)));
    assert_eq!(server.connection_count(), 0);
    assert!(matches!(server.send(Some(0), b"x"), Err(Error::NotOpen)));

    // Rebinding a closed server on the same address works
    server.bind(&server_addr.to_string()).unwrap();
    assert_eq!(server.local_addr(), Some(server_addr));
}

//! TCP server and client over loopback

use super::harness::{eventually, wait_for};
use onebox_io::{
    Endpoint, EndpointEvent, EndpointOptions, EndpointState, Error, TcpClientEndpoint,
    TcpServerEndpoint,
};
use std::io::Read;
use std::net::{TcpListener, TcpStream};
use std::time::Duration;

fn listening_server() -> (TcpServerEndpoint, String) {
    let mut server = TcpServerEndpoint::new(EndpointOptions::default());
    server.listen("127.0.0.1:0").unwrap();
    let addr = server.local_addr().unwrap().to_string();
    (server, addr)
}

#[test]
fn test_server_client_roundtrip() {
    let (server, addr) = listening_server();
    let server_events = server.events();

    let mut client = TcpClientEndpoint::new(EndpointOptions::default());
    let client_events = client.events();
    client.connect(&addr).unwrap();
    assert_eq!(client.state(), EndpointState::Open);

    let connected = wait_for(&server_events, |e| {
        matches!(e, EndpointEvent::PeerConnected(_))
    });
    assert_eq!(connected, EndpointEvent::PeerConnected(only_peer(&server)));
    assert_eq!(server.connection_count(), 1);

    client.send(None, b"hello server").unwrap();
    let ready = wait_for(&server_events, |e| {
        matches!(e, EndpointEvent::DataReady { .. })
    });
    assert_eq!(ready, EndpointEvent::DataReady { peer: Some(0) });
    assert_eq!(server.read_pending().unwrap(), b"hello server");
    assert!(server.read_pending().is_none());

    assert_eq!(server.send(Some(0), b"hello client").unwrap(), 12);
    wait_for(&client_events, |e| matches!(e, EndpointEvent::DataReady { .. }));
    assert_eq!(client.read_pending().unwrap(), b"hello client");

    let s = server.counters();
    assert_eq!((s.rx_packets, s.rx_bytes, s.tx_packets, s.tx_bytes), (1, 12, 1, 12));
    let c = client.counters();
    assert_eq!((c.rx_packets, c.rx_bytes, c.tx_packets, c.tx_bytes), (1, 12, 1, 12));

    client.disconnect().unwrap();
    wait_for(&server_events, |e| {
        matches!(e, EndpointEvent::PeerDisconnected(_))
    });
    assert_eq!(server.connection_count(), 0);
    assert!(matches!(server.send(Some(0), b"x"), Err(Error::PeerNotFound(0))));
}

/// Description of the single connected peer as the server reports it
fn only_peer(server: &TcpServerEndpoint) -> String {
    assert!(eventually(|| server.peer_info(0).is_some()));
    server.peer_info(0).unwrap()
}

#[test]
fn test_peer_indices_shift_on_disconnect() {
    let (server, addr) = listening_server();
    let events = server.events();

    let first = TcpStream::connect(&addr).unwrap();
    wait_for(&events, |e| matches!(e, EndpointEvent::PeerConnected(_)));
    let mut second = TcpStream::connect(&addr).unwrap();
    wait_for(&events, |e| matches!(e, EndpointEvent::PeerConnected(_)));
    assert_eq!(server.connection_count(), 2);

    let second_desc = server.peer_info(1).unwrap();
    drop(first);
    wait_for(&events, |e| matches!(e, EndpointEvent::PeerDisconnected(_)));
    assert_eq!(server.connection_count(), 1);
    assert_eq!(server.peer_info(0), Some(second_desc));

    server.send(Some(0), b"still here").unwrap();
    let mut buf = [0u8; 10];
    second
        .set_read_timeout(Some(Duration::from_secs(3)))
        .unwrap();
    second.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"still here");
}

#[test]
fn test_server_close_disconnects_peers() {
    let (mut server, addr) = listening_server();
    let events = server.events();

    let mut peer = TcpStream::connect(&addr).unwrap();
    wait_for(&events, |e| matches!(e, EndpointEvent::PeerConnected(_)));

    server.close().unwrap();
    assert_eq!(server.state(), EndpointState::Closed);
    assert_eq!(server.connection_count(), 0);
    wait_for(&events, |e| matches!(e, EndpointEvent::PeerDisconnected(_)));
    wait_for(&events, |e| *e == EndpointEvent::StateChanged(false));

    peer.set_read_timeout(Some(Duration::from_secs(3))).unwrap();
    let mut buf = [0u8; 1];
    // EOF or reset, either way the connection is gone
    assert!(!matches!(peer.read(&mut buf), Ok(n) if n > 0));
    assert!(TcpStream::connect(&addr).is_err());
}

#[test]
fn test_client_detects_remote_close() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let mut client = TcpClientEndpoint::new(EndpointOptions::default());
    let events = client.events();
    client.connect(&addr.to_string()).unwrap();
    wait_for(&events, |e| *e == EndpointEvent::StateChanged(true));

    let (accepted, _) = listener.accept().unwrap();
    drop(accepted);

    wait_for(&events, |e| *e == EndpointEvent::StateChanged(false));
    assert_eq!(client.state(), EndpointState::Closed);
    assert!(client.peer_addr().is_none());
    assert!(matches!(client.send(None, b"x"), Err(Error::NotOpen)));

    // Already reported; disconnect must not report again
    client.disconnect().unwrap();
    assert!(events.try_recv().is_err());
}

#[test]
fn test_reconnect_while_open() {
    let first = TcpListener::bind("127.0.0.1:0").unwrap();
    let second = TcpListener::bind("127.0.0.1:0").unwrap();

    let mut client = TcpClientEndpoint::new(EndpointOptions::default());
    client.connect(&first.local_addr().unwrap().to_string()).unwrap();
    client
        .connect(&second.local_addr().unwrap().to_string())
        .unwrap();
    assert_eq!(client.peer_addr(), second.local_addr().ok());
}

//! State shared between an endpoint's I/O threads and its consumer

use crate::buffer::ReceiveBuffer;
use crate::counters::EndpointCounters;
use crate::events::{EndpointEvent, EventSender};
use crate::registry::ConnectionRegistry;
use crossbeam_channel::Receiver;
use parking_lot::{Mutex, MutexGuard};
use std::net::SocketAddr;

/// Everything guarded by the endpoint lock
pub(crate) struct Inner<B> {
    pub buffer: B,
    pub counters: EndpointCounters,
    pub peers: ConnectionRegistry,
}

/// One lock for buffer, counters and registry, plus the event channel
pub(crate) struct Shared<B> {
    inner: Mutex<Inner<B>>,
    events: EventSender,
}

impl<B: ReceiveBuffer> Shared<B> {
    pub fn new(buffer: B, event_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                buffer,
                counters: EndpointCounters::default(),
                peers: ConnectionRegistry::new(),
            }),
            events: EventSender::new(event_capacity),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Inner<B>> {
        self.inner.lock()
    }

    /// Buffer one receive event and count it
    pub fn store_rx(&self, data: &[u8]) {
        let mut inner = self.inner.lock();
        inner.buffer.store(data);
        inner.counters.record_rx(data.len());
    }

    /// Buffer one datagram from `addr`, registering the sender if unseen.
    ///
    /// Returns the sender's index and whether it was new.
    pub fn store_rx_from(&self, addr: SocketAddr, data: &[u8]) -> (usize, bool) {
        let mut inner = self.inner.lock();
        let registered = inner.peers.register(addr);
        inner.buffer.store(data);
        inner.counters.record_rx(data.len());
        registered
    }

    pub fn take_pending(&self) -> Option<Vec<u8>> {
        self.inner.lock().buffer.take()
    }

    pub fn record_tx(&self, len: usize) {
        self.inner.lock().counters.record_tx(len);
    }

    pub fn counters(&self) -> EndpointCounters {
        self.inner.lock().counters
    }

    pub fn reset_counters(&self) {
        self.inner.lock().counters.reset();
    }

    /// Address of the peer at `index`
    pub fn peer_addr(&self, index: usize) -> Option<SocketAddr> {
        self.inner.lock().peers.get(index).map(|p| p.addr)
    }

    pub fn peer_count(&self) -> usize {
        self.inner.lock().peers.len()
    }

    pub fn peer_info(&self, index: usize) -> Option<String> {
        self.inner.lock().peers.describe(index)
    }

    /// Drop every peer and report each one as disconnected
    pub fn disconnect_all_peers(&self) {
        let drained = self.inner.lock().peers.drain();
        for peer in drained {
            self.events
                .emit(EndpointEvent::PeerDisconnected(peer.describe()));
        }
    }

    pub fn emit(&self, event: EndpointEvent) {
        self.events.emit(event);
    }

    /// Count a completed write and report it
    pub fn sent(&self, target: Option<SocketAddr>, data: &[u8]) {
        self.record_tx(data.len());
        self.events.emit(EndpointEvent::DataSent {
            target,
            data: data.to_vec(),
        });
    }

    pub fn subscribe(&self) -> Receiver<EndpointEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::FrameQueue;

    #[test]
    fn test_store_rx_from_registers_once() {
        let shared = Shared::new(FrameQueue::new(4, 16), 8);
        let a: SocketAddr = "10.0.0.5:5000".parse().unwrap();

        assert_eq!(shared.store_rx_from(a, b"one"), (0, true));
        assert_eq!(shared.store_rx_from(a, b"two"), (0, false));
        assert_eq!(shared.peer_count(), 1);

        let c = shared.counters();
        assert_eq!(c.rx_packets, 2);
        assert_eq!(c.rx_bytes, 6);
        assert_eq!(shared.take_pending().unwrap(), b"one");
    }

    #[test]
    fn test_disconnect_all_peers_emits() {
        let shared = Shared::new(FrameQueue::new(4, 16), 8);
        let events = shared.subscribe();
        shared.store_rx_from("10.0.0.5:5000".parse().unwrap(), b"x");
        shared.disconnect_all_peers();

        assert_eq!(shared.peer_count(), 0);
        assert_eq!(
            events.try_recv().unwrap(),
            EndpointEvent::PeerDisconnected("10.0.0.5:5000".to_string())
        );
    }

    #[test]
    fn test_sent_counts_and_reports() {
        let shared = Shared::new(FrameQueue::new(4, 16), 8);
        let events = shared.subscribe();
        shared.sent(None, b"abc");
        assert_eq!(shared.counters().tx_bytes, 3);
        assert_eq!(
            events.try_recv().unwrap(),
            EndpointEvent::DataSent {
                target: None,
                data: b"abc".to_vec()
            }
        );
    }
}

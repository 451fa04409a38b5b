//! Notifications raised by endpoints toward their consumer
//!
//! Each endpoint owns a bounded crossbeam channel. I/O threads publish with
//! `try_send`, so a consumer that stops draining loses notifications instead
//! of stalling the receive path. The buffered data itself is unaffected.

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use std::net::SocketAddr;

/// Default notification channel capacity
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Endpoint notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointEvent {
    /// New data was buffered. `peer` is the registry index at receipt time on
    /// server endpoints and `None` elsewhere.
    DataReady { peer: Option<usize> },
    /// Bytes were written. `target` is `None` for serial ports.
    DataSent {
        target: Option<SocketAddr>,
        data: Vec<u8>,
    },
    /// A peer was accepted or first heard from (`"address:port"`)
    PeerConnected(String),
    /// A peer went away or was removed (`"address:port"`)
    PeerDisconnected(String),
    /// Endpoint opened (`true`) or closed (`false`)
    StateChanged(bool),
}

/// Publishing half of an endpoint's notification channel
#[derive(Clone)]
pub struct EventSender {
    tx: Sender<EndpointEvent>,
    rx: Receiver<EndpointEvent>,
}

impl EventSender {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self { tx, rx }
    }

    /// Publish without blocking; dropped if the channel is full
    pub fn emit(&self, event: EndpointEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                log::trace!("Event channel full, dropping {:?}", event);
            }
            // We hold a receiver ourselves, so this cannot happen
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// A consumer handle. Every clone competes for the same events.
    pub fn subscribe(&self) -> Receiver<EndpointEvent> {
        self.rx.clone()
    }
}

//! Ordered list of peers discovered on a server endpoint
//!
//! Peers are identified by `(address, port)`. Consumers address them by
//! position, and positions shift down by one on every removal, so an index is
//! only meaningful for the event that reported it. Resolve by address for
//! anything that outlives that event.

use std::net::SocketAddr;

/// Registered peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionRecord {
    pub addr: SocketAddr,
}

impl ConnectionRecord {
    /// `"address:port"` description
    pub fn describe(&self) -> String {
        self.addr.to_string()
    }
}

/// Append / remove-by-identity peer list
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    peers: Vec<ConnectionRecord>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a peer unless already present.
    ///
    /// Returns the peer's index and whether it was newly added.
    pub fn register(&mut self, addr: SocketAddr) -> (usize, bool) {
        if let Some(index) = self.index_of(addr) {
            return (index, false);
        }
        self.peers.push(ConnectionRecord { addr });
        (self.peers.len() - 1, true)
    }

    /// Remove a peer by identity, returning the index it had
    pub fn remove(&mut self, addr: SocketAddr) -> Option<usize> {
        let index = self.index_of(addr)?;
        self.peers.remove(index);
        Some(index)
    }

    /// Current index of a peer
    pub fn index_of(&self, addr: SocketAddr) -> Option<usize> {
        self.peers.iter().position(|p| p.addr == addr)
    }

    /// Peer at `index`, if in range
    pub fn get(&self, index: usize) -> Option<&ConnectionRecord> {
        self.peers.get(index)
    }

    /// `"address:port"` of the peer at `index`
    pub fn describe(&self, index: usize) -> Option<String> {
        self.get(index).map(ConnectionRecord::describe)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Remove every peer, returning them in registration order
    pub fn drain(&mut self) -> Vec<ConnectionRecord> {
        std::mem::take(&mut self.peers)
    }
}

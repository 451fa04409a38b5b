//! UDP server endpoint
//!
//! Every datagram from an unseen `(address, port)` adds a registry entry, and
//! replies address peers by their registry index. An optional liveness monitor
//! rebinds the socket when reception stalls.

use super::shared::Shared;
use super::{
    Endpoint, EndpointKind, EndpointOptions, EndpointState, MAX_DATAGRAM, READ_TIMEOUT, is_timeout,
    join_within, resolve_addr,
};
use crate::buffer::FrameQueue;
use crate::counters::EndpointCounters;
use crate::error::{Error, Result};
use crate::events::EndpointEvent;
use crate::liveness::{LivenessMonitor, LivenessTarget};
use crate::registry::ConnectionRecord;
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const REBIND_ATTEMPTS: u32 = 3;
const REBIND_BACKOFF: Duration = Duration::from_millis(50);

struct BoundServer {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

/// Socket state shared with the liveness monitor
struct UdpServerCore {
    shared: Arc<Shared<FrameQueue>>,
    bound: Mutex<Option<BoundServer>>,
}

impl UdpServerCore {
    fn bind(&self, addr: SocketAddr) -> Result<SocketAddr> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(READ_TIMEOUT))?;
        let local_addr = socket.local_addr()?;
        let socket = Arc::new(socket);

        let running = Arc::new(AtomicBool::new(true));
        let reader = {
            let socket = Arc::clone(&socket);
            let shared = Arc::clone(&self.shared);
            let running = Arc::clone(&running);
            thread::Builder::new()
                .name(format!("udp-server-{}", local_addr.port()))
                .spawn(move || recv_loop(socket, shared, running))
                .map_err(|e| Error::Other(format!("Failed to spawn UDP reader: {}", e)))?
        };

        *self.bound.lock() = Some(BoundServer {
            socket,
            local_addr,
            running,
            reader: Some(reader),
        });
        log::info!("UDP server bound to {}", local_addr);
        self.shared.emit(EndpointEvent::StateChanged(true));
        Ok(local_addr)
    }

    /// Release the socket and join its reader. Returns the address it had.
    fn unbind(&self) -> Option<SocketAddr> {
        let mut bound = self.bound.lock().take()?;
        bound.running.store(false, Ordering::Relaxed);
        if let Some(reader) = bound.reader.take()
            && join_within(reader, READ_TIMEOUT * 5).is_some()
        {
            log::warn!("UDP reader on {} did not stop in time", bound.local_addr);
        }
        drop(bound.socket);
        log::info!("UDP server on {} unbound", bound.local_addr);
        self.shared.emit(EndpointEvent::StateChanged(false));
        Some(bound.local_addr)
    }

    fn socket(&self) -> Result<Arc<UdpSocket>> {
        self.bound
            .lock()
            .as_ref()
            .map(|b| Arc::clone(&b.socket))
            .ok_or(Error::NotOpen)
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.bound.lock().as_ref().map(|b| b.local_addr)
    }

    fn transmit(&self, addr: SocketAddr, data: &[u8]) -> Result<usize> {
        let socket = self.socket()?;
        if data.is_empty() {
            return Ok(0);
        }
        let sent = socket.send_to(data, addr)?;
        log::trace!("UDP tx {} bytes to {}", sent, addr);
        self.shared.sent(Some(addr), &data[..sent]);
        Ok(sent)
    }
}

impl LivenessTarget for UdpServerCore {
    fn rx_packets(&self) -> u64 {
        self.shared.counters().rx_packets
    }

    fn is_open(&self) -> bool {
        self.bound.lock().is_some()
    }

    /// Peers survive the rebind; only the socket is replaced
    fn rebind(&self) -> Result<()> {
        let Some(addr) = self.unbind() else {
            return Err(Error::NotOpen);
        };
        let mut attempt = 1;
        loop {
            match self.bind(addr) {
                Ok(_) => return Ok(()),
                Err(e) if attempt < REBIND_ATTEMPTS => {
                    log::warn!("Rebind of {} failed (attempt {}): {}", addr, attempt, e);
                    attempt += 1;
                    thread::sleep(REBIND_BACKOFF);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn recv_loop(socket: Arc<UdpSocket>, shared: Arc<Shared<FrameQueue>>, running: Arc<AtomicBool>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    while running.load(Ordering::Relaxed) {
        match socket.recv_from(&mut buf) {
            Ok((n, from)) => {
                let (index, is_new) = shared.store_rx_from(from, &buf[..n]);
                if is_new {
                    let description = ConnectionRecord { addr: from }.describe();
                    log::info!("UDP peer discovered: {}", description);
                    shared.emit(EndpointEvent::PeerConnected(description));
                }
                log::trace!("UDP rx {} bytes from {} (peer {})", n, from, index);
                shared.emit(EndpointEvent::DataReady { peer: Some(index) });
            }
            Err(ref e) if is_timeout(e) => continue,
            Err(e) => {
                log::debug!("UDP recv error: {}", e);
            }
        }
    }
}

pub struct UdpServerEndpoint {
    options: EndpointOptions,
    core: Arc<UdpServerCore>,
    monitor: Option<LivenessMonitor>,
}

impl UdpServerEndpoint {
    pub fn new(options: EndpointOptions) -> Self {
        let shared = Shared::new(
            FrameQueue::new(options.frame_depth, options.frame_size),
            options.event_capacity,
        );
        let core = UdpServerCore {
            shared: Arc::new(shared),
            bound: Mutex::new(None),
        };
        Self {
            options,
            core: Arc::new(core),
            monitor: None,
        }
    }

    /// Bind the receiving socket. A bound server is fully closed first.
    pub fn bind(&mut self, addr: &str) -> Result<()> {
        let addr = resolve_addr(addr)?;
        self.close()?;
        self.core.bind(addr)?;

        let liveness = &self.options.liveness;
        if liveness.enabled {
            let target: Arc<dyn LivenessTarget> = self.core.clone();
            match LivenessMonitor::start(
                target,
                Duration::from_millis(liveness.check_interval_ms),
                liveness.max_error_count,
            ) {
                Ok(monitor) => self.monitor = Some(monitor),
                Err(e) => {
                    self.core.unbind();
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Reply to an explicit address
    pub fn send_to(&self, addr: SocketAddr, data: &[u8]) -> Result<usize> {
        self.core.transmit(addr, data)
    }

    /// Forget a peer. Indices of later peers shift down by one.
    pub fn remove_peer(&self, addr: SocketAddr) -> Option<usize> {
        let index = self.core.shared.lock().peers.remove(addr)?;
        self.core
            .shared
            .emit(EndpointEvent::PeerDisconnected(ConnectionRecord { addr }.describe()));
        Some(index)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.core.local_addr()
    }

    /// Rebind on the current address, keeping known peers
    pub fn rebind(&self) -> Result<()> {
        self.core.rebind()
    }
}

impl Endpoint for UdpServerEndpoint {
    fn kind(&self) -> EndpointKind {
        EndpointKind::UdpServer
    }

    fn state(&self) -> EndpointState {
        if self.core.is_open() {
            EndpointState::Open
        } else {
            EndpointState::Closed
        }
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut monitor) = self.monitor.take() {
            monitor.stop();
        }
        if self.core.unbind().is_some() {
            self.core.shared.disconnect_all_peers();
        }
        Ok(())
    }

    fn send(&self, peer: Option<usize>, data: &[u8]) -> Result<usize> {
        // Checked first so an unknown index never touches the socket
        self.core.socket()?;
        let index =
            peer.ok_or_else(|| Error::InvalidParameter("peer index required".to_string()))?;
        let addr = self
            .core
            .shared
            .peer_addr(index)
            .ok_or(Error::PeerNotFound(index))?;
        self.core.transmit(addr, data)
    }

    fn read_pending(&self) -> Option<Vec<u8>> {
        self.core.shared.take_pending()
    }

    fn counters(&self) -> EndpointCounters {
        self.core.shared.counters()
    }

    fn reset_counters(&self) {
        self.core.shared.reset_counters();
    }

    fn connection_count(&self) -> usize {
        self.core.shared.peer_count()
    }

    fn peer_info(&self, index: usize) -> Option<String> {
        self.core.shared.peer_info(index)
    }

    fn events(&self) -> Receiver<EndpointEvent> {
        self.core.shared.subscribe()
    }
}

impl Drop for UdpServerEndpoint {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbound_send_fails() {
        let server = UdpServerEndpoint::new(EndpointOptions::default());
        assert!(matches!(server.send(Some(0), b"x"), Err(Error::NotOpen)));
        assert!(server.rebind().is_err());
    }

    #[test]
    fn test_rebind_keeps_address() {
        let mut server = UdpServerEndpoint::new(EndpointOptions::default());
        server.bind("127.0.0.1:0").unwrap();
        let before = server.local_addr().unwrap();

        server.rebind().unwrap();
        assert_eq!(server.local_addr(), Some(before));
        assert!(server.is_open());
    }

    #[test]
    fn test_close_emits_state_change() {
        let mut server = UdpServerEndpoint::new(EndpointOptions::default());
        let events = server.events();
        server.bind("127.0.0.1:0").unwrap();
        server.close().unwrap();
        assert_eq!(events.try_recv().unwrap(), EndpointEvent::StateChanged(true));
        assert_eq!(events.try_recv().unwrap(), EndpointEvent::StateChanged(false));
        assert!(!server.is_open());
    }
}

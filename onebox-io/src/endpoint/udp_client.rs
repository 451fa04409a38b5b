//! UDP client endpoint

use super::shared::Shared;
use super::{
    Endpoint, EndpointKind, EndpointOptions, EndpointState, MAX_DATAGRAM, READ_TIMEOUT, is_timeout,
    join_within, resolve_addr,
};
use crate::buffer::FrameQueue;
use crate::counters::EndpointCounters;
use crate::error::{Error, Result};
use crate::events::EndpointEvent;
use crate::registry::ConnectionRecord;
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

struct Bound {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

/// Sends to one target at a time and buffers every datagram it receives.
pub struct UdpClientEndpoint {
    options: EndpointOptions,
    shared: Arc<Shared<FrameQueue>>,
    bound: Option<Bound>,
    target: Mutex<Option<SocketAddr>>,
}

impl UdpClientEndpoint {
    pub fn new(options: EndpointOptions) -> Self {
        let shared = Shared::new(
            FrameQueue::new(options.frame_depth, options.frame_size),
            options.event_capacity,
        );
        Self {
            options,
            shared: Arc::new(shared),
            bound: None,
            target: Mutex::new(None),
        }
    }

    /// Bind the local socket. A bound endpoint is unbound first.
    pub fn bind(&mut self, local: &str) -> Result<()> {
        let local = resolve_addr(local)?;
        self.close()?;

        let socket = UdpSocket::bind(local)?;
        socket.set_read_timeout(Some(READ_TIMEOUT))?;
        let local_addr = socket.local_addr()?;
        let socket = Arc::new(socket);

        let running = Arc::new(AtomicBool::new(true));
        let reader = {
            let socket = Arc::clone(&socket);
            let shared = Arc::clone(&self.shared);
            let running = Arc::clone(&running);
            thread::Builder::new()
                .name(format!("udp-client-{}", local_addr.port()))
                .spawn(move || recv_loop(socket, shared, running))
                .map_err(|e| Error::Other(format!("Failed to spawn UDP reader: {}", e)))?
        };

        self.bound = Some(Bound {
            socket,
            local_addr,
            running,
            reader: Some(reader),
        });
        log::info!("UDP client bound to {}", local_addr);
        self.shared.emit(EndpointEvent::StateChanged(true));
        Ok(())
    }

    /// Change where `send` goes; takes effect without rebinding
    pub fn set_target(&self, addr: &str) -> Result<()> {
        let addr = resolve_addr(addr)?;
        *self.target.lock() = Some(addr);
        log::debug!("UDP client target -> {}", addr);
        Ok(())
    }

    pub fn target(&self) -> Option<SocketAddr> {
        *self.target.lock()
    }

    /// Send to an explicit address and make it the target
    pub fn send_to(&self, addr: SocketAddr, data: &[u8]) -> Result<usize> {
        *self.target.lock() = Some(addr);
        self.transmit(addr, data)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.bound.as_ref().map(|b| b.local_addr)
    }

    fn transmit(&self, addr: SocketAddr, data: &[u8]) -> Result<usize> {
        let bound = self.bound.as_ref().ok_or(Error::NotOpen)?;
        if data.is_empty() {
            return Ok(0);
        }
        let sent = bound.socket.send_to(data, addr)?;
        log::trace!("UDP tx {} bytes to {}", sent, addr);
        self.shared.sent(Some(addr), &data[..sent]);
        Ok(sent)
    }
}

fn recv_loop(socket: Arc<UdpSocket>, shared: Arc<Shared<FrameQueue>>, running: Arc<AtomicBool>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    while running.load(Ordering::Relaxed) {
        match socket.recv_from(&mut buf) {
            Ok((n, from)) => {
                shared.store_rx(&buf[..n]);
                log::trace!("UDP rx {} bytes from {}", n, from);
                shared.emit(EndpointEvent::DataReady { peer: None });
            }
            Err(ref e) if is_timeout(e) => continue,
            Err(e) => {
                // e.g. ICMP port unreachable surfacing as ConnectionReset
                log::debug!("UDP recv error: {}", e);
            }
        }
    }
}

impl Endpoint for UdpClientEndpoint {
    fn kind(&self) -> EndpointKind {
        EndpointKind::UdpClient
    }

    fn state(&self) -> EndpointState {
        if self.bound.is_some() {
            EndpointState::Open
        } else {
            EndpointState::Closed
        }
    }

    fn close(&mut self) -> Result<()> {
        let Some(mut bound) = self.bound.take() else {
            return Ok(());
        };
        bound.running.store(false, Ordering::Relaxed);
        if let Some(reader) = bound.reader.take()
            && join_within(reader, READ_TIMEOUT * 5).is_some()
        {
            log::warn!("UDP reader on {} did not stop in time", bound.local_addr);
        }
        log::info!("UDP client on {} closed", bound.local_addr);
        self.shared.emit(EndpointEvent::StateChanged(false));
        Ok(())
    }

    fn send(&self, _peer: Option<usize>, data: &[u8]) -> Result<usize> {
        if self.bound.is_none() {
            return Err(Error::NotOpen);
        }
        let target = self.target().ok_or(Error::NoTarget)?;
        self.transmit(target, data)
    }

    fn read_pending(&self) -> Option<Vec<u8>> {
        self.shared.take_pending()
    }

    fn counters(&self) -> EndpointCounters {
        self.shared.counters()
    }

    fn reset_counters(&self) {
        self.shared.reset_counters();
    }

    /// 1 once a target is known
    fn connection_count(&self) -> usize {
        usize::from(self.target().is_some())
    }

    fn peer_info(&self, index: usize) -> Option<String> {
        if index != 0 {
            return None;
        }
        self.target().map(|addr| ConnectionRecord { addr }.describe())
    }

    fn events(&self) -> Receiver<EndpointEvent> {
        self.shared.subscribe()
    }
}

impl Drop for UdpClientEndpoint {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

//! TCP client endpoint

use super::shared::Shared;
use super::{
    Endpoint, EndpointKind, EndpointOptions, EndpointState, READ_TIMEOUT, is_disconnect,
    is_timeout, join_within, resolve_addr, write_all_within,
};
use crate::buffer::FrameQueue;
use crate::counters::EndpointCounters;
use crate::error::{Error, Result};
use crate::events::EndpointEvent;
use crate::registry::ConnectionRecord;
use crossbeam_channel::Receiver;
use std::io::Read;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    running: Arc<AtomicBool>,
    /// Cleared exactly once, by whichever side ends the connection first
    connected: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

pub struct TcpClientEndpoint {
    options: EndpointOptions,
    shared: Arc<Shared<FrameQueue>>,
    conn: Option<Connection>,
}

impl TcpClientEndpoint {
    pub fn new(options: EndpointOptions) -> Self {
        let shared = Shared::new(
            FrameQueue::new(options.frame_depth, options.frame_size),
            options.event_capacity,
        );
        Self {
            options,
            shared: Arc::new(shared),
            conn: None,
        }
    }

    /// Connect using the configured connect timeout
    pub fn connect(&mut self, addr: &str) -> Result<()> {
        self.connect_with_timeout(addr, self.options.connect_timeout)
    }

    /// Connect to `addr`, giving up after `timeout`.
    ///
    /// An existing connection is torn down first. On failure the endpoint
    /// stays closed.
    pub fn connect_with_timeout(&mut self, addr: &str, timeout: Duration) -> Result<()> {
        let peer = resolve_addr(addr)?;
        self.disconnect()?;

        let stream = match TcpStream::connect_timeout(&peer, timeout) {
            Ok(stream) => stream,
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                log::warn!("TCP connect to {} timed out after {:?}", peer, timeout);
                return Err(Error::Timeout(peer));
            }
            Err(e) => {
                log::warn!("TCP connect to {} failed: {}", peer, e);
                return Err(e.into());
            }
        };
        stream.set_read_timeout(Some(READ_TIMEOUT))?;
        stream.set_write_timeout(Some(self.options.write_timeout))?;
        stream.set_nodelay(true)?;
        let reader_stream = stream.try_clone()?;

        let running = Arc::new(AtomicBool::new(true));
        let connected = Arc::new(AtomicBool::new(true));
        let reader = {
            let shared = Arc::clone(&self.shared);
            let running = Arc::clone(&running);
            let connected = Arc::clone(&connected);
            let frame_size = self.options.frame_size;
            thread::Builder::new()
                .name(format!("tcp-client-{}", peer.port()))
                .spawn(move || read_loop(reader_stream, peer, frame_size, shared, running, connected))
                .map_err(|e| Error::Other(format!("Failed to spawn reader: {}", e)))?
        };

        self.conn = Some(Connection {
            stream,
            peer,
            running,
            connected,
            reader: Some(reader),
        });
        log::info!("TCP connected to {}", peer);
        self.shared.emit(EndpointEvent::StateChanged(true));
        Ok(())
    }

    /// Half-close, wait for the reader to see the teardown, then force it.
    pub fn disconnect(&mut self) -> Result<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };
        let was_connected = conn.connected.swap(false, Ordering::AcqRel);

        if was_connected && let Err(e) = conn.stream.shutdown(Shutdown::Write) {
            log::debug!("Half-close of {} failed: {}", conn.peer, e);
        }
        // The reader exits on the peer's FIN or on its next read timeout
        conn.running.store(false, Ordering::Relaxed);
        if let Some(reader) = conn.reader.take()
            && let Some(stuck) = join_within(reader, self.options.disconnect_timeout)
        {
            log::warn!("Graceful close of {} timed out, forcing", conn.peer);
            let _ = conn.stream.shutdown(Shutdown::Both);
            if join_within(stuck, READ_TIMEOUT * 2).is_some() {
                log::error!("TCP reader for {} is still running", conn.peer);
            }
        }

        if was_connected {
            log::info!("TCP disconnected from {}", conn.peer);
            self.shared.emit(EndpointEvent::StateChanged(false));
        }
        Ok(())
    }

    /// Remote address while connected
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.live().map(|c| c.peer)
    }

    fn live(&self) -> Option<&Connection> {
        self.conn
            .as_ref()
            .filter(|c| c.connected.load(Ordering::Acquire))
    }
}

fn read_loop(
    mut stream: TcpStream,
    peer: SocketAddr,
    frame_size: usize,
    shared: Arc<Shared<FrameQueue>>,
    running: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
) {
    let mut buf = vec![0u8; frame_size];

    while running.load(Ordering::Relaxed) {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                shared.store_rx(&buf[..n]);
                log::trace!("TCP rx {} bytes from {}", n, peer);
                shared.emit(EndpointEvent::DataReady { peer: None });
            }
            Err(ref e) if is_timeout(e) => continue,
            Err(ref e) if is_disconnect(e) => break,
            Err(e) => {
                log::warn!("TCP read error from {}: {}", peer, e);
                break;
            }
        }
    }

    if connected.swap(false, Ordering::AcqRel) {
        log::info!("TCP connection closed by {}", peer);
        shared.emit(EndpointEvent::StateChanged(false));
    }
}

impl Endpoint for TcpClientEndpoint {
    fn kind(&self) -> EndpointKind {
        EndpointKind::TcpClient
    }

    fn state(&self) -> EndpointState {
        if self.live().is_some() {
            EndpointState::Open
        } else {
            EndpointState::Closed
        }
    }

    fn close(&mut self) -> Result<()> {
        self.disconnect()
    }

    fn send(&self, _peer: Option<usize>, data: &[u8]) -> Result<usize> {
        let conn = self.live().ok_or(Error::NotOpen)?;
        if data.is_empty() {
            return Ok(0);
        }
        write_all_within(&conn.stream, conn.peer, data)?;
        log::trace!("TCP tx {} bytes to {}", data.len(), conn.peer);
        self.shared.sent(Some(conn.peer), data);
        Ok(data.len())
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

    fn connection_count(&self) -> usize {
        usize::from(self.live().is_some())
    }

    fn peer_info(&self, index: usize) -> Option<String> {
        if index != 0 {
            return None;
        }
        self.live().map(|c| ConnectionRecord { addr: c.peer }.describe())
    }

    fn events(&self) -> Receiver<EndpointEvent> {
        self.shared.subscribe()
    }
}

impl Drop for TcpClientEndpoint {
    fn drop(&mut self) {
        let _ = self.disconnect();
    }
}

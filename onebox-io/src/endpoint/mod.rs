//! Transport endpoints
//!
//! Every endpoint runs its socket or port I/O on dedicated threads and hands
//! received bytes to a buffer shared with the consumer. The consumer drains
//! that buffer with [`Endpoint::read_pending`] and learns about activity from
//! the channel returned by [`Endpoint::events`].
//!
//! Opening calls differ per kind (`listen`, `connect`, `bind`, `open`) and live
//! on the concrete types. Everything else goes through the [`Endpoint`] trait.

mod serial;
mod shared;
mod tcp_client;
mod tcp_server;
mod udp_client;
mod udp_server;

pub use serial::SerialPortEndpoint;
pub use tcp_client::TcpClientEndpoint;
pub use tcp_server::TcpServerEndpoint;
pub use udp_client::UdpClientEndpoint;
pub use udp_server::UdpServerEndpoint;

use crate::config::{AppConfig, EndpointConfig, LivenessConfig};
use crate::counters::EndpointCounters;
use crate::error::{Error, Result};
use crate::events::EndpointEvent;
use crossbeam_channel::Receiver;
use std::io::{self, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Socket read timeout; bounds how long a reader takes to notice shutdown
pub(crate) const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Largest UDP payload
pub(crate) const MAX_DATAGRAM: usize = 65_536;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    TcpServer,
    TcpClient,
    UdpServer,
    UdpClient,
    Serial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    Closed,
    Open,
}

/// Operations shared by all endpoint kinds
pub trait Endpoint: Send {
    fn kind(&self) -> EndpointKind;

    fn state(&self) -> EndpointState;

    fn is_open(&self) -> bool {
        self.state() == EndpointState::Open
    }

    /// Release the socket or port. Closing a closed endpoint is a no-op.
    fn close(&mut self) -> Result<()>;

    /// Write `data` and return the number of bytes sent.
    ///
    /// Server endpoints require `peer`, a registry index from a recent event.
    /// Client and serial endpoints ignore it. Empty payloads are accepted and
    /// do nothing.
    fn send(&self, peer: Option<usize>, data: &[u8]) -> Result<usize>;

    /// Drain whatever the receive buffer has ready
    fn read_pending(&self) -> Option<Vec<u8>>;

    fn counters(&self) -> EndpointCounters;

    fn reset_counters(&self);

    fn connection_count(&self) -> usize;

    /// `"address:port"` of the peer at `index`
    fn peer_info(&self, index: usize) -> Option<String>;

    /// Notification stream for this endpoint
    fn events(&self) -> Receiver<EndpointEvent>;
}

/// Runtime knobs shared by all endpoints, usually taken from [`AppConfig`]
#[derive(Debug, Clone)]
pub struct EndpointOptions {
    pub frame_depth: usize,
    pub frame_size: usize,
    pub ring_capacity: usize,
    pub event_capacity: usize,
    pub connect_timeout: Duration,
    pub disconnect_timeout: Duration,
    pub write_timeout: Duration,
    pub poll_interval: Duration,
    pub terminator: Option<u8>,
    pub min_unread: usize,
    pub liveness: LivenessConfig,
}

impl EndpointOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            frame_depth: config.buffer.frame_depth,
            frame_size: config.buffer.frame_size,
            ring_capacity: config.buffer.ring_capacity,
            event_capacity: config.buffer.event_capacity,
            connect_timeout: Duration::from_millis(config.tcp.connect_timeout_ms),
            disconnect_timeout: Duration::from_millis(config.tcp.disconnect_timeout_ms),
            write_timeout: Duration::from_millis(config.tcp.write_timeout_ms),
            poll_interval: Duration::from_millis(config.serial.poll_interval_ms),
            terminator: config.serial.terminator,
            min_unread: config.serial.min_unread,
            liveness: config.liveness.clone(),
        }
    }
}

impl Default for EndpointOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Build and open the endpoint described by `config`
pub fn open_endpoint(config: &EndpointConfig, options: EndpointOptions) -> Result<Box<dyn Endpoint>> {
    let endpoint: Box<dyn Endpoint> = match config {
        EndpointConfig::TcpServer { address } => {
            let mut server = TcpServerEndpoint::new(options);
            server.listen(address)?;
            Box::new(server)
        }
        EndpointConfig::TcpClient { address } => {
            let mut client = TcpClientEndpoint::new(options);
            client.connect(address)?;
            Box::new(client)
        }
        EndpointConfig::UdpServer { address } => {
            let mut server = UdpServerEndpoint::new(options);
            server.bind(address)?;
            Box::new(server)
        }
        EndpointConfig::UdpClient { address, target } => {
            let mut client = UdpClientEndpoint::new(options);
            client.bind(address)?;
            if let Some(target) = target {
                client.set_target(target)?;
            }
            Box::new(client)
        }
        EndpointConfig::Serial(settings) => {
            let mut port = SerialPortEndpoint::new(settings.clone(), options);
            port.open()?;
            Box::new(port)
        }
    };
    Ok(endpoint)
}

/// Resolve `"host:port"` to the first socket address it names
pub(crate) fn resolve_addr(addr: &str) -> Result<SocketAddr> {
    addr.to_socket_addrs()
        .map_err(|e| Error::InvalidAddress(format!("{}: {}", addr, e)))?
        .next()
        .ok_or_else(|| Error::InvalidAddress(addr.to_string()))
}

/// Wait up to `timeout` for a thread to finish.
///
/// Returns the handle back if the thread is still running at the deadline.
pub(crate) fn join_within(handle: JoinHandle<()>, timeout: Duration) -> Option<JoinHandle<()>> {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return Some(handle);
        }
        thread::sleep(Duration::from_millis(5));
    }
    let name = handle.thread().name().unwrap_or("unnamed").to_string();
    if handle.join().is_err() {
        log::error!("Thread {} panicked", name);
    }
    None
}

/// Write all of `data`, failing with [`Error::Timeout`] when the stream's
/// write timeout expires because `peer` stopped reading
pub(crate) fn write_all_within(stream: &TcpStream, peer: SocketAddr, data: &[u8]) -> Result<()> {
    let mut writer = stream;
    match writer.write_all(data) {
        Ok(()) => Ok(()),
        Err(ref e) if is_timeout(e) => {
            log::warn!("Write to {} timed out, peer is not reading", peer);
            Err(Error::Timeout(peer))
        }
        Err(e) => Err(e.into()),
    }
}

/// Read returned because of the socket read timeout, not because of data
pub(crate) fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

/// Remote end went away
pub(crate) fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::NotConnected
    )
}

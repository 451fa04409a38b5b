//! TCP server endpoint
//!
//! An accept thread polls a non-blocking listener and starts one reader thread
//! per accepted peer. Readers push each `read()` into the shared frame queue
//! and report it with the peer's registry index at that moment.

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
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Read;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const ACCEPT_POLL: Duration = Duration::from_millis(10);

/// Live connection to one peer
struct PeerConn {
    stream: TcpStream,
    reader: Option<JoinHandle<()>>,
}

/// State the accept and reader threads share with the endpoint
struct ServerCtx {
    shared: Shared<FrameQueue>,
    conns: Mutex<HashMap<SocketAddr, PeerConn>>,
    frame_size: usize,
    write_timeout: Duration,
}

/// Listening socket plus the thread accepting on it
struct Listening {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    accept_thread: Option<JoinHandle<()>>,
}

pub struct TcpServerEndpoint {
    options: EndpointOptions,
    ctx: Arc<ServerCtx>,
    listening: Option<Listening>,
}

impl TcpServerEndpoint {
    pub fn new(options: EndpointOptions) -> Self {
        let ctx = ServerCtx {
            shared: Shared::new(
                FrameQueue::new(options.frame_depth, options.frame_size),
                options.event_capacity,
            ),
            conns: Mutex::new(HashMap::new()),
            frame_size: options.frame_size,
            write_timeout: options.write_timeout,
        };
        Self {
            options,
            ctx: Arc::new(ctx),
            listening: None,
        }
    }

    /// Start accepting on `addr`. An open server is closed first.
    pub fn listen(&mut self, addr: &str) -> Result<()> {
        let addr = resolve_addr(addr)?;
        if self.listening.is_some() {
            self.close()?;
        }

        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let running = Arc::new(AtomicBool::new(true));
        let accept_running = Arc::clone(&running);
        let ctx = Arc::clone(&self.ctx);
        let accept_thread = thread::Builder::new()
            .name(format!("tcp-accept-{}", local_addr.port()))
            .spawn(move || accept_loop(listener, ctx, accept_running))
            .map_err(|e| Error::Other(format!("Failed to spawn accept thread: {}", e)))?;

        self.listening = Some(Listening {
            local_addr,
            running,
            accept_thread: Some(accept_thread),
        });
        log::info!("TCP server listening on {}", local_addr);
        self.ctx.shared.emit(EndpointEvent::StateChanged(true));
        Ok(())
    }

    /// Listening address, including an OS-assigned port
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listening.as_ref().map(|l| l.local_addr)
    }

    fn stop(&self, mut listening: Listening) {
        let deadline = Instant::now() + self.options.disconnect_timeout;

        listening.running.store(false, Ordering::Relaxed);
        if let Some(handle) = listening.accept_thread.take()
            && join_within(handle, self.options.disconnect_timeout).is_some()
        {
            log::warn!("TCP accept thread did not stop in time");
        }

        let conns: Vec<(SocketAddr, PeerConn)> = self.ctx.conns.lock().drain().collect();
        for (addr, conn) in &conns {
            if let Err(e) = conn.stream.shutdown(Shutdown::Both) {
                log::debug!("Shutdown of {} failed: {}", addr, e);
            }
        }
        for (addr, mut conn) in conns {
            if let Some(reader) = conn.reader.take() {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if join_within(reader, remaining).is_some() {
                    log::warn!("Reader for {} did not stop in time", addr);
                }
            }
        }

        self.ctx.shared.disconnect_all_peers();
        log::info!("TCP server on {} closed", listening.local_addr);
        self.ctx.shared.emit(EndpointEvent::StateChanged(false));
    }
}

fn accept_loop(listener: TcpListener, ctx: Arc<ServerCtx>, running: Arc<AtomicBool>) {
    while running.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, addr)) => {
                if let Err(e) = admit(&ctx, &running, stream, addr) {
                    log::error!("Failed to admit {}: {}", addr, e);
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
            }
            Err(e) => {
                log::warn!("TCP accept error: {}", e);
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
    log::debug!("TCP accept loop exiting");
}

/// Register an accepted peer and start its reader
fn admit(
    ctx: &Arc<ServerCtx>,
    running: &Arc<AtomicBool>,
    stream: TcpStream,
    addr: SocketAddr,
) -> Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    stream.set_write_timeout(Some(ctx.write_timeout))?;
    stream.set_nodelay(true)?;
    let reader_stream = stream.try_clone()?;

    // Registered and announced before the reader starts, so its first read
    // has an index and a fast disconnect cannot be reported ahead of it
    ctx.shared.lock().peers.register(addr);
    ctx.conns.lock().insert(
        addr,
        PeerConn {
            stream,
            reader: None,
        },
    );
    let description = ConnectionRecord { addr }.describe();
    log::info!("TCP peer connected: {}", description);
    ctx.shared.emit(EndpointEvent::PeerConnected(description.clone()));

    let reader_ctx = Arc::clone(ctx);
    let reader_running = Arc::clone(running);
    let spawned = thread::Builder::new()
        .name(format!("tcp-peer-{}", addr.port()))
        .spawn(move || read_loop(reader_stream, addr, reader_ctx, reader_running));

    match spawned {
        Ok(handle) => {
            // Absent if the reader already saw the peer leave
            if let Some(conn) = ctx.conns.lock().get_mut(&addr) {
                conn.reader = Some(handle);
            }
            Ok(())
        }
        Err(e) => {
            ctx.conns.lock().remove(&addr);
            if ctx.shared.lock().peers.remove(addr).is_some() {
                ctx.shared.emit(EndpointEvent::PeerDisconnected(description));
            }
            Err(Error::Other(format!("Failed to spawn reader: {}", e)))
        }
    }
}

fn read_loop(mut stream: TcpStream, addr: SocketAddr, ctx: Arc<ServerCtx>, running: Arc<AtomicBool>) {
    let mut buf = vec![0u8; ctx.frame_size];

    while running.load(Ordering::Relaxed) {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                let index = {
                    let mut inner = ctx.shared.lock();
                    inner.buffer.push(&buf[..n]);
                    inner.counters.record_rx(n);
                    inner.peers.index_of(addr)
                };
                log::trace!("TCP rx {} bytes from {}", n, addr);
                ctx.shared.emit(EndpointEvent::DataReady { peer: index });
            }
            Err(ref e) if is_timeout(e) => continue,
            Err(ref e) if is_disconnect(e) => break,
            Err(e) => {
                log::warn!("TCP read error from {}: {}", addr, e);
                break;
            }
        }
    }

    // During close() the endpoint reports the teardown itself
    if !running.load(Ordering::Relaxed) {
        return;
    }
    ctx.conns.lock().remove(&addr);
    if ctx.shared.lock().peers.remove(addr).is_some() {
        let description = ConnectionRecord { addr }.describe();
        log::info!("TCP peer disconnected: {}", description);
        ctx.shared.emit(EndpointEvent::PeerDisconnected(description));
    }
}

impl Endpoint for TcpServerEndpoint {
    fn kind(&self) -> EndpointKind {
        EndpointKind::TcpServer
    }

    fn state(&self) -> EndpointState {
        if self.listening.is_some() {
            EndpointState::Open
        } else {
            EndpointState::Closed
        }
    }

    fn close(&mut self) -> Result<()> {
        if let Some(listening) = self.listening.take() {
            self.stop(listening);
        }
        Ok(())
    }

    fn send(&self, peer: Option<usize>, data: &[u8]) -> Result<usize> {
        if self.listening.is_none() {
            return Err(Error::NotOpen);
        }
        let index =
            peer.ok_or_else(|| Error::InvalidParameter("peer index required".to_string()))?;
        let addr = self
            .ctx
            .shared
            .peer_addr(index)
            .ok_or(Error::PeerNotFound(index))?;
        if data.is_empty() {
            return Ok(0);
        }

        let stream = match self.ctx.conns.lock().get(&addr) {
            Some(conn) => conn.stream.try_clone()?,
            None => return Err(Error::PeerNotFound(index)),
        };
        write_all_within(&stream, addr, data)?;
        log::trace!("TCP tx {} bytes to {}", data.len(), addr);
        self.ctx.shared.sent(Some(addr), data);
        Ok(data.len())
    }

    fn read_pending(&self) -> Option<Vec<u8>> {
        self.ctx.shared.take_pending()
    }

    fn counters(&self) -> EndpointCounters {
        self.ctx.shared.counters()
    }

    fn reset_counters(&self) {
        self.ctx.shared.reset_counters();
    }

    fn connection_count(&self) -> usize {
        self.ctx.shared.peer_count()
    }

    fn peer_info(&self, index: usize) -> Option<String> {
        self.ctx.shared.peer_info(index)
    }

    fn events(&self) -> Receiver<EndpointEvent> {
        self.ctx.shared.subscribe()
    }
}

impl Drop for TcpServerEndpoint {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

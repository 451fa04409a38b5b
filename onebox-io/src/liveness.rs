//! Receive-stagnation watchdog for UDP servers
//!
//! A UDP socket can stop delivering datagrams without reporting an error
//! (interface flaps, address changes). The monitor samples the receive packet
//! counter every `check_interval` and rebinds the socket when the counter has
//! not moved for `max_error_count` consecutive samples.
//!
//! An idle but healthy link looks identical to a dead one, so quiet servers
//! get rebound periodically. The monitor is off unless configured.

use crate::error::{Error, Result};
use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// What the monitor watches and acts on
pub trait LivenessTarget: Send + Sync {
    fn rx_packets(&self) -> u64;
    fn is_open(&self) -> bool;
    /// Close and bind again on the same address
    fn rebind(&self) -> Result<()>;
}

/// Counts consecutive samples without receive growth
#[derive(Debug, Clone)]
pub struct StagnationDetector {
    max_error_count: u32,
    baseline: Option<u64>,
    error_count: u32,
}

impl StagnationDetector {
    pub fn new(max_error_count: u32) -> Self {
        Self {
            max_error_count: max_error_count.max(1),
            baseline: None,
            error_count: 0,
        }
    }

    /// Feed one counter sample. Returns `true` when a rebind is due, after
    /// which the stagnation count starts over.
    pub fn observe(&mut self, rx_packets: u64) -> bool {
        let Some(previous) = self.baseline.replace(rx_packets) else {
            return false;
        };
        // Anything but an unchanged counter is activity (a drop means the
        // counters were reset)
        if rx_packets != previous {
            self.error_count = 0;
            return false;
        }
        self.error_count += 1;
        if self.error_count >= self.max_error_count {
            self.error_count = 0;
            return true;
        }
        false
    }

    /// Forget the baseline; the next sample starts a new one
    pub fn reset(&mut self) {
        self.baseline = None;
        self.error_count = 0;
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }
}

/// Background thread running a [`StagnationDetector`] against a target
pub struct LivenessMonitor {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl LivenessMonitor {
    pub fn start(
        target: Arc<dyn LivenessTarget>,
        check_interval: Duration,
        max_error_count: u32,
    ) -> Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("udp-liveness".to_string())
            .spawn(move || {
                let mut detector = StagnationDetector::new(max_error_count);
                loop {
                    match stop_rx.recv_timeout(check_interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        // Stop requested or monitor dropped
                        _ => break,
                    }

                    if !target.is_open() {
                        detector.reset();
                        continue;
                    }
                    if detector.observe(target.rx_packets()) {
                        log::warn!(
                            "No datagrams for {} checks, rebinding UDP server",
                            max_error_count
                        );
                        if let Err(e) = target.rebind() {
                            log::error!("Liveness rebind failed: {}", e);
                        }
                        detector.reset();
                    }
                }
                log::debug!("Liveness monitor exiting");
            })
            .map_err(|e| Error::Other(format!("Failed to spawn liveness monitor: {}", e)))?;

        log::info!(
            "Liveness monitor started (every {:?}, threshold {})",
            check_interval,
            max_error_count
        );
        Ok(Self {
            stop_tx,
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            log::error!("Liveness monitor panicked");
        }
    }
}

impl Drop for LivenessMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

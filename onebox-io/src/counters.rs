//! Per-endpoint traffic counters

/// Packet and byte totals in each direction
///
/// Monotonic between explicit resets. Endpoints update these under the same
/// lock as the receive buffer, so a snapshot always matches what was buffered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EndpointCounters {
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
}

impl EndpointCounters {
    /// Count one outbound packet of `len` bytes
    pub fn record_tx(&mut self, len: usize) {
        self.tx_packets += 1;
        self.tx_bytes += len as u64;
    }

    /// Count one inbound packet of `len` bytes
    pub fn record_rx(&mut self, len: usize) {
        self.rx_packets += 1;
        self.rx_bytes += len as u64;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Traffic since `earlier`, saturating at zero across a reset
    pub fn delta_since(&self, earlier: &EndpointCounters) -> EndpointCounters {
        EndpointCounters {
            tx_packets: self.tx_packets.saturating_sub(earlier.tx_packets),
            rx_packets: self.rx_packets.saturating_sub(earlier.rx_packets),
            tx_bytes: self.tx_bytes.saturating_sub(earlier.tx_bytes),
            rx_bytes: self.rx_bytes.saturating_sub(earlier.rx_bytes),
        }
    }
}

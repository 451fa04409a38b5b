//! Receive buffers shared between an endpoint's I/O thread and its consumer

mod byte_ring;
mod frame_queue;

pub use byte_ring::{ByteRing, DEFAULT_RING_CAPACITY};
pub use frame_queue::{DEFAULT_FRAME_DEPTH, DEFAULT_FRAME_SIZE, FrameQueue};

/// Buffer an endpoint stores received bytes into
///
/// Implementations never block and never grow: overflow discards old data.
pub trait ReceiveBuffer: Send {
    /// Store one receive event's bytes
    fn store(&mut self, data: &[u8]);

    /// Take whatever the consumer should see next, if anything is ready
    fn take(&mut self) -> Option<Vec<u8>>;
}

impl ReceiveBuffer for FrameQueue {
    fn store(&mut self, data: &[u8]) {
        self.push(data);
    }

    fn take(&mut self) -> Option<Vec<u8>> {
        self.pop()
    }
}

impl ReceiveBuffer for ByteRing {
    fn store(&mut self, data: &[u8]) {
        self.write(data);
    }

    fn take(&mut self) -> Option<Vec<u8>> {
        let data = self.read_all();
        (!data.is_empty()).then_some(data)
    }
}

//! Fixed-depth queue of fixed-size frame slots
//!
//! Each push occupies one slot regardless of its length, so the queue holds
//! whole receive events (one TCP read, one UDP datagram) rather than a byte
//! stream.
//!
//! ```text
//! slots[depth][slot_capacity]
//!
//!   push() ──▶ slots[write] ; write = (write + 1) % depth
//!   pop()  ◀── slots[read]  ; read  = (read  + 1) % depth
//! ```
//!
//! # Overflow
//!
//! The write cursor never waits for the reader. A producer that gets more than
//! `depth` pushes ahead overwrites the oldest unread slots, and those frames are
//! lost. Memory stays bounded and the receive thread never blocks on a slow
//! consumer.
//!
//! The queue does no locking of its own; the owning endpoint serializes access.

/// Default number of slots
pub const DEFAULT_FRAME_DEPTH: usize = 100;

/// Default slot capacity in bytes
pub const DEFAULT_FRAME_SIZE: usize = 4096;

struct FrameSlot {
    data: Box<[u8]>,
    len: usize,
}

impl FrameSlot {
    fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
        }
    }
}

/// Ring of `depth` frame slots with independent read and write cursors
pub struct FrameQueue {
    slots: Vec<FrameSlot>,
    slot_capacity: usize,
    write: usize,
    read: usize,
}

impl FrameQueue {
    /// Create a queue with `depth` slots of `slot_capacity` bytes each.
    ///
    /// Zero values are raised to 1.
    pub fn new(depth: usize, slot_capacity: usize) -> Self {
        let depth = depth.max(1);
        let slot_capacity = slot_capacity.max(1);
        Self {
            slots: (0..depth).map(|_| FrameSlot::new(slot_capacity)).collect(),
            slot_capacity,
            write: 0,
            read: 0,
        }
    }

    /// Copy `data` into the slot at the write cursor.
    ///
    /// Input longer than the slot capacity is truncated. Returns `false` only
    /// for empty input, which is ignored.
    pub fn push(&mut self, data: &[u8]) -> bool {
        if data.is_empty() {
            return false;
        }

        let len = data.len().min(self.slot_capacity);
        let slot = &mut self.slots[self.write];
        slot.data[..len].copy_from_slice(&data[..len]);
        slot.len = len;

        if len < data.len() {
            log::trace!(
                "Frame truncated from {} to {} bytes",
                data.len(),
                self.slot_capacity
            );
        }

        self.write = (self.write + 1) % self.slots.len();
        true
    }

    /// Take the frame at the read cursor.
    ///
    /// Returns `None` when that slot is empty, leaving both cursors unchanged.
    pub fn pop(&mut self) -> Option<Vec<u8>> {
        let slot = &mut self.slots[self.read];
        if slot.len == 0 {
            return None;
        }

        let frame = slot.data[..slot.len].to_vec();
        slot.data.fill(0);
        slot.len = 0;

        self.read = (self.read + 1) % self.slots.len();
        Some(frame)
    }

    /// Drop every frame and reset both cursors
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.data.fill(0);
            slot.len = 0;
        }
        self.write = 0;
        self.read = 0;
    }

    /// Number of unread frames
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.len > 0).count()
    }

    /// True when no frame is waiting
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|s| s.len == 0)
    }

    /// Number of slots
    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    /// Maximum bytes kept per frame
    pub fn slot_capacity(&self) -> usize {
        self.slot_capacity
    }
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_DEPTH, DEFAULT_FRAME_SIZE)
    }
}

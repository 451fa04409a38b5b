//! Circular byte buffer for stream-oriented receive paths
//!
//! Unlike [`FrameQueue`](super::FrameQueue) this keeps no record boundaries:
//! consecutive writes concatenate. When a write would exceed capacity the
//! oldest unread bytes are overwritten, so a reader always sees the most recent
//! `capacity` bytes in arrival order.
//!
//! An optional terminator byte lets a line-oriented consumer wait for a whole
//! message. Readiness only looks at the last two bytes written, so a message
//! that never terminates is never reported ready. Framing beyond that hint is
//! the caller's job.

/// Default capacity (serial receive buffer)
pub const DEFAULT_RING_CAPACITY: usize = 2000;

/// Fixed-capacity ring that drops the oldest bytes on overflow
pub struct ByteRing {
    data: Vec<u8>,
    write: usize,      // Next position to write
    read: usize,       // First unread byte
    unread: usize,     // Bytes between read and write
    min_unread: usize, // Readiness threshold
    terminator: Option<u8>,
}

impl ByteRing {
    /// Create a ring holding up to `capacity` bytes (raised to 1 if zero)
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity.max(1)],
            write: 0,
            read: 0,
            unread: 0,
            min_unread: 1,
            terminator: None,
        }
    }

    /// Append bytes, wrapping at the end and overwriting the oldest unread data
    pub fn write(&mut self, bytes: &[u8]) {
        let cap = self.data.len();
        let mut rest = bytes;

        while !rest.is_empty() {
            let n = rest.len().min(cap - self.write);
            self.data[self.write..self.write + n].copy_from_slice(&rest[..n]);
            self.write = (self.write + n) % cap;
            rest = &rest[n..];
        }

        let total = self.unread + bytes.len();
        if total >= cap {
            if total > cap {
                log::trace!("Byte ring overflow: dropped {} oldest bytes", total - cap);
            }
            // Full: the oldest surviving byte sits right at the write cursor
            self.unread = cap;
            self.read = self.write;
        } else {
            self.unread = total;
        }
    }

    /// Drain up to `n` unread bytes.
    ///
    /// Returns an empty vector when [`has_unread_data`](Self::has_unread_data)
    /// is false.
    pub fn read(&mut self, n: usize) -> Vec<u8> {
        if !self.has_unread_data() {
            return Vec::new();
        }
        let n = n.min(self.unread);
        let out = self.copy_out(n);
        self.read = (self.read + n) % self.data.len();
        self.unread -= n;
        out
    }

    /// Drain every unread byte and reset both cursors.
    ///
    /// Returns an empty vector when [`has_unread_data`](Self::has_unread_data)
    /// is false.
    pub fn read_all(&mut self) -> Vec<u8> {
        if !self.has_unread_data() {
            return Vec::new();
        }
        let out = self.copy_out(self.unread);
        self.clear();
        out
    }

    /// True when enough bytes are waiting and, if a terminator is set, it
    /// appears in the last two bytes written.
    pub fn has_unread_data(&self) -> bool {
        self.unread >= self.min_unread && self.terminator_present()
    }

    /// Number of unread bytes, regardless of readiness
    pub fn unread_len(&self) -> usize {
        self.unread
    }

    /// Buffer capacity
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Minimum unread bytes before data is reported ready (at least 1)
    pub fn set_min_unread(&mut self, min: usize) {
        self.min_unread = min.max(1);
    }

    /// Require `byte` to end a message before data is reported ready
    pub fn set_terminator(&mut self, byte: u8) {
        self.terminator = Some(byte);
    }

    /// Report data ready without waiting for a terminator
    pub fn clear_terminator(&mut self) {
        self.terminator = None;
    }

    /// Drop all unread data
    pub fn clear(&mut self) {
        self.read = 0;
        self.write = 0;
        self.unread = 0;
    }

    fn copy_out(&self, n: usize) -> Vec<u8> {
        let cap = self.data.len();
        let first = n.min(cap - self.read);
        let mut out = Vec::with_capacity(n);
        out.extend_from_slice(&self.data[self.read..self.read + first]);
        out.extend_from_slice(&self.data[..n - first]);
        out
    }

    fn terminator_present(&self) -> bool {
        let Some(term) = self.terminator else {
            return true;
        };
        let cap = self.data.len();
        // Only bytes that are still unread count
        (1..=self.unread.min(2)).any(|back| self.data[(self.write + cap - back) % cap] == term)
    }
}

impl Default for ByteRing {
    fn default() -> Self {
        Self::new(DEFAULT_RING_CAPACITY)
    }
}

// ABOUTME: Growable write-only byte store used as the encoder's only sink.
// ABOUTME: Capacity doubles on demand and is never shrunk while the buffer is reused.

use crate::types::limits;

/// A growable, write-only output buffer.
///
/// Growth is geometric: when an append does not fit, the capacity is doubled
/// (or raised to exactly what is needed, if that is larger).
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    bytes: Vec<u8>,
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::with_capacity(limits::INITIAL_BUFFER_SIZE)
    }
}

impl OutputBuffer {
    /// Create an empty buffer with the default initial capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer with the given initial capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity.max(1)),
        }
    }

    /// Number of bytes written so far.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if nothing has been written.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Current backing capacity.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.bytes.capacity()
    }

    #[inline]
    fn ensure(&mut self, additional: usize) {
        let needed = self.bytes.len() + additional;
        let capacity = self.bytes.capacity();
        if needed > capacity {
            let target = needed.max(capacity * 2);
            self.bytes.reserve_exact(target - self.bytes.len());
        }
    }

    /// Append a single byte.
    #[inline]
    pub fn push(&mut self, byte: u8) {
        self.ensure(1);
        self.bytes.push(byte);
    }

    /// Append bytes to the end of the buffer.
    #[inline]
    pub fn append(&mut self, bytes: &[u8]) {
        self.ensure(bytes.len());
        self.bytes.extend_from_slice(bytes);
    }

    /// The written prefix.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Return the written prefix as an owned byte vector, leaving the buffer intact.
    #[must_use]
    pub fn materialize(&self) -> Vec<u8> {
        self.bytes.clone()
    }

    /// Discard written bytes past `len`. Used to drop a partially written value.
    #[inline]
    pub(crate) fn truncate(&mut self, len: usize) {
        self.bytes.truncate(len);
    }

    /// Forget all written bytes, keeping the capacity.
    #[inline]
    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    /// Take the written bytes, leaving an empty buffer with the same capacity behind.
    pub fn take(&mut self) -> Vec<u8> {
        let capacity = self.bytes.capacity();
        std::mem::replace(&mut self.bytes, Vec::with_capacity(capacity))
    }

    /// Consume the buffer and return the written bytes.
    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }
}

impl std::io::Write for OutputBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.append(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

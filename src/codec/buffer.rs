//! Growable byte accumulator.
//!
//! Used for message reassembly and as inflate/deflate scratch space. The
//! logical length resets on [`FrameBuffer::clear`] while the allocation is
//! kept, so one buffer serves every message on a connection.

// ============================================================================
// FrameBuffer
// ============================================================================

/// Byte accumulator with amortized-constant-time growth.
#[derive(Debug, Clone, Default)]
pub struct FrameBuffer {
    data: Vec<u8>,
}

impl FrameBuffer {
    /// Creates an empty buffer with `capacity` bytes preallocated.
    #[inline]
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    /// Appends `bytes`, growing capacity to at least double when needed.
    pub fn append(&mut self, bytes: &[u8]) {
        self.reserve(bytes.len());
        self.data.extend_from_slice(bytes);
    }

    /// Ensures room for `additional` more bytes.
    ///
    /// Grows to `max(2 * capacity, len + additional)`.
    pub fn reserve(&mut self, additional: usize) {
        let spare = self.data.capacity() - self.data.len();
        if additional <= spare {
            return;
        }
        let target = (self.data.capacity() * 2).max(self.data.len() + additional);
        self.data.reserve_exact(target - self.data.len());
    }

    /// Returns a copy of the bytes appended since the last clear.
    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        self.data.clone()
    }

    /// Moves the accumulated bytes out, leaving the buffer empty.
    ///
    /// The returned vector is sized to its contents; the buffer keeps its
    /// allocation for the next message.
    #[must_use]
    pub fn take(&mut self) -> Vec<u8> {
        let bytes = self.data.as_slice().to_vec();
        self.data.clear();
        bytes
    }

    /// Resets the logical length to zero, keeping the allocation.
    #[inline]
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Returns the accumulated bytes.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Number of accumulated bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if nothing has been appended since the last clear.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Allocated capacity in bytes.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Drops the first `count` bytes, keeping the allocation.
    #[inline]
    pub(crate) fn consume_front(&mut self, count: usize) {
        let count = count.min(self.data.len());
        self.data.drain(..count);
    }

    /// Drops the last `count` bytes.
    #[inline]
    pub(crate) fn truncate_tail(&mut self, count: usize) {
        let len = self.data.len().saturating_sub(count);
        self.data.truncate(len);
    }

    /// Direct access for codecs writing into spare capacity.
    #[inline]
    pub(crate) fn as_mut_vec(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Fixed-capacity circular byte buffer
//!
//! The device's response path appends whatever a transport read delivered and
//! repeatedly asks the codec whether a whole frame is present. [`RingBuffer`]
//! supports that pattern without shuffling bytes back to the front: `peek`
//! copies the logical contents out non-destructively and `skip` discards the
//! bytes a decode consumed.

use crate::error::{VdlError, VdlResult};

/// Fixed-capacity circular byte store.
///
/// `len() == (write_pos - read_pos) mod capacity` and `len() <= capacity()`
/// always hold; a full buffer is distinguished from an empty one by `len`.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    data: Box<[u8]>,
    read_pos: usize,
    write_pos: usize,
    len: usize,
}

impl RingBuffer {
    /// Create a buffer. A zero capacity is clamped to one byte.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            read_pos: 0,
            write_pos: 0,
            len: 0,
        }
    }

    /// Create a buffer, rejecting a zero capacity.
    pub fn try_new(capacity: usize) -> VdlResult<Self> {
        if capacity == 0 {
            return Err(VdlError::invalid_argument("ring buffer capacity must be > 0"));
        }
        Ok(Self::new(capacity))
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of buffered bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Free space left.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.capacity() - self.len
    }

    /// Append as much of `src` as fits. Returns the number of bytes written.
    pub fn write(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.remaining());
        if n == 0 {
            return 0;
        }

        let capacity = self.capacity();
        let first = n.min(capacity - self.write_pos);
        self.data[self.write_pos..self.write_pos + first].copy_from_slice(&src[..first]);
        if first < n {
            self.data[..n - first].copy_from_slice(&src[first..n]);
        }

        self.write_pos = (self.write_pos + n) % capacity;
        self.len += n;
        n
    }

    /// Copy up to `dst.len()` bytes out without consuming them.
    pub fn peek(&self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.len);
        if n == 0 {
            return 0;
        }

        let capacity = self.capacity();
        let first = n.min(capacity - self.read_pos);
        dst[..first].copy_from_slice(&self.data[self.read_pos..self.read_pos + first]);
        if first < n {
            dst[first..n].copy_from_slice(&self.data[..n - first]);
        }
        n
    }

    /// Copy up to `dst.len()` bytes out and consume them.
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        let n = self.peek(dst);
        self.skip(n)
    }

    /// Discard up to `count` bytes. Returns the number discarded.
    pub fn skip(&mut self, count: usize) -> usize {
        let n = count.min(self.len);
        self.read_pos = (self.read_pos + n) % self.capacity();
        self.len -= n;
        n
    }

    /// Drop all contents.
    pub fn clear(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
        self.len = 0;
    }

    /// Peek the whole logical contents into a new vector.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.len];
        self.peek(&mut out);
        out
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_basic_write_read() {
        let mut ring = RingBuffer::new(16);
        assert!(ring.is_empty());
        assert_eq!(ring.write(b"hello"), 5);
        assert_eq!(ring.len(), 5);

        let mut out = [0u8; 5];
        assert_eq!(ring.read(&mut out), 5);
        assert_eq!(&out, b"hello");
        assert!(ring.is_empty());
    }

    #[test]
    fn test_partial_write_on_overflow() {
        let mut ring = RingBuffer::new(4);
        assert_eq!(ring.write(&[1, 2, 3, 4, 5, 6]), 4);
        assert!(ring.is_full());
        assert_eq!(ring.write(&[7]), 0);
        assert_eq!(ring.to_vec(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_wraparound_capacity_eight() {
        let mut ring = RingBuffer::new(8);
        assert_eq!(ring.write(&[0, 1, 2, 3, 4, 5, 6, 7]), 8);

        let mut head = [0u8; 4];
        assert_eq!(ring.read(&mut head), 4);
        assert_eq!(head, [0, 1, 2, 3]);

        assert_eq!(ring.write(&[8, 9, 10, 11]), 4);
        assert!(ring.is_full());

        let mut all = [0u8; 8];
        assert_eq!(ring.read(&mut all), 8);
        assert_eq!(all, [4, 5, 6, 7, 8, 9, 10, 11]);
    }

    #[test]
    fn test_peek_is_non_destructive() {
        let mut ring = RingBuffer::new(8);
        ring.write(b"abc");

        let mut out = [0u8; 8];
        assert_eq!(ring.peek(&mut out), 3);
        assert_eq!(ring.peek(&mut out), 3);
        assert_eq!(ring.len(), 3);
        assert_eq!(&out[..3], b"abc");
    }

    #[test]
    fn test_skip_and_clear() {
        let mut ring = RingBuffer::new(8);
        ring.write(b"abcdef");
        assert_eq!(ring.skip(2), 2);
        assert_eq!(ring.to_vec(), b"cdef".to_vec());
        assert_eq!(ring.skip(100), 4);
        assert!(ring.is_empty());

        ring.write(b"xy");
        ring.clear();
        assert!(ring.is_empty());
        assert_eq!(ring.remaining(), 8);
    }

    #[test]
    fn test_zero_capacity() {
        assert!(RingBuffer::try_new(0).is_err());
        assert_eq!(RingBuffer::new(0).capacity(), 1);
    }

    proptest! {
        #[test]
        fn prop_fifo_order(chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..12), 1..20)) {
            let mut ring = RingBuffer::new(16);
            let mut expected = std::collections::VecDeque::new();

            for (i, chunk) in chunks.iter().enumerate() {
                let written = ring.write(chunk);
                expected.extend(chunk[..written].iter().copied());

                // Drain a varying amount to move the read position around
                let mut out = vec![0u8; i % 7];
                let n = ring.read(&mut out);
                for byte in &out[..n] {
                    prop_assert_eq!(Some(*byte), expected.pop_front());
                }
                prop_assert_eq!(ring.len(), expected.len());
            }

            let rest = ring.to_vec();
            prop_assert_eq!(rest, expected.into_iter().collect::<Vec<_>>());
        }

        #[test]
        fn prop_peek_skip_equals_read(prefill in prop::collection::vec(any::<u8>(), 0..10),
                                      data in prop::collection::vec(any::<u8>(), 0..16),
                                      n in 0usize..20) {
            let mut a = RingBuffer::new(16);
            a.write(&prefill);
            let mut discard = vec![0u8; prefill.len() / 2];
            a.read(&mut discard);
            a.write(&data);
            let mut b = a.clone();

            let mut via_read = vec![0u8; n];
            let read_n = a.read(&mut via_read);

            let mut via_peek = vec![0u8; n];
            let peek_n = b.peek(&mut via_peek);
            let skip_n = b.skip(peek_n);

            prop_assert_eq!(read_n, peek_n);
            prop_assert_eq!(peek_n, skip_n);
            prop_assert_eq!(&via_read[..read_n], &via_peek[..peek_n]);
            prop_assert_eq!(a.to_vec(), b.to_vec());
        }
    }
}

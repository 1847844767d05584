//! Fixed-capacity storage blocks.
//!
//! A block never spans physical storage: callers split writes across blocks
//! and only hand each block the bytes that fit. Backing storage is allocated
//! on first write.

use super::error::{ErrorKind, KindResult};

/// A fixed-capacity byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    capacity: usize,
    /// End of written data within the block.
    size: usize,
    /// Empty until first write, then exactly `capacity` bytes.
    data: Vec<u8>,
}

impl Block {
    /// Create an empty block of the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            size: 0,
            data: Vec::new(),
        }
    }

    /// Block capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes of logical content.
    pub fn len(&self) -> usize {
        self.size
    }

    /// Returns true if no content has been recorded.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Replace the block's content, discarding anything past capacity.
    ///
    /// Returns the number of bytes stored.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        self.data = vec![0; self.capacity];
        let n = bytes.len().min(self.capacity);
        self.data[..n].copy_from_slice(&bytes[..n]);
        self.size = n;
        n
    }

    /// Write `bytes` starting at `offset` within the block.
    pub fn write_at(&mut self, bytes: &[u8], offset: usize) -> KindResult<usize> {
        if offset > self.capacity {
            return Err(ErrorKind::OffsetOutOfRange);
        }
        let end = offset
            .checked_add(bytes.len())
            .ok_or(ErrorKind::WriteOverflow)?;
        if end > self.capacity {
            return Err(ErrorKind::WriteOverflow);
        }

        self.allocate();
        self.data[offset..end].copy_from_slice(bytes);
        self.size = self.size.max(end);
        Ok(bytes.len())
    }

    /// The full backing buffer. Empty if the block was never written.
    pub fn read(&self) -> &[u8] {
        &self.data
    }

    /// The backing buffer from `offset` on.
    ///
    /// Unallocated blocks yield an empty slice; their content reads as zeros.
    pub fn read_at(&self, offset: usize) -> KindResult<&[u8]> {
        if offset > self.capacity {
            return Err(ErrorKind::OffsetOutOfRange);
        }
        Ok(self.data.get(offset..).unwrap_or(&[]))
    }

    /// Free space after the end of content.
    pub fn available(&self) -> usize {
        self.capacity - self.size
    }

    /// Whether any data has been written.
    pub fn busy(&self) -> bool {
        !self.data.is_empty()
    }

    /// Mark the whole block as content; unwritten bytes read as zero.
    pub(crate) fn fill(&mut self) {
        self.size = self.capacity;
    }

    /// Cut logical content to `len` bytes and zero everything after it.
    pub(crate) fn shrink_to(&mut self, len: usize) {
        let len = len.min(self.capacity);
        if let Some(tail) = self.data.get_mut(len..) {
            tail.fill(0);
        }
        self.size = len;
    }

    /// Set logical length without writing; new bytes read as zero.
    pub(crate) fn extend_to(&mut self, len: usize) {
        self.size = self.size.max(len.min(self.capacity));
    }

    fn allocate(&mut self) {
        if self.data.is_empty() {
            self.data = vec![0; self.capacity];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_block_is_lazy() {
        let block = Block::new(8);
        assert!(!block.busy());
        assert!(block.read().is_empty());
        assert_eq!(block.available(), 8);
    }

    #[test]
    fn test_write_discards_excess() {
        let mut block = Block::new(4);
        assert_eq!(block.write(b"abcdef"), 4);
        assert_eq!(block.read(), b"abcd");
        assert_eq!(block.available(), 0);
        assert!(block.busy());
    }

    #[test]
    fn test_write_replaces_content() {
        let mut block = Block::new(4);
        block.write(b"abcd");
        block.write(b"x");
        assert_eq!(block.read(), b"x\0\0\0");
        assert_eq!(block.len(), 1);
    }

    #[test]
    fn test_write_at_within_bounds() {
        let mut block = Block::new(8);
        block.write_at(b"lo", 3).unwrap();
        assert_eq!(block.read(), b"\0\0\0lo\0\0\0");
        assert_eq!(block.len(), 5);

        block.write_at(b"hel", 0).unwrap();
        assert_eq!(&block.read()[..5], b"hello");
        assert_eq!(block.len(), 5, "size is a high-water mark");
    }

    #[test]
    fn test_write_at_rejects_bad_offset() {
        let mut block = Block::new(4);
        assert_eq!(block.write_at(b"a", 5), Err(ErrorKind::OffsetOutOfRange));
        assert!(!block.busy(), "failed write must not allocate");
    }

    #[test]
    fn test_write_at_rejects_overflow() {
        let mut block = Block::new(4);
        assert_eq!(block.write_at(b"abc", 2), Err(ErrorKind::WriteOverflow));
        assert_eq!(block.write_at(b"", 4), Ok(0));
    }

    #[test]
    fn test_read_at() {
        let mut block = Block::new(4);
        block.write(b"abcd");
        assert_eq!(block.read_at(1).unwrap(), b"bcd");
        assert_eq!(block.read_at(4).unwrap(), b"");
        assert_eq!(block.read_at(5), Err(ErrorKind::OffsetOutOfRange));
        assert_eq!(Block::new(4).read_at(2).unwrap(), b"");
    }

    #[test]
    fn test_shrink_zeroes_tail() {
        let mut block = Block::new(4);
        block.write(b"abcd");
        block.shrink_to(1);
        assert_eq!(block.read(), b"a\0\0\0");
        block.fill();
        assert_eq!(block.len(), 4);
    }
}

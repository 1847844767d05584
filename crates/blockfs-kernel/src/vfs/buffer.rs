//! File content as an ordered sequence of blocks.
//!
//! Every block except the last is logically full; the last block's length
//! marks the precise end of content. Offsets are translated to a block index
//! and an intra-block offset, and multi-block writes are split here so a
//! single block is never asked to store more than its capacity.

use tracing::debug;

use super::block::Block;
use super::error::{ErrorKind, KindResult};

/// Growable, block-backed file content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buffer {
    block_size: usize,
    blocks: Vec<Block>,
}

impl Buffer {
    /// Create an empty buffer.
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size: block_size.max(1),
            blocks: Vec::new(),
        }
    }

    /// Create a buffer holding `bytes`.
    pub fn from_bytes(block_size: usize, bytes: &[u8]) -> Self {
        let mut buffer = Self::new(block_size);
        buffer.write(bytes);
        buffer
    }

    /// Capacity of each block.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of allocated blocks.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Bytes spanned by allocated blocks.
    pub fn capacity(&self) -> usize {
        self.blocks.len() * self.block_size
    }

    /// Precise content length.
    pub fn len(&self) -> usize {
        match self.blocks.last() {
            Some(last) => (self.blocks.len() - 1) * self.block_size + last.len(),
            None => 0,
        }
    }

    /// Returns true if the buffer holds no content.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The blocks backing this buffer.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Append `bytes` at the end of content.
    ///
    /// Spare room in the trailing block is used first; the rest goes into
    /// fresh blocks, each written in one shot.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        let mut rest = bytes;

        if let Some(tail) = self.blocks.last_mut() {
            let n = tail.available().min(rest.len());
            if n > 0 {
                let offset = tail.len();
                // Cannot overflow: `n` fits in the tail's free space.
                let _ = tail.write_at(&rest[..n], offset);
                rest = &rest[n..];
            }
        }

        for chunk in rest.chunks(self.block_size) {
            let mut block = Block::new(self.block_size);
            block.write(chunk);
            self.push_block(block);
        }

        bytes.len()
    }

    /// Write `bytes` at `offset`, extending the buffer as needed.
    ///
    /// An offset past the end leaves a gap of unallocated blocks that read
    /// as zero. The whole extent is validated, and room for every new block
    /// reserved, before any block is touched.
    pub fn write_at(&mut self, bytes: &[u8], offset: usize) -> KindResult<usize> {
        let end = offset
            .checked_add(bytes.len())
            .ok_or(ErrorKind::OffsetOutOfRange)?;
        if bytes.is_empty() {
            return Ok(0);
        }
        self.reserve_blocks(end.div_ceil(self.block_size))?;

        let first = offset / self.block_size;
        let gap = first.saturating_sub(self.blocks.len());
        if gap > 0 {
            debug!(gap, first, "sparse write");
        }
        while self.blocks.len() < first {
            self.push_block(Block::new(self.block_size));
        }

        let mut index = first;
        let mut intra = offset % self.block_size;
        let mut rest = bytes;
        while !rest.is_empty() {
            if index == self.blocks.len() {
                self.push_block(Block::new(self.block_size));
            }
            let n = (self.block_size - intra).min(rest.len());
            self.blocks[index].write_at(&rest[..n], intra)?;
            rest = &rest[n..];
            index += 1;
            intra = 0;
        }

        Ok(bytes.len())
    }

    /// Read into `buf` starting at `offset`.
    ///
    /// Returns the number of bytes copied, which is short when content runs
    /// out. Fails only when `offset` lies past the allocated blocks.
    pub fn read_at(&self, buf: &mut [u8], offset: usize) -> KindResult<usize> {
        if offset > self.capacity() {
            return Err(ErrorKind::OffsetOutOfRange);
        }

        let end = self.len().min(offset.saturating_add(buf.len()));
        let mut pos = offset;
        let mut written = 0;
        while pos < end {
            let index = pos / self.block_size;
            let intra = pos % self.block_size;
            let n = (self.block_size - intra).min(end - pos);

            let src = self.blocks[index].read_at(intra)?;
            let copied = src.len().min(n);
            buf[written..written + copied].copy_from_slice(&src[..copied]);
            buf[written + copied..written + n].fill(0);

            written += n;
            pos += n;
        }

        Ok(written)
    }

    /// The whole content.
    pub fn read_all(&self) -> Vec<u8> {
        let mut out = vec![0; self.len()];
        // Offset 0 is always in range.
        let n = self.read_at(&mut out, 0).unwrap_or(0);
        out.truncate(n);
        out
    }

    /// Set the content length to exactly `size`.
    ///
    /// Shrinking drops whole trailing blocks; growing appends unallocated
    /// blocks whose new bytes read as zero. A size whose blocks cannot be
    /// reserved fails with `OffsetOutOfRange` and leaves the buffer as is.
    pub fn truncate(&mut self, size: usize) -> KindResult<()> {
        let count = size.div_ceil(self.block_size);

        if count < self.blocks.len() {
            self.blocks.truncate(count);
        } else {
            self.reserve_blocks(count)?;
        }
        while self.blocks.len() < count {
            self.push_block(Block::new(self.block_size));
        }

        if let Some(last) = self.blocks.last_mut() {
            let tail = size - (count - 1) * self.block_size;
            if last.len() > tail {
                last.shrink_to(tail);
            } else {
                last.extend_to(tail);
            }
        }
        Ok(())
    }

    /// Make room for `count` blocks in total.
    fn reserve_blocks(&mut self, count: usize) -> KindResult<()> {
        let additional = count.saturating_sub(self.blocks.len());
        self.blocks
            .try_reserve_exact(additional)
            .map_err(|_| ErrorKind::OffsetOutOfRange)
    }

    /// Append a block; the previous tail becomes logically full.
    fn push_block(&mut self, block: Block) {
        if let Some(tail) = self.blocks.last_mut() {
            tail.fill();
        }
        self.blocks.push(block);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(buffer: &Buffer, offset: usize, size: usize) -> Vec<u8> {
        let mut buf = vec![0xff; size];
        let n = buffer.read_at(&mut buf, offset).unwrap();
        buf.truncate(n);
        buf
    }

    #[test]
    fn test_append_fills_tail_first() {
        let mut buffer = Buffer::new(4);
        buffer.write(b"ab");
        buffer.write(b"cdefg");
        assert_eq!(buffer.block_count(), 2);
        assert_eq!(buffer.len(), 7);
        assert_eq!(buffer.read_all(), b"abcdefg");
    }

    #[test]
    fn test_write_at_overwrites_across_blocks() {
        let mut buffer = Buffer::from_bytes(4, b"0123456789");
        buffer.write_at(b"XYZW", 2).unwrap();
        assert_eq!(buffer.read_all(), b"01XYZW6789");
        assert_eq!(buffer.block_count(), 3);
    }

    #[test]
    fn test_write_at_extends_past_end() {
        let mut buffer = Buffer::from_bytes(4, b"abc");
        buffer.write_at(b"defgh", 2).unwrap();
        assert_eq!(buffer.read_all(), b"abdefgh");
        assert_eq!(buffer.len(), 7);
    }

    #[test]
    fn test_sparse_write_reads_zero_gap() {
        let mut buffer = Buffer::from_bytes(4, b"ab");
        buffer.write_at(b"zz", 10).unwrap();
        assert_eq!(buffer.block_count(), 3);
        assert_eq!(buffer.len(), 12);
        assert_eq!(buffer.read_all(), b"ab\0\0\0\0\0\0\0\0zz");
    }

    #[test]
    fn test_sparse_gap_stays_unallocated() {
        let mut buffer = Buffer::new(8);
        buffer.write_at(b"z", 30).unwrap();
        let busy: Vec<bool> = buffer.blocks().iter().map(Block::busy).collect();
        assert_eq!(busy, [false, false, false, true]);
        assert_eq!(buffer.len(), 31);
        assert_eq!(read(&buffer, 0, 31)[..30], [0u8; 30]);
    }

    #[test]
    fn test_unreservable_extent_fails_cleanly() {
        let mut buffer = Buffer::from_bytes(4, b"abc");
        assert_eq!(
            buffer.write_at(b"x", usize::MAX - 8),
            Err(ErrorKind::OffsetOutOfRange)
        );
        assert_eq!(
            buffer.truncate(usize::MAX - 8),
            Err(ErrorKind::OffsetOutOfRange)
        );
        assert_eq!(buffer.block_count(), 1);
        assert_eq!(buffer.read_all(), b"abc");
    }

    #[test]
    fn test_sparse_write_into_empty_buffer() {
        let mut buffer = Buffer::new(4);
        buffer.write_at(b"x", 9).unwrap();
        assert_eq!(read(&buffer, 8, 4), b"\0x");
        assert_eq!(read(&buffer, 0, 4), b"\0\0\0\0");
    }

    #[test]
    fn test_write_at_exact_block_boundary() {
        let mut buffer = Buffer::from_bytes(4, b"abcd");
        buffer.write_at(b"ef", 4).unwrap();
        assert_eq!(buffer.block_count(), 2);
        assert_eq!(buffer.read_all(), b"abcdef");
    }

    #[test]
    fn test_empty_write_is_noop() {
        let mut buffer = Buffer::new(4);
        assert_eq!(buffer.write_at(b"", 100), Ok(0));
        assert_eq!(buffer.block_count(), 0);
    }

    #[test]
    fn test_write_at_overflowing_offset_fails_cleanly() {
        let mut buffer = Buffer::from_bytes(4, b"abc");
        assert_eq!(
            buffer.write_at(b"xy", usize::MAX),
            Err(ErrorKind::OffsetOutOfRange)
        );
        assert_eq!(buffer.read_all(), b"abc");
    }

    #[test]
    fn test_short_read_at_end() {
        let buffer = Buffer::from_bytes(4, b"hello");
        assert_eq!(read(&buffer, 3, 10), b"lo");
        assert_eq!(read(&buffer, 5, 10), b"");
        assert_eq!(read(&buffer, 8, 10), b"");
    }

    #[test]
    fn test_read_past_blocks_fails() {
        let buffer = Buffer::from_bytes(4, b"hello");
        let mut buf = [0u8; 4];
        assert_eq!(buffer.read_at(&mut buf, 9), Err(ErrorKind::OffsetOutOfRange));
        assert_eq!(Buffer::new(4).read_at(&mut buf, 0), Ok(0));
    }

    #[test]
    fn test_truncate_shrink_drops_blocks() {
        let mut buffer = Buffer::from_bytes(4, b"0123456789");
        buffer.truncate(5).unwrap();
        assert_eq!(buffer.block_count(), 2);
        assert_eq!(buffer.read_all(), b"01234");

        buffer.truncate(0).unwrap();
        assert_eq!(buffer.block_count(), 0);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_truncate_grow_reads_zero() {
        let mut buffer = Buffer::from_bytes(4, b"ab");
        buffer.truncate(9).unwrap();
        assert_eq!(buffer.block_count(), 3);
        assert!(!buffer.blocks()[2].busy());
        assert_eq!(buffer.capacity(), 12);
        assert_eq!(buffer.read_all(), b"ab\0\0\0\0\0\0\0");
    }

    #[test]
    fn test_truncate_then_grow_does_not_resurrect_data() {
        let mut buffer = Buffer::from_bytes(4, b"abcd");
        buffer.truncate(1).unwrap();
        buffer.truncate(4).unwrap();
        assert_eq!(buffer.read_all(), b"a\0\0\0");
    }

    #[test]
    fn test_truncate_zero_then_write() {
        let mut buffer = Buffer::from_bytes(4, b"old content");
        buffer.truncate(0).unwrap();
        buffer.write_at(b"new", 0).unwrap();
        assert_eq!(buffer.read_all(), b"new");
        assert_eq!(buffer.len(), 3);
    }
}

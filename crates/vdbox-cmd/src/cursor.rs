//! # Command Cursors
//!
//! Concrete [`CommandSink`]s: a cursor over caller-provided memory (a locked
//! batch buffer) and the frame-local staging buffer the orchestrator builds
//! into before committing a frame.

use alloc::vec::Vec;

use vdbox_core::{CommandSink, Error, Result};

// =============================================================================
// SLICE CURSOR
// =============================================================================

/// Write cursor over a mapped command buffer
#[derive(Debug)]
pub struct CommandCursor<'a> {
    buffer: &'a mut [u8],
    offset: usize,
}

impl<'a> CommandCursor<'a> {
    /// Cursor at the start of `buffer`
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    /// Cursor resuming at `offset`
    pub fn at(buffer: &'a mut [u8], offset: usize) -> Result<Self> {
        if offset > buffer.len() {
            return Err(Error::InvalidParameter);
        }
        Ok(Self { buffer, offset })
    }

    /// Current write offset
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Pad with MI_NOOP dwords up to `alignment` bytes
    pub fn pad_to(&mut self, alignment: usize) -> Result<()> {
        if alignment == 0 || alignment % 4 != 0 || self.offset % 4 != 0 {
            return Err(Error::InvalidParameter);
        }
        let padding = (alignment - self.offset % alignment) % alignment;
        if padding > self.remaining() {
            return Err(Error::CommandBufferFull);
        }
        self.buffer[self.offset..self.offset + padding].fill(0);
        self.offset += padding;
        Ok(())
    }
}

impl CommandSink for CommandCursor<'_> {
    fn remaining(&self) -> usize {
        self.buffer.len() - self.offset
    }

    fn used(&self) -> usize {
        self.offset
    }

    fn append(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.remaining() {
            return Err(Error::CommandBufferFull);
        }
        self.buffer[self.offset..self.offset + bytes.len()].copy_from_slice(bytes);
        self.offset += bytes.len();
        Ok(())
    }
}

// =============================================================================
// STAGING BUFFER
// =============================================================================

/// Bounded frame-local command stream
///
/// Commands of a frame are staged here and copied to the real command buffer
/// only once the whole frame serialized successfully.
#[derive(Debug, Clone, Default)]
pub struct StagingBuffer {
    bytes: Vec<u8>,
    capacity: usize,
}

impl StagingBuffer {
    /// Create a staging buffer of `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Staged bytes
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Capacity in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop everything staged
    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    /// Copy the staged stream into `sink` in a single append
    pub fn commit(&mut self, sink: &mut dyn CommandSink) -> Result<usize> {
        let len = self.bytes.len();
        if len > sink.remaining() {
            return Err(Error::CommandBufferFull);
        }
        sink.append(&self.bytes)?;
        self.bytes.clear();
        Ok(len)
    }
}

impl CommandSink for StagingBuffer {
    fn remaining(&self) -> usize {
        self.capacity - self.bytes.len()
    }

    fn used(&self) -> usize {
        self.bytes.len()
    }

    fn append(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.remaining() {
            return Err(Error::CommandBufferFull);
        }
        self.bytes.extend_from_slice(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vdbox_core::testing::VecSink;

    #[test]
    fn test_cursor_bounds() {
        let mut mem = [0xAAu8; 10];
        let mut cursor = CommandCursor::new(&mut mem);
        cursor.append(&[1, 2, 3, 4]).unwrap();
        assert_eq!(cursor.append(&[0; 8]), Err(Error::CommandBufferFull));
        assert_eq!(cursor.offset(), 4);
        cursor.append(&[5, 6]).unwrap();
        assert_eq!(cursor.remaining(), 4);
        assert_eq!(mem[..7], [1, 2, 3, 4, 5, 6, 0xAA]);
    }

    #[test]
    fn test_pad_to() {
        let mut mem = [0xFFu8; 32];
        let mut cursor = CommandCursor::at(&mut mem, 4).unwrap();
        cursor.pad_to(16).unwrap();
        assert_eq!(cursor.offset(), 16);
        cursor.pad_to(16).unwrap();
        assert_eq!(cursor.offset(), 16);
        assert_eq!(mem[4..16], [0; 12]);
    }

    #[test]
    fn test_staging_commit() {
        let mut staging = StagingBuffer::new(64);
        staging.append(&[9; 24]).unwrap();

        let mut small = VecSink::with_capacity(16);
        assert_eq!(staging.commit(&mut small), Err(Error::CommandBufferFull));
        assert_eq!(small.used(), 0);
        assert_eq!(staging.used(), 24);

        let mut sink = VecSink::with_capacity(64);
        assert_eq!(staging.commit(&mut sink), Ok(24));
        assert_eq!(sink.used(), 24);
        assert_eq!(staging.used(), 0);
    }
}

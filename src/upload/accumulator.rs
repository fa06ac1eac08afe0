//! Chunk accumulator
//!
//! Buffers incoming capture bytes until the cumulative size exceeds the
//! part-size threshold, then yields the entire accumulated buffer as one
//! part. Object stores require every part except the last to meet a minimum
//! size, so only the explicit final flush may fall below the threshold.

use crate::config::DEFAULT_PART_SIZE_THRESHOLD;
use bytes::{Bytes, BytesMut};

/// Size-bounded buffer for incoming capture chunks
#[derive(Debug)]
pub struct ChunkAccumulator {
    buffer: BytesMut,
    threshold: usize,
}

impl ChunkAccumulator {
    /// Accumulator with a custom threshold (bytes)
    pub fn new(threshold: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            threshold,
        }
    }

    /// Append bytes; returns the full buffer when the threshold is crossed
    ///
    /// Synchronous and non-suspending: callers sit on the capture
    /// collaborator's data-available path and must never block.
    pub fn push(&mut self, data: &[u8]) -> Option<Bytes> {
        self.buffer.extend_from_slice(data);
        if self.buffer.len() > self.threshold {
            Some(self.buffer.split().freeze())
        } else {
            None
        }
    }

    /// Take whatever is buffered, possibly empty
    pub fn flush(&mut self) -> Bytes {
        self.buffer.split().freeze()
    }

    /// Bytes currently buffered
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for ChunkAccumulator {
    fn default() -> Self {
        Self::new(DEFAULT_PART_SIZE_THRESHOLD)
    }
}

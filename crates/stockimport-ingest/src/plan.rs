//! Chunk plan: the byte ranges a resource is fetched in

use stockimport_common::{ImportError, Result};

/// One half-open byte range `[offset, offset + length)` of the resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// Position of the range in the plan, starting at 0
    pub index: u64,
    pub offset: u64,
    pub length: u64,
}

impl ByteRange {
    /// Exclusive end offset
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Contiguous, non-overlapping ranges of at most `block_size` bytes covering
/// `[0, total_size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    total_size: u64,
    block_size: u64,
    num_blocks: u64,
}

impl ChunkPlan {
    pub fn new(total_size: u64, block_size: u64) -> Result<Self> {
        if block_size == 0 {
            return Err(ImportError::Config(
                "block size must be greater than 0".to_string(),
            ));
        }

        let num_blocks = total_size / block_size + u64::from(total_size % block_size != 0);

        Ok(Self {
            total_size,
            block_size,
            num_blocks,
        })
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    pub fn num_blocks(&self) -> u64 {
        self.num_blocks
    }

    pub fn is_empty(&self) -> bool {
        self.num_blocks == 0
    }

    /// Whether `index` is the final chunk
    pub fn is_last(&self, index: u64) -> bool {
        index + 1 == self.num_blocks
    }

    pub fn range(&self, index: u64) -> Option<ByteRange> {
        if index >= self.num_blocks {
            return None;
        }
        let offset = index * self.block_size;
        Some(ByteRange {
            index,
            offset,
            length: self.block_size.min(self.total_size - offset),
        })
    }

    pub fn ranges(&self) -> impl Iterator<Item = ByteRange> + '_ {
        (0..self.num_blocks).filter_map(move |index| self.range(index))
    }
}

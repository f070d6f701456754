use std::ptr::NonNull;

use crate::{
    error::{ArenaError, Result},
    kernel::MemorySource,
};

/// One physically contiguous backing segment of the chain.
///
/// ```text
/// base                                        base + len
/// +--------------------------------------------+
/// | slice | pad | slice |  slice  |    free    |
/// +--------------------------------------------+
/// ```
///
/// Blocks carry no header: all metadata lives in the owning [`BlockChain`]
/// and in the cursors pointing at the block.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Block {
    /// Start of the segment returned by the memory source.
    pub base: NonNull<u8>,
    /// Size of the segment. Equal to the chain's block size except for a
    /// last block truncated by the capacity.
    pub len: usize,
}

impl Block {
    #[inline]
    pub fn addr(&self) -> usize {
        self.base.as_ptr() as usize
    }
}

/// Append-only chain of [`Block`]s.
///
/// The chain is grown lazily by cursors that run out of room in their block
/// and never shrinks. Blocks are only released all together, by
/// [`BlockChain::release`] or when the chain is dropped.
///
/// ```text
/// +---------+    +---------+    +---------+
/// | Block 0 | -> | Block 1 | -> | Block 2 | -> (next_or_allocate)
/// +---------+    +---------+    +---------+
/// ```
pub(crate) struct BlockChain<M: MemorySource> {
    source: M,
    blocks: Vec<Block>,
    block_size: usize,
    capacity: usize,
    /// Bytes still allowed to be reserved after the last block.
    remaining: usize,
    released: bool,
}

impl<M: MemorySource> BlockChain<M> {
    /// Create a new chain and reserve its first block of
    /// `min(block_size, capacity)` bytes.
    pub fn new(block_size: usize, capacity: usize, source: M) -> Result<Self> {
        if block_size == 0 {
            return Err(ArenaError::InvalidConfiguration { block_size });
        }

        let mut chain = Self {
            source,
            blocks: Vec::new(),
            block_size,
            capacity,
            remaining: capacity,
            released: false,
        };
        chain.grow()?;
        Ok(chain)
    }

    /// Block at `index`. Indices handed out by the chain are always in range.
    #[inline]
    pub fn block(&self, index: usize) -> Block {
        self.blocks[index]
    }

    /// Index of the block following `current`, reserving it if it does not
    /// exist yet.
    pub fn next_or_allocate(&mut self, current: usize) -> Result<usize> {
        let next = current + 1;
        if next < self.blocks.len() {
            return Ok(next);
        }
        if self.remaining == 0 {
            return Err(ArenaError::CapacityExceeded {
                requested: self.block_size,
                capacity: self.capacity,
            });
        }
        self.grow()
    }

    fn grow(&mut self) -> Result<usize> {
        let len = self.block_size.min(self.remaining);
        let base = self
            .source
            .reserve(len)
            .ok_or(ArenaError::CapacityExceeded {
                requested: len,
                capacity: self.capacity,
            })?;

        self.remaining -= len;
        self.blocks.push(Block { base, len });

        tracing::debug!(
            block = self.blocks.len() - 1,
            len,
            remaining = self.remaining,
            "reserved arena block"
        );
        Ok(self.blocks.len() - 1)
    }

    /// Return every block to the memory source. Later calls are no-ops.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let count = self.blocks.len();
        let bytes = self.reserved_bytes();
        for block in self.blocks.drain(..) {
            // SAFETY: every block was reserved from `source` exactly once and
            // `released` guards against a second pass.
            unsafe { self.source.release(block.base, block.len) };
        }
        tracing::debug!(blocks = count, bytes, "released arena blocks");
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Bytes reserved across all blocks.
    pub fn reserved_bytes(&self) -> usize {
        self.blocks.iter().map(|b| b.len).sum()
    }
}

impl<M: MemorySource> Drop for BlockChain<M> {
    fn drop(&mut self) {
        self.release();
    }
}

//! Bump cursor over a [`BlockChain`].
//!
//! A [`Cursor`] is a plain value: where in which block the last slice was
//! carved. Any number of cursors may point into the same chain; the stack
//! arena makes sure only one of them advances at a time.

use std::ptr::NonNull;

use crate::{
    block::BlockChain,
    error::{ArenaError, Result},
    kernel::MemorySource,
    utils::{align_up, is_valid_alignment},
};

/// Position of the most recent slice.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Cursor {
    /// Index of the current block in the chain.
    pub block: usize,
    /// Offset of the last slice within the block.
    pub offset: usize,
    /// Size of the last slice. Only used to find where the next one starts.
    pub size: usize,
}

/// Public snapshot of where an arena will carve its next slice from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Position {
    /// Index of the current block, counting from the first block of the root.
    pub block: usize,
    /// First byte after the last slice carved from that block.
    pub offset: usize,
}

impl Cursor {
    /// Cursor at the very start of the first block.
    pub fn start() -> Self {
        Self::default()
    }

    /// Independent copy pointing at the same block.
    #[inline]
    pub fn dup(&self) -> Self {
        *self
    }

    pub fn position(&self) -> Position {
        Position {
            block: self.block,
            offset: self.offset + self.size,
        }
    }

    /// Carve `size` bytes aligned to `alignment` out of the chain, moving on
    /// to the next block (and reserving it) when the current one is full.
    ///
    /// Arguments must have passed [`check_size_and_align`]. On failure the
    /// cursor is left untouched. The chain may still have grown by one block.
    pub fn next_slice<M: MemorySource>(
        &mut self,
        chain: &mut BlockChain<M>,
        size: usize,
        alignment: usize,
    ) -> Result<NonNull<u8>> {
        debug_assert!(check_size_and_align(size, alignment).is_ok());
        debug_assert!(!chain.is_released());

        let mut next = *self;
        loop {
            if let Some(addr) = next.try_slice(chain, size, alignment) {
                *self = next;
                return Ok(addr);
            }

            // Worst case padding included, a fresh block must be able to hold it.
            let max_possible = size.saturating_add(alignment - 1);
            if max_possible > chain.block_size() {
                return Err(ArenaError::AllocationTooLarge {
                    size,
                    alignment,
                    block_size: chain.block_size(),
                });
            }

            next = Cursor {
                block: chain.next_or_allocate(next.block)?,
                offset: 0,
                size: 0,
            };
        }
    }

    fn try_slice<M: MemorySource>(
        &mut self,
        chain: &BlockChain<M>,
        size: usize,
        alignment: usize,
    ) -> Option<NonNull<u8>> {
        let block = chain.block(self.block);
        let min = block.addr();
        let start = align_up(min + self.offset + self.size, alignment)? - min;
        if start > block.len || block.len - start < size {
            return None;
        }
        self.offset = start;
        self.size = size;
        // SAFETY: `start <= block.len`, so the result stays within (or one
        // past the end of) the block's segment.
        Some(unsafe { block.base.add(start) })
    }
}

/// Size must fit an object, alignment must be a power of two.
pub(crate) fn check_size_and_align(size: usize, alignment: usize) -> Result<()> {
    if size > isize::MAX as usize {
        return Err(ArenaError::InvalidSize { size });
    }
    if !is_valid_alignment(alignment) {
        return Err(ArenaError::InvalidAlignment { alignment });
    }
    Ok(())
}

//! Stack arena configuration parameters.

use crate::error::{ArenaError, Result};

/// What happens to the parent's cursor when a nested arena closes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClosePolicy {
    /// The parent continues from where the child left off. Memory used by
    /// the child is spent until the root closes.
    #[default]
    Retain,
    /// The parent continues from its own position before the `push`, so the
    /// memory handed out by the child is recycled by the next allocation.
    Rewind,
}

/// Configuration for a [`StackArena`](crate::StackArena).
///
/// Validated at construction; immutable afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackConfig {
    /// Nominal size of each backing block in bytes. No single allocation
    /// (plus worst-case alignment padding) may exceed it.
    ///
    /// Default: 4096. Must be positive.
    pub block_size: usize,

    /// Upper bound on the bytes reserved across all blocks.
    ///
    /// Default: `usize::MAX` (unbounded). The last block is truncated so the
    /// sum never exceeds this value.
    pub capacity: usize,

    /// Cursor handling when a nested arena closes.
    pub close_policy: ClosePolicy,
}

impl StackConfig {
    /// Default block size: 4KB.
    pub const DEFAULT_BLOCK_SIZE: usize = 4 * 1024;

    /// Default capacity: unbounded.
    pub const DEFAULT_CAPACITY: usize = usize::MAX;

    /// Unbounded configuration with the given block size.
    pub fn unbounded(block_size: usize) -> Self {
        Self {
            block_size,
            capacity: Self::DEFAULT_CAPACITY,
            close_policy: ClosePolicy::default(),
        }
    }

    /// Bounded configuration whose capacity is also its block size, so the
    /// arena consists of exactly one block.
    pub fn bounded(capacity: usize) -> Self {
        Self::unbounded(capacity).with_capacity(capacity)
    }

    /// Set the block size.
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Set the total capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the close policy.
    pub fn with_close_policy(mut self, close_policy: ClosePolicy) -> Self {
        self.close_policy = close_policy;
        self
    }

    /// Check the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(ArenaError::InvalidConfiguration {
                block_size: self.block_size,
            });
        }
        Ok(())
    }
}

impl Default for StackConfig {
    fn default() -> Self {
        Self::unbounded(Self::DEFAULT_BLOCK_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_unbounded_4k() {
        let config = StackConfig::default();
        assert_eq!(config.block_size, 4096);
        assert_eq!(config.capacity, usize::MAX);
        assert_eq!(config.close_policy, ClosePolicy::Retain);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn bounded_uses_capacity_as_block_size() {
        let config = StackConfig::bounded(1000);
        assert_eq!(config.block_size, 1000);
        assert_eq!(config.capacity, 1000);
    }

    #[test]
    fn zero_block_size_is_rejected() {
        let config = StackConfig::unbounded(0);
        assert_eq!(
            config.validate(),
            Err(ArenaError::InvalidConfiguration { block_size: 0 })
        );
    }

    #[test]
    fn zero_capacity_is_allowed() {
        let config = StackConfig::bounded(0).with_block_size(64);
        assert!(config.validate().is_ok());
    }
}

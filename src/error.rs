//! Error types for stack arena operations.

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, ArenaError>;

/// Errors that can occur while configuring, nesting or allocating from a
/// [`StackArena`](crate::StackArena).
///
/// Every error is reported synchronously by the call that caused it and
/// leaves the arena's visible state untouched.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum ArenaError {
    /// The block size of an arena must be at least one byte.
    #[error("invalid arena configuration: block size {block_size} must be positive")]
    InvalidConfiguration {
        /// The rejected block size.
        block_size: usize,
    },

    /// Alignment is zero or not a power of two.
    #[error("invalid alignment constraint: {alignment}")]
    InvalidAlignment {
        /// The rejected alignment.
        alignment: usize,
    },

    /// Allocation size cannot be represented as an object size.
    #[error("invalid allocation size: {size}")]
    InvalidSize {
        /// The rejected size.
        size: usize,
    },

    /// The request can never fit in a single block, even in a fresh one.
    #[error(
        "allocation of {size} bytes aligned to {alignment} exceeds block size {block_size}"
    )]
    AllocationTooLarge {
        /// Number of bytes requested.
        size: usize,
        /// Alignment requested.
        alignment: usize,
        /// Nominal block size of the arena.
        block_size: usize,
    },

    /// No further block can be obtained, either because the arena capacity is
    /// used up or because the memory source refused the reservation.
    #[error("arena capacity exceeded: requested {requested} bytes, capacity {capacity} bytes")]
    CapacityExceeded {
        /// Number of bytes the arena tried to reserve.
        requested: usize,
        /// Total capacity of the arena.
        capacity: usize,
    },

    /// The arena has an open nested arena and cannot be used until it closes.
    #[error("stack arena has an open nested arena")]
    IllegalNesting,

    /// The arena, or the session a segment belongs to, has been closed.
    #[error("already closed")]
    AlreadyClosed,

    /// Access outside the bounds of a segment.
    #[error("access of {len} bytes at offset {offset} is out of bounds for segment of {size} bytes")]
    OutOfBounds {
        /// Offset of the access within the segment.
        offset: usize,
        /// Length of the access.
        len: usize,
        /// Size of the segment.
        size: usize,
    },
}

impl ArenaError {
    /// Whether this is a resource exhaustion failure.
    ///
    /// Callers may fall back to a different allocation strategy on these.
    /// All other errors are usage errors and must not be retried.
    pub fn is_exhaustion(&self) -> bool {
        matches!(
            self,
            Self::AllocationTooLarge { .. } | Self::CapacityExceeded { .. }
        )
    }
}

impl From<ArenaError> for std::io::Error {
    fn from(e: ArenaError) -> std::io::Error {
        let kind = if e.is_exhaustion() {
            std::io::ErrorKind::OutOfMemory
        } else {
            std::io::ErrorKind::InvalidInput
        };
        std::io::Error::new(kind, e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhaustion_classification() {
        assert!(
            ArenaError::CapacityExceeded {
                requested: 1,
                capacity: 0
            }
            .is_exhaustion()
        );
        assert!(
            ArenaError::AllocationTooLarge {
                size: 10,
                alignment: 1,
                block_size: 4
            }
            .is_exhaustion()
        );
        assert!(!ArenaError::IllegalNesting.is_exhaustion());
        assert!(!ArenaError::AlreadyClosed.is_exhaustion());
        assert!(!ArenaError::InvalidAlignment { alignment: 3 }.is_exhaustion());
    }

    #[test]
    fn display_mentions_values() {
        let e = ArenaError::AllocationTooLarge {
            size: 300,
            alignment: 8,
            block_size: 256,
        };
        assert_eq!(
            e.to_string(),
            "allocation of 300 bytes aligned to 8 exceeds block size 256"
        );
    }

    #[test]
    fn io_error_kind() {
        let io: std::io::Error = ArenaError::CapacityExceeded {
            requested: 64,
            capacity: 32,
        }
        .into();
        assert_eq!(io.kind(), std::io::ErrorKind::OutOfMemory);

        let io: std::io::Error = ArenaError::IllegalNesting.into();
        assert_eq!(io.kind(), std::io::ErrorKind::InvalidInput);
    }
}

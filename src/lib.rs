//! A thread-confined, stack-discipline bump arena.
//!
//! [`StackArena`] hands out variable-size, variable-alignment byte ranges
//! from a chain of fixed-size blocks obtained from a [`MemorySource`]
//! (the operating system by default, see [`Kernel`]). Arenas nest:
//! [`StackArena::push`] returns a child arena that allocates from the same
//! blocks, and closing it releases everything it allocated in O(1) without
//! giving memory back to the system. Only the outermost arena returns the
//! blocks, when it closes.
//!
//! ```text
//! StackArena (root, owns the chain)
//! ├── BlockChain: Block 0 -> Block 1 -> ... (lazily reserved, <= capacity)
//! ├── Cursor (block, offset, size of last slice)
//! ├── Session (invalidated on close, checked by every Segment)
//! └── push() -> StackArena (nested, copy of the parent's cursor)
//! ```
//!
//! Only the innermost open arena may be used: the others are
//! [`ArenaState::Suspended`] and reject every operation with
//! [`ArenaError::IllegalNesting`]. Arenas, sessions and segments are
//! `!Send`, so the whole tree stays on the thread that created it.

mod block;
pub mod config;
mod cursor;
pub mod error;
pub mod kernel;
pub mod segment;
pub mod session;
pub mod stack;
mod utils;

pub use config::{ClosePolicy, StackConfig};
pub use cursor::Position;
pub use error::{ArenaError, Result};
pub use kernel::{Kernel, MemorySource, MemoryStats, TrackingSource};
pub use segment::Segment;
pub use session::Session;
pub use stack::{ArenaState, StackArena};

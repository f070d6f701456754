//! The stack arena: nesting protocol on top of a shared block chain.
//!
//! ```text
//!   root (Suspended) ──parent── child (Suspended) ──parent── grandchild (Top)
//!        │                          │                            │
//!        └──────────── Rc<RefCell<BlockChain>> ──────────────────┘
//! ```
//!
//! Every arena in a tree shares the root's [`BlockChain`], but only the one
//! arena in [`ArenaState::Top`] may advance its cursor or grow the chain.
//! `push` suspends the caller and hands out a child starting from a copy of
//! the caller's cursor; closing the child resumes the parent.

use std::{
    alloc::Layout,
    cell::{Cell, RefCell},
    fmt,
    ptr::NonNull,
    rc::Rc,
};

use allocator_api2::alloc::{AllocError, Allocator};

use crate::{
    block::BlockChain,
    config::{ClosePolicy, StackConfig},
    cursor::{Cursor, Position, check_size_and_align},
    error::{ArenaError, Result},
    kernel::{Kernel, MemorySource},
    segment::Segment,
    session::Session,
};

/// Nesting state of a single arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArenaState {
    /// No open nested arena; every operation is allowed.
    Top,
    /// A nested arena is open; every operation fails with
    /// [`ArenaError::IllegalNesting`] until it closes.
    Suspended,
    /// Closed for good.
    Closed,
}

/// One level of the stack. Shared between the arena handle and the frames
/// of its children, which need to resume it when they close.
struct Frame<M: MemorySource> {
    chain: Rc<RefCell<BlockChain<M>>>,
    /// `None` for the root, which owns the chain's memory.
    parent: Option<Rc<Frame<M>>>,
    state: Cell<ArenaState>,
    cursor: Cell<Cursor>,
    session: Session,
    depth: usize,
    close_policy: ClosePolicy,
}

impl<M: MemorySource> Frame<M> {
    fn check_top(&self) -> Result<()> {
        match self.state.get() {
            ArenaState::Top => Ok(()),
            ArenaState::Suspended => Err(ArenaError::IllegalNesting),
            ArenaState::Closed => Err(ArenaError::AlreadyClosed),
        }
    }

    fn close(&self) -> Result<()> {
        self.check_top()?;
        self.session.close()?;
        self.state.set(ArenaState::Closed);

        match &self.parent {
            Some(parent) => {
                if self.close_policy == ClosePolicy::Retain {
                    parent.cursor.set(self.cursor.get());
                }
                parent.state.set(ArenaState::Top);
            }
            None => self.chain.borrow_mut().release(),
        }

        tracing::trace!(depth = self.depth, session = self.session.id(), "closed stack arena");
        Ok(())
    }
}

impl<M: MemorySource> Drop for Frame<M> {
    fn drop(&mut self) {
        // A parent whose handle went away while suspended is resumed by its
        // child and only closed here, once nothing refers to it anymore.
        if self.state.get() == ArenaState::Top {
            let _ = self.close();
        }
    }
}

/// A thread-confined arena that can be reused by multiple clients to speed
/// up allocation.
///
/// A stack arena is characterized by a block size `B` and a capacity `C`.
/// It serves allocations by bumping a cursor through a chain of blocks of
/// size `B`, reserving a new block whenever the current one cannot hold a
/// request, as long as the total stays within `C`. Requests larger than `B`
/// are rejected outright.
///
/// Clients reuse an arena by calling [`StackArena::push`], which returns a
/// nested arena backed by the same blocks. The outer arena cannot be used
/// until the nested one is closed. Closing the outermost arena releases
/// every block.
///
/// ```
/// use stackarena::StackArena;
///
/// let mut stack = StackArena::new()?;
/// for i in 0..1000u32 {
///     let mut local = stack.push()?;
///     let segment = local.allocate(100, 8)?;
///     segment.write(0, &i.to_le_bytes())?;
///     local.close()?;
/// }
/// stack.close()?;
/// # Ok::<(), stackarena::ArenaError>(())
/// ```
///
/// Dropping an arena closes it. Dropping an arena that still has an open
/// nested arena defers the close until that nested arena closes.
pub struct StackArena<M: MemorySource = Kernel> {
    frame: Rc<Frame<M>>,
}

impl StackArena<Kernel> {
    /// Unbounded arena with the default block size of 4KB.
    pub fn new() -> Result<Self> {
        Self::with_config(StackConfig::default())
    }

    /// Unbounded arena with the given block size.
    pub fn unbounded(block_size: usize) -> Result<Self> {
        Self::with_config(StackConfig::unbounded(block_size))
    }

    /// Arena made of a single block of `capacity` bytes.
    pub fn bounded(capacity: usize) -> Result<Self> {
        Self::with_config(StackConfig::bounded(capacity))
    }

    /// Arena with the given capacity and block size.
    pub fn bounded_with_block_size(capacity: usize, block_size: usize) -> Result<Self> {
        Self::with_config(StackConfig::unbounded(block_size).with_capacity(capacity))
    }

    /// Arena backed by the operating system.
    pub fn with_config(config: StackConfig) -> Result<Self> {
        Self::with_config_in(config, Kernel)
    }
}

impl<M: MemorySource> StackArena<M> {
    /// Arena whose blocks come from `source`. The first block is reserved
    /// immediately.
    pub fn with_config_in(config: StackConfig, source: M) -> Result<Self> {
        config.validate()?;
        let chain = BlockChain::new(config.block_size, config.capacity, source)?;

        let frame = Frame {
            chain: Rc::new(RefCell::new(chain)),
            parent: None,
            state: Cell::new(ArenaState::Top),
            cursor: Cell::new(Cursor::start()),
            session: Session::open(),
            depth: 0,
            close_policy: config.close_policy,
        };
        tracing::trace!(
            block_size = config.block_size,
            capacity = config.capacity,
            session = frame.session.id(),
            "opened stack arena"
        );
        Ok(Self {
            frame: Rc::new(frame),
        })
    }

    /// Open a new arena nested in this one.
    ///
    /// Until the returned arena is closed, this arena can't allocate, be
    /// closed, or push another nested arena.
    pub fn push(&self) -> Result<StackArena<M>> {
        let frame = &self.frame;
        frame.check_top()?;

        let child = Frame {
            chain: Rc::clone(&frame.chain),
            parent: Some(Rc::clone(frame)),
            state: Cell::new(ArenaState::Top),
            cursor: Cell::new(frame.cursor.get().dup()),
            session: Session::open(),
            depth: frame.depth + 1,
            close_policy: frame.close_policy,
        };
        frame.state.set(ArenaState::Suspended);

        tracing::trace!(depth = child.depth, session = child.session.id(), "pushed stack arena");
        Ok(StackArena {
            frame: Rc::new(child),
        })
    }

    /// Allocate `size` bytes aligned to `alignment`.
    ///
    /// The returned segment becomes inaccessible when this arena closes.
    /// Its bytes start out zeroed.
    pub fn allocate(&self, size: usize, alignment: usize) -> Result<Segment> {
        let addr = self.allocate_raw(size, alignment)?;
        // Recycled ranges may hold padding left uninitialized by typed
        // writes through `Allocator`; segments read them back as bytes.
        // SAFETY: `size` bytes at `addr` were just carved from a live block.
        unsafe { addr.as_ptr().write_bytes(0, size) };
        Ok(Segment::new(addr, size, self.frame.session.clone()))
    }

    /// Allocate memory fitting `layout`.
    pub fn allocate_layout(&self, layout: Layout) -> Result<Segment> {
        self.allocate(layout.size(), layout.align())
    }

    fn allocate_raw(&self, size: usize, alignment: usize) -> Result<NonNull<u8>> {
        check_size_and_align(size, alignment)?;
        let frame = &self.frame;
        frame.check_top()?;

        let mut cursor = frame.cursor.get();
        let addr = cursor.next_slice(&mut frame.chain.borrow_mut(), size, alignment)?;
        frame.cursor.set(cursor);
        Ok(addr)
    }

    /// Close this arena. Every segment it allocated becomes inaccessible.
    ///
    /// Closing a nested arena resumes its parent. Closing the outermost arena
    /// also returns all blocks to the memory source.
    ///
    /// Fails with [`ArenaError::IllegalNesting`] while a nested arena is
    /// open, leaving this arena untouched, and with
    /// [`ArenaError::AlreadyClosed`] when called twice.
    pub fn close(&mut self) -> Result<()> {
        self.frame.close()
    }

    /// Current nesting state.
    pub fn state(&self) -> ArenaState {
        self.frame.state.get()
    }

    /// Nesting depth; 0 for the outermost arena.
    pub fn depth(&self) -> usize {
        self.frame.depth
    }

    /// Whether this is the outermost arena, owner of the blocks.
    pub fn is_root(&self) -> bool {
        self.frame.parent.is_none()
    }

    /// This arena's session.
    pub fn session(&self) -> &Session {
        &self.frame.session
    }

    /// Where the next allocation will be carved from (before alignment).
    pub fn position(&self) -> Position {
        self.frame.cursor.get().position()
    }

    /// Number of blocks reserved by the whole arena tree.
    pub fn block_count(&self) -> usize {
        self.frame.chain.borrow().block_count()
    }

    /// Bytes reserved by the whole arena tree. Zero once the root is closed.
    pub fn reserved_bytes(&self) -> usize {
        self.frame.chain.borrow().reserved_bytes()
    }

    /// Nominal block size.
    pub fn block_size(&self) -> usize {
        self.frame.chain.borrow().block_size()
    }

    /// Total capacity.
    pub fn capacity(&self) -> usize {
        self.frame.chain.borrow().capacity()
    }

    /// Configuration this arena tree was created with.
    pub fn config(&self) -> StackConfig {
        StackConfig {
            block_size: self.block_size(),
            capacity: self.capacity(),
            close_policy: self.frame.close_policy,
        }
    }
}

impl<M: MemorySource> Drop for StackArena<M> {
    fn drop(&mut self) {
        match self.frame.state.get() {
            ArenaState::Top => {
                let _ = self.frame.close();
            }
            ArenaState::Suspended => {
                tracing::warn!(
                    depth = self.frame.depth,
                    session = self.frame.session.id(),
                    "stack arena dropped while a nested arena is still open"
                );
            }
            ArenaState::Closed => {}
        }
    }
}

impl<M: MemorySource> fmt::Debug for StackArena<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackArena")
            .field("state", &self.state())
            .field("depth", &self.depth())
            .field("session", &self.frame.session.id())
            .field("position", &self.position())
            .field("blocks", &self.block_count())
            .finish()
    }
}

// SAFETY: blocks stay reserved until the root closes, which requires every
// nested arena to be closed first, and closing takes `&mut self`, so no
// collection borrowing an arena can outlive the memory it got from it.
unsafe impl<M: MemorySource> Allocator for StackArena<M> {
    fn allocate(&self, layout: Layout) -> std::result::Result<NonNull<[u8]>, AllocError> {
        let addr = self
            .allocate_raw(layout.size(), layout.align())
            .map_err(|_| AllocError)?;
        Ok(NonNull::slice_from_raw_parts(addr, layout.size()))
    }

    // Individual allocations are never freed, only whole arenas.
    unsafe fn deallocate(&self, _ptr: NonNull<u8>, _layout: Layout) {}
}

//! Arena sessions.
//!
//! Every arena owns one [`Session`]. Segments minted by the arena keep a
//! clone of it and refuse any access once it is closed. Only the arena can
//! close its session; the handles given out are observation-only.

use std::{
    cell::Cell,
    fmt,
    rc::Rc,
    sync::atomic::{AtomicU64, Ordering},
};

use crate::error::{ArenaError, Result};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct SessionState {
    id: u64,
    alive: Cell<bool>,
}

/// Lifetime token shared by an arena and the segments it allocated.
///
/// `Session` is neither `Send` nor `Sync`: like the arena it belongs to, it
/// is confined to the thread that created it.
#[derive(Clone)]
pub struct Session {
    state: Rc<SessionState>,
}

impl Session {
    pub(crate) fn open() -> Self {
        Self {
            state: Rc::new(SessionState {
                id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
                alive: Cell::new(true),
            }),
        }
    }

    /// Process-unique identifier of this session.
    pub fn id(&self) -> u64 {
        self.state.id
    }

    /// Whether memory tied to this session may still be accessed.
    pub fn is_alive(&self) -> bool {
        self.state.alive.get()
    }

    /// Whether both handles refer to the same session.
    pub fn same_as(&self, other: &Session) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    pub(crate) fn ensure_alive(&self) -> Result<()> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(ArenaError::AlreadyClosed)
        }
    }

    /// Close the session. Single use: a second call fails.
    pub(crate) fn close(&self) -> Result<()> {
        self.ensure_alive()?;
        self.state.alive.set(false);
        Ok(())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id())
            .field("alive", &self.is_alive())
            .finish()
    }
}

//! Memory views handed out by the arena.

use std::{fmt, ptr::NonNull};

use crate::{
    error::{ArenaError, Result},
    session::Session,
};

/// A byte range carved out of an arena block.
///
/// A segment does not borrow the arena: it carries the arena's [`Session`]
/// and checks it on every access, so reading or writing a segment after its
/// arena has been closed fails with [`ArenaError::AlreadyClosed`] instead of
/// touching released memory.
#[derive(Clone)]
pub struct Segment {
    addr: NonNull<u8>,
    len: usize,
    session: Session,
}

impl Segment {
    pub(crate) fn new(addr: NonNull<u8>, len: usize, session: Session) -> Self {
        Self { addr, len, session }
    }

    /// Start address of the segment.
    pub fn address(&self) -> usize {
        self.addr.as_ptr() as usize
    }

    /// Length of the segment in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether this is a zero-length segment.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Raw pointer to the first byte.
    ///
    /// Dereferencing it is only sound while [`Segment::is_alive`] holds.
    pub fn as_ptr(&self) -> *mut u8 {
        self.addr.as_ptr()
    }

    /// Session of the arena that allocated this segment.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Whether the owning arena is still open.
    pub fn is_alive(&self) -> bool {
        self.session.is_alive()
    }

    /// Set every byte of the segment to `value`.
    pub fn fill(&self, value: u8) -> Result<()> {
        self.session.ensure_alive()?;
        // SAFETY: the session is alive, so the block backing this range has
        // not been released, and the range lies within that block.
        unsafe { self.addr.as_ptr().write_bytes(value, self.len) };
        Ok(())
    }

    /// Copy `data` into the segment starting at `offset`.
    pub fn write(&self, offset: usize, data: &[u8]) -> Result<()> {
        self.check_access(offset, data.len())?;
        // SAFETY: bounds checked above, memory live while the session is.
        unsafe {
            self.addr
                .as_ptr()
                .add(offset)
                .copy_from_nonoverlapping(data.as_ptr(), data.len());
        }
        Ok(())
    }

    /// Copy bytes starting at `offset` into `buf`.
    pub fn read(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        self.check_access(offset, buf.len())?;
        // SAFETY: bounds checked above, memory live while the session is.
        unsafe {
            self.addr
                .as_ptr()
                .add(offset)
                .copy_to_nonoverlapping(buf.as_mut_ptr(), buf.len());
        }
        Ok(())
    }

    /// Copy the whole segment into a new vector.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        let mut out = vec![0; self.len];
        self.read(0, &mut out)?;
        Ok(out)
    }

    fn check_access(&self, offset: usize, len: usize) -> Result<()> {
        self.session.ensure_alive()?;
        match offset.checked_add(len) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(ArenaError::OutOfBounds {
                offset,
                len,
                size: self.len,
            }),
        }
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("address", &format_args!("{:#x}", self.address()))
            .field("len", &self.len)
            .field("session", &self.session.id())
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backed(buf: &mut [u8]) -> (Segment, Session) {
        let session = Session::open();
        let addr = NonNull::new(buf.as_mut_ptr()).unwrap();
        (Segment::new(addr, buf.len(), session.clone()), session)
    }

    #[test]
    fn write_then_read() {
        let mut buf = [0u8; 16];
        let (segment, _session) = backed(&mut buf);
        segment.write(4, &[1, 2, 3]).unwrap();

        let mut out = [0u8; 3];
        segment.read(4, &mut out).unwrap();
        assert_eq!(out, [1, 2, 3]);
    }

    #[test]
    fn fill_sets_every_byte() {
        let mut buf = [0u8; 8];
        let (segment, _session) = backed(&mut buf);
        segment.fill(0xAB).unwrap();
        assert_eq!(segment.to_vec().unwrap(), vec![0xAB; 8]);
    }

    #[test]
    fn out_of_bounds_is_rejected() {
        let mut buf = [0u8; 8];
        let (segment, _session) = backed(&mut buf);
        assert_eq!(
            segment.write(6, &[0; 3]),
            Err(ArenaError::OutOfBounds {
                offset: 6,
                len: 3,
                size: 8
            })
        );
        let mut out = [0u8; 1];
        assert!(segment.read(usize::MAX, &mut out).is_err());
    }

    #[test]
    fn closed_session_blocks_access() {
        let mut buf = [0u8; 8];
        let (segment, session) = backed(&mut buf);
        session.close().unwrap();

        assert!(!segment.is_alive());
        assert_eq!(segment.fill(1), Err(ArenaError::AlreadyClosed));
        assert_eq!(segment.to_vec(), Err(ArenaError::AlreadyClosed));
    }

    #[test]
    fn empty_segment() {
        let mut buf = [0u8; 1];
        let session = Session::open();
        let segment = Segment::new(NonNull::new(buf.as_mut_ptr()).unwrap(), 0, session);
        assert!(segment.is_empty());
        assert_eq!(segment.to_vec().unwrap(), Vec::<u8>::new());
        assert!(segment.write(0, &[]).is_ok());
    }
}

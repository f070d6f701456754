use std::{cell::Cell, ptr::NonNull, rc::Rc};

/// Source of the raw memory backing an arena's blocks.
///
/// The block chain is the only caller: it reserves one range per block and
/// returns every range exactly once, when the root arena closes.
///
/// # Safety
///
/// Implementors must return ranges that are valid for reads and writes of
/// `len` bytes, do not overlap any other live reservation, and stay valid
/// until passed back to [`MemorySource::release`].
pub unsafe trait MemorySource {
    /// Reserve a range of `len` bytes. Returns `None` if the underlying
    /// memory cannot be obtained.
    fn reserve(&self, len: usize) -> Option<NonNull<u8>>;

    /// Return a range previously obtained from [`MemorySource::reserve`].
    ///
    /// # Safety
    ///
    /// `addr` and `len` must come from a single earlier call to `reserve` on
    /// this source and must not have been released already.
    unsafe fn release(&self, addr: NonNull<u8>, len: usize);
}

/// The default memory source. It asks the operating system directly for
/// anonymous, private, read-write pages.
///
/// Zero-length reservations never reach the kernel: they are answered with
/// a dangling pointer and their release is a no-op.
#[derive(Clone, Copy, Debug, Default)]
pub struct Kernel;

/// This trait provides an abstraction to handle low level memory operations
/// and syscalls. The arena, our top level view of this, has nothing to do
/// with the concrete implementations / APIs offered by each kernel.
trait PlatformMemory {
    /// Request a memory region of size `len`. It returns a pointer to the
    /// given location or None if the underlying syscall fails.
    unsafe fn request_memory(len: usize) -> Option<NonNull<u8>>;

    /// Returns the memory of size `len` starting from `addr` back to the kernel.
    unsafe fn return_memory(addr: *mut u8, len: usize);
}

unsafe impl MemorySource for Kernel {
    fn reserve(&self, len: usize) -> Option<NonNull<u8>> {
        if len == 0 {
            return Some(NonNull::dangling());
        }
        unsafe { Kernel::request_memory(len) }
    }

    unsafe fn release(&self, addr: NonNull<u8>, len: usize) {
        if len == 0 {
            return;
        }
        unsafe { Kernel::return_memory(addr.as_ptr(), len) }
    }
}

#[cfg(unix)]
mod unix {
    use super::{Kernel, PlatformMemory};

    use libc::{mmap, munmap, off_t, size_t};

    use std::{
        os::raw::{c_int, c_void},
        ptr::NonNull,
    };

    impl PlatformMemory for Kernel {
        unsafe fn request_memory(len: usize) -> Option<NonNull<u8>> {
            // mmap parameters.
            const ADDR: *mut c_void = std::ptr::null_mut::<c_void>();
            // Read-Write only memory.
            const PROT: c_int = libc::PROT_READ | libc::PROT_WRITE;
            const FLAGS: c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
            const FD: c_int = -1;
            const OFFSET: off_t = 0;

            unsafe {
                let addr = mmap(ADDR, len as size_t, PROT, FLAGS, FD, OFFSET);

                match addr {
                    libc::MAP_FAILED => None,
                    addr => NonNull::new(addr.cast::<u8>()),
                }
            }
        }

        unsafe fn return_memory(addr: *mut u8, len: usize) {
            unsafe {
                munmap(addr as *mut c_void, len as size_t);
            }
        }
    }
}

#[cfg(windows)]
mod windows {
    use std::{os::raw::c_void, ptr::NonNull};

    use super::{Kernel, PlatformMemory};

    use windows::Win32::System::Memory;

    impl PlatformMemory for Kernel {
        unsafe fn request_memory(len: usize) -> Option<NonNull<u8>> {
            // Read-Write only.
            let protection = Memory::PAGE_READWRITE;

            let flags = Memory::MEM_RESERVE | Memory::MEM_COMMIT;

            unsafe {
                let addr = Memory::VirtualAlloc(None, len, flags, protection);

                NonNull::new(addr.cast())
            }
        }

        unsafe fn return_memory(addr: *mut u8, _len: usize) {
            unsafe {
                let _ = Memory::VirtualFree(addr as *mut c_void, 0, Memory::MEM_RELEASE);
            }
        }
    }
}

/// Counters shared between a [`TrackingSource`] and whoever inspects it.
#[derive(Debug, Default)]
struct Counters {
    reserved: Cell<usize>,
    released: Cell<usize>,
    reservations: Cell<usize>,
    live: Cell<usize>,
}

/// Read-only handle on the accounting of a [`TrackingSource`].
///
/// The handle stays valid after the source has been moved into an arena,
/// and after the arena is gone.
#[derive(Clone, Debug, Default)]
pub struct MemoryStats {
    counters: Rc<Counters>,
}

impl MemoryStats {
    /// Total bytes ever reserved.
    pub fn reserved_bytes(&self) -> usize {
        self.counters.reserved.get()
    }

    /// Total bytes released so far.
    pub fn released_bytes(&self) -> usize {
        self.counters.released.get()
    }

    /// Bytes currently reserved and not yet released.
    pub fn live_bytes(&self) -> usize {
        self.reserved_bytes() - self.released_bytes()
    }

    /// Number of successful reservations.
    pub fn reservations(&self) -> usize {
        self.counters.reservations.get()
    }

    /// Number of reservations not yet released.
    pub fn live_reservations(&self) -> usize {
        self.counters.live.get()
    }
}

/// A [`MemorySource`] wrapper that records every reservation and release.
///
/// ```
/// use stackarena::{Kernel, StackArena, StackConfig, TrackingSource};
///
/// let source = TrackingSource::new(Kernel);
/// let stats = source.stats();
/// let mut arena = StackArena::with_config_in(StackConfig::bounded(512), source)?;
/// assert_eq!(stats.reserved_bytes(), 512);
/// arena.close()?;
/// assert_eq!(stats.live_bytes(), 0);
/// # Ok::<(), stackarena::ArenaError>(())
/// ```
#[derive(Debug, Default)]
pub struct TrackingSource<M> {
    inner: M,
    stats: MemoryStats,
}

impl<M: MemorySource> TrackingSource<M> {
    /// Wrap `inner`.
    pub fn new(inner: M) -> Self {
        Self {
            inner,
            stats: MemoryStats::default(),
        }
    }

    /// Handle on this source's counters.
    pub fn stats(&self) -> MemoryStats {
        self.stats.clone()
    }
}

unsafe impl<M: MemorySource> MemorySource for TrackingSource<M> {
    fn reserve(&self, len: usize) -> Option<NonNull<u8>> {
        let addr = self.inner.reserve(len)?;
        let c = &self.stats.counters;
        c.reserved.set(c.reserved.get() + len);
        c.reservations.set(c.reservations.get() + 1);
        c.live.set(c.live.get() + 1);
        Some(addr)
    }

    unsafe fn release(&self, addr: NonNull<u8>, len: usize) {
        unsafe { self.inner.release(addr, len) };
        let c = &self.stats.counters;
        c.released.set(c.released.get() + len);
        c.live.set(c.live.get() - 1);
    }
}

/// Test source that refuses any reservation which would take the total
/// past `budget` bytes.
#[cfg(test)]
#[derive(Debug)]
pub(crate) struct LimitedSource {
    budget: usize,
    used: Cell<usize>,
}

#[cfg(test)]
impl LimitedSource {
    pub fn new(budget: usize) -> Self {
        Self {
            budget,
            used: Cell::new(0),
        }
    }
}

#[cfg(test)]
unsafe impl MemorySource for LimitedSource {
    fn reserve(&self, len: usize) -> Option<NonNull<u8>> {
        let used = self.used.get().checked_add(len)?;
        if used > self.budget {
            return None;
        }
        let addr = Kernel.reserve(len)?;
        self.used.set(used);
        Some(addr)
    }

    unsafe fn release(&self, addr: NonNull<u8>, len: usize) {
        unsafe { Kernel.release(addr, len) };
        self.used.set(self.used.get() - len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_memory_is_writable() {
        let kernel = Kernel;
        let addr = kernel.reserve(4096).unwrap();
        unsafe {
            addr.as_ptr().write(23);
            addr.as_ptr().add(4095).write(45);
            assert_eq!(*addr.as_ptr(), 23);
            assert_eq!(*addr.as_ptr().add(4095), 45);
            kernel.release(addr, 4096);
        }
    }

    #[test]
    fn zero_length_reservation_is_dangling() {
        let kernel = Kernel;
        let addr = kernel.reserve(0).unwrap();
        assert_eq!(addr, NonNull::dangling());
        unsafe { kernel.release(addr, 0) };
    }

    #[test]
    fn tracking_counts_reservations() {
        let source = TrackingSource::new(Kernel);
        let stats = source.stats();

        let a = source.reserve(100).unwrap();
        let b = source.reserve(200).unwrap();
        assert_eq!(stats.reserved_bytes(), 300);
        assert_eq!(stats.reservations(), 2);
        assert_eq!(stats.live_reservations(), 2);

        unsafe { source.release(a, 100) };
        assert_eq!(stats.live_bytes(), 200);
        assert_eq!(stats.live_reservations(), 1);

        unsafe { source.release(b, 200) };
        assert_eq!(stats.live_bytes(), 0);
        assert_eq!(stats.released_bytes(), 300);
    }

    #[test]
    fn limited_source_refuses_past_budget() {
        let source = LimitedSource::new(100);
        let a = source.reserve(60).unwrap();
        assert!(source.reserve(60).is_none());
        unsafe { source.release(a, 60) };
        let b = source.reserve(100).unwrap();
        unsafe { source.release(b, 100) };
    }
}

pub use std::io;
use super::StackAllocator;
use std::fmt;
use std::ptr::null_mut;
use libc::{MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE, c_int};

const PROT: c_int = PROT_READ | PROT_WRITE;

#[cfg(any(target_os="dragonfly", target_os="freebsd", target_os="linux", target_os="netbsd", target_os="openbsd"))]
const FLAGS: c_int = MAP_ANONYMOUS | MAP_PRIVATE | libc::MAP_STACK;
#[cfg(not(any(target_os="dragonfly", target_os="freebsd", target_os="linux", target_os="netbsd", target_os="openbsd")))]
const FLAGS: c_int = MAP_ANONYMOUS | MAP_PRIVATE;

const MMAP_RETURNED_NULL: &str =
  "Mmap returned null, which violates POSIX and certainly isn't sporting.";

/// An anonymous mapping standing in for the one big stack of a microcontroller, so hosted
/// programs (and tests) can carve fibers out of memory nobody else is using.
///
/// There is no guard page. Overflowing a region scribbles on the region below, just as it would
/// on the real thing.
pub struct OsRegion {
  start: *mut u8,
  size:  usize,
}

impl fmt::Debug for OsRegion {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "OsRegion<{:x}-{:x}>", self.bottom(), self.top())
  }
}

impl OsRegion {
  /// `mmap()`s a new region, rounding the size up to whole pages.
  pub fn new(size: usize, page_size: PageSize) -> io::Result<OsRegion> {
    let size = page_size.round(size);
    match unsafe { libc::mmap(null_mut(), size, PROT, FLAGS, -1, 0) } {
      MAP_FAILED => Err(io::Error::last_os_error()),
      not_ptr if not_ptr.is_null() => panic!("{}", MMAP_RETURNED_NULL),
      ptr => {
        log::debug!("stack: mapped region {:#x}..{:#x}", ptr as usize, ptr as usize + size);
        Ok(OsRegion { start: ptr.cast(), size })
      }
    }
  }

  /// One past the highest byte. Stacks grow down from here.
  pub fn top(&self) -> usize { self.start as usize + self.size }

  /// The lowest byte.
  pub fn bottom(&self) -> usize { self.start as usize }

  pub fn size(&self) -> usize { self.size }

  /// A bounded allocator over the whole region.
  ///
  /// # Safety
  ///
  /// The region must outlive every fiber created from the allocator, and must not be handed to a
  /// second allocator.
  pub unsafe fn allocator(&self) -> StackAllocator {
    StackAllocator::with_bounds(self.top(), self.bottom())
  }
}

impl Drop for OsRegion {
  fn drop(&mut self) {
    unsafe { libc::munmap(self.start.cast(), self.size) };
  }
}

#[repr(transparent)]
#[derive(Clone,Copy,Debug)]
/// A value holding the operating system's standard pagesize (probably 4k).
pub struct PageSize(usize);

impl PageSize {
  pub fn get() -> io::Result<PageSize> {
    match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
      -1 => Err(io::Error::last_os_error()),
      size => Ok(PageSize(size as usize)),
    }
  }
  pub fn size(self) -> usize { self.0 }
  /// Rounds up to a whole number of pages. Page sizes are powers of two.
  pub fn round(self, size: usize) -> usize {
    let mask = self.0 - 1;
    (size + mask) & !mask
  }
}

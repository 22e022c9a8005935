//! Carving fiber stacks out of one pre-existing stack.
//!
//! Regions are handed out top down. The first one starts below the originating context's own
//! headroom, every later one starts below the region before it:
//!
//! ```text
//! base (stack pointer at the first reservation, or a given top)
//! | originating context, `DEFAULT_ORIGIN_STACK_SIZE` unless told otherwise
//! | fiber 1
//! | fiber 2
//! v ...
//! ```
use crate::FiberError;
use crate::switch::{Context, Registers, STACK_ALIGN};
use log::{debug, trace, warn};

/// Headroom left to the originating context when nobody says otherwise.
pub const DEFAULT_ORIGIN_STACK_SIZE: usize = 1024;

/// Hands out disjoint, downward-growing stack regions.
///
/// Nothing is allocated or written. The allocator only does the arithmetic, the memory is whatever
/// the base points into.
#[derive(Debug)]
pub struct StackAllocator {
  boundary: Option<usize>, // top of the last region handed out, or the base
  last_region_size: usize, // what the next reservation has to step over
  limit: usize,            // lowest usable address, 0 for unchecked
  frozen: bool,
}

impl StackAllocator {
  /// An allocator that carves up the stack it is first used on.
  ///
  /// The base is sampled from the stack pointer at the first reservation. The originating context
  /// keeps [`DEFAULT_ORIGIN_STACK_SIZE`] bytes below that point until
  /// [`set_originating_context_stack_size`](Self::set_originating_context_stack_size) says
  /// otherwise.
  ///
  /// # Safety
  ///
  /// * The first reservation must happen on the stack that is to be carved up.
  /// * The originating context must never use more stack below the sampled point than its
  ///   declared size, and the whole carved area must be mapped, writable stack.
  pub const unsafe fn new() -> Self {
    StackAllocator {
      boundary: None,
      last_region_size: DEFAULT_ORIGIN_STACK_SIZE,
      limit: 0,
      frozen: false,
    }
  }

  /// An allocator that carves downwards from `top` instead of the live stack pointer.
  ///
  /// # Safety
  ///
  /// The memory below `top` must be writable and unused for as far as reservations reach.
  pub const unsafe fn with_base(top: usize) -> Self {
    StackAllocator {
      boundary: Some(align_down(top)),
      last_region_size: 0,
      limit: 0,
      frozen: false,
    }
  }

  /// An allocator over `bottom..top`. Reservations that don't fit fail with
  /// [`FiberError::Exhausted`].
  ///
  /// # Safety
  ///
  /// `bottom..top` must be writable and not used for anything else while fibers live in it.
  pub const unsafe fn with_bounds(top: usize, bottom: usize) -> Self {
    StackAllocator {
      boundary: Some(align_down(top)),
      last_region_size: 0,
      limit: bottom,
      frozen: false,
    }
  }

  /// Declares how much stack the originating context needs below the base.
  ///
  /// Only possible before the first reservation. Returns whether the size was taken.
  pub fn set_originating_context_stack_size(&mut self, size: usize) -> bool {
    if self.frozen {
      warn!("stack: base already frozen, ignoring originating stack size {}", size);
      return false;
    }
    match align_up(size) {
      Some(size) => { self.last_region_size = size; true }
      None => false,
    }
  }

  /// Reserves a region of `size` bytes (rounded up to [`STACK_ALIGN`]) and returns its top.
  ///
  /// The region is `top - size..top`. The first call freezes the base.
  pub fn reserve(&mut self, size: usize) -> Result<usize, FiberError> {
    let exhausted = |available| FiberError::Exhausted { requested: size, available };
    let size = align_up(size).ok_or(exhausted(0))?;
    let boundary = match self.boundary {
      Some(boundary) => boundary,
      None => {
        let sampled = align_down(<Registers as Context>::current_stack_pointer());
        debug!("stack: sampled base {:#x}", sampled);
        sampled
      }
    };
    let top = boundary.checked_sub(self.last_region_size).ok_or(exhausted(0))?;
    let available = top.saturating_sub(self.limit);
    if size > available {
      return Err(exhausted(available));
    }
    if !self.frozen {
      debug!("stack: base frozen at {:#x}, originating context keeps {} bytes", boundary, self.last_region_size);
    }
    self.boundary = Some(top);
    self.last_region_size = size;
    self.frozen = true;
    trace!("stack: reserved {:#x}..{:#x} ({} bytes)", top - size, top, size);
    Ok(top)
  }

  /// Whether a region has been handed out (and the base can no longer change).
  pub fn is_frozen(&self) -> bool { self.frozen }

  /// The top of the most recent region, or the base if nothing has been reserved yet.
  /// `None` while the base has not been sampled.
  pub fn boundary(&self) -> Option<usize> { self.boundary }

  /// The lowest address spoken for, including the most recent region.
  pub fn floor(&self) -> Option<usize> {
    self.boundary.map(|b| b.saturating_sub(self.last_region_size))
  }

  /// The size of the most recent region, or the originating context's headroom before that.
  pub fn last_region_size(&self) -> usize { self.last_region_size }
}

const fn align_down(addr: usize) -> usize { addr & !(STACK_ALIGN - 1) }

fn align_up(size: usize) -> Option<usize> {
  size.checked_add(STACK_ALIGN - 1).map(align_down)
}

#[cfg(all(unix,feature="std"))]
mod os_unix;
#[cfg(all(unix,feature="std"))]
pub use os_unix::*;

#[cfg(test)]
mod tests {
  use super::*;

  const TOP: usize = 0x1000_0000;

  #[test]
  fn regions_descend_without_overlap() {
    let mut stacks = unsafe { StackAllocator::with_base(TOP) };
    let sizes = [256, 1024, 64, 4096, 512];
    let mut regions = Vec::new();
    for size in sizes {
      let top = stacks.reserve(size).unwrap();
      regions.push((top - size, top));
    }
    assert_eq!(regions[0].1, TOP);
    for pair in regions.windows(2) {
      // every region sits entirely below the one created before it
      assert!(pair[1].1 <= pair[0].0, "{:x?} overlaps {:x?}", pair[1], pair[0]);
    }
    assert_eq!(stacks.floor(), Some(regions[4].0));
  }

  #[test]
  fn sizes_round_up_to_stack_alignment() {
    let mut stacks = unsafe { StackAllocator::with_base(TOP + 3) };
    let first = stacks.reserve(1).unwrap();
    assert_eq!(first, TOP);
    assert_eq!(stacks.last_region_size(), STACK_ALIGN);
    let second = stacks.reserve(STACK_ALIGN + 1).unwrap();
    assert_eq!(second, TOP - STACK_ALIGN);
    assert_eq!(second % STACK_ALIGN, 0);
    assert_eq!(stacks.last_region_size(), 2 * STACK_ALIGN);
  }

  #[test]
  fn originating_headroom_only_before_freeze() {
    let mut stacks = unsafe { StackAllocator::with_base(TOP) };
    assert!(!stacks.is_frozen());
    assert!(stacks.set_originating_context_stack_size(4096));
    let top = stacks.reserve(512).unwrap();
    assert_eq!(top, TOP - 4096);
    assert!(stacks.is_frozen());
    assert!(!stacks.set_originating_context_stack_size(64));
    assert_eq!(stacks.reserve(512).unwrap(), TOP - 4096 - 512);
  }

  #[test]
  fn bounded_arena_reports_exhaustion() {
    let mut stacks = unsafe { StackAllocator::with_bounds(TOP, TOP - 1024) };
    assert_eq!(stacks.reserve(512), Ok(TOP));
    assert_eq!(stacks.reserve(512), Ok(TOP - 512));
    assert_eq!(
      stacks.reserve(16),
      Err(FiberError::Exhausted { requested: 16, available: 0 }),
    );
    // a failed reservation leaves the arena as it was
    assert_eq!(stacks.boundary(), Some(TOP - 512));
    assert_eq!(stacks.floor(), Some(TOP - 1024));
  }

  #[test]
  fn live_stack_is_sampled_once() {
    let mut stacks = unsafe { StackAllocator::new() };
    assert_eq!(stacks.boundary(), None);
    assert_eq!(stacks.last_region_size(), DEFAULT_ORIGIN_STACK_SIZE);
    let marker = 0u8;
    let here = &marker as *const u8 as usize;
    let top = stacks.reserve(256).unwrap();
    // below our own frame, by at least the default headroom
    assert!(top + DEFAULT_ORIGIN_STACK_SIZE <= here);
    assert_eq!(top % STACK_ALIGN, 0);
    assert_eq!(stacks.reserve(256).unwrap(), top - 256);
  }
}

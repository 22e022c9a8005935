//! A fixed-capacity arena of fibers, addressed by handle instead of by pointer.
//!
//! The pool owns the descriptors, the stack allocator and a descriptor for the originating
//! context, and it tracks which of them is running. Everything goes through `&self`, so fibers can
//! share the pool with the context that spawned them.
use crate::FiberError;
use crate::fiber::{self, EntryFn, Fiber, ParkFn, State};
use crate::stack::StackAllocator;
use crate::switch::{self, swap};
use core::cell::{Cell, RefCell, UnsafeCell};
use core::fmt;
use core::marker::PhantomPinned;
use core::ops::Range;
use core::pin::Pin;
use log::debug;

/// A handle to a fiber in a [`FiberPool`], or to the pool's originating context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FiberId(usize);

impl FiberId {
  /// The context that owns the pool and spawned its fibers.
  pub const ORIGIN: FiberId = FiberId(usize::MAX);

  /// The slot number, `None` for [`ORIGIN`](Self::ORIGIN).
  pub fn index(self) -> Option<usize> {
    if self == FiberId::ORIGIN { None } else { Some(self.0) }
  }
}

impl fmt::Display for FiberId {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self.index() {
      Some(index) => write!(f, "#{}", index),
      None => f.write_str("origin"),
    }
  }
}

/// Up to `N` fibers carved from one [`StackAllocator`].
///
/// Slots are handed out in order and never freed. A fiber that has returned is reused with
/// [`restart`](Self::restart). Spawning requires the pool to be pinned, because the fibers' saved
/// contexts live inside it.
pub struct FiberPool<const N: usize> {
  stacks:  RefCell<StackAllocator>,
  origin:  UnsafeCell<Fiber>,
  fibers:  [UnsafeCell<Fiber>; N],
  len:     Cell<usize>,
  current: Cell<FiberId>,
  _pin:    PhantomPinned,
}

impl<const N: usize> FiberPool<N> {
  pub const fn new(stacks: StackAllocator) -> Self {
    FiberPool {
      stacks:  RefCell::new(stacks),
      origin:  UnsafeCell::new(Fiber::new()),
      fibers:  [const { UnsafeCell::new(Fiber::new()) }; N],
      len:     Cell::new(0),
      current: Cell::new(FiberId::ORIGIN),
      _pin:    PhantomPinned,
    }
  }

  /// Creates a fiber that will run `entry(arg)` on a fresh `stack_size` region.
  pub fn spawn(self: Pin<&Self>, stack_size: usize, entry: EntryFn, arg: usize) -> Result<FiberId, FiberError> {
    let this = self.get_ref();
    let index = this.len.get();
    if index == N {
      return Err(FiberError::PoolFull { capacity: N });
    }
    let fiber = this.fibers[index].get();
    let mut stacks = this.stacks.borrow_mut();
    // the slot is unused and pinned along with the pool.
    unsafe { fiber::create(&mut stacks, fiber, stack_size, entry, arg)? };
    this.len.set(index + 1);
    debug!("pool: spawned fiber #{} of {}", index, N);
    Ok(FiberId(index))
  }

  /// Re-arms a fiber that has returned to run `entry(arg)`, on the stack it already has.
  pub fn restart(&self, id: FiberId, entry: EntryFn, arg: usize) -> Result<(), FiberError> {
    if id == FiberId::ORIGIN {
      return Err(FiberError::UnknownFiber(id));
    }
    let fiber = self.slot(id)?;
    // a park hook runs on a returned fiber, so the state alone doesn't rule out restarting ourselves.
    if id == self.current.get() || unsafe { (*fiber).state } == State::Executing {
      return Err(FiberError::StillExecuting(id));
    }
    unsafe { fiber::restart(fiber, entry, arg) };
    Ok(())
  }

  /// Suspends the running context and resumes `id`. Returns once something switches back.
  ///
  /// Switching to the running context does nothing.
  pub fn switch_to(&self, id: FiberId) -> Result<(), FiberError> {
    let next = self.slot(id)?;
    let me = self.current.get();
    if id == me {
      return Ok(());
    }
    let prev = self.slot(me)?;
    self.current.set(id);
    // every descriptor but the running one has been primed or saved, and none of them move.
    unsafe { swap(next, prev) };
    // whoever brought us back, we are the running context again.
    self.current.set(me);
    Ok(())
  }

  /// Yields from the running fiber back to the context that last switched to it.
  pub fn suspend(&self) -> Result<(), FiberError> {
    let me = self.current.get();
    if me == FiberId::ORIGIN {
      return Err(FiberError::NotAFiber);
    }
    let fiber = self.slot(me)?;
    let back = self.id_of(unsafe { (*fiber).resumer });
    self.current.set(back);
    // we were swapped into, so the resumer is a saved descriptor of this pool.
    unsafe { switch::suspend(fiber) };
    self.current.set(me);
    Ok(())
  }

  /// Installs the park hook of a fiber, see [`Fiber::set_park`].
  pub fn set_park(&self, id: FiberId, hook: ParkFn, data: usize) -> Result<(), FiberError> {
    if id == FiberId::ORIGIN {
      return Err(FiberError::UnknownFiber(id));
    }
    let fiber = self.slot(id)?;
    unsafe { (*fiber).park = Some((hook, data)) };
    Ok(())
  }

  pub fn state(&self, id: FiberId) -> Option<State> {
    self.slot(id).ok().map(|fiber| unsafe { (*fiber).state })
  }

  pub fn stack_region(&self, id: FiberId) -> Option<Range<usize>> {
    if id == FiberId::ORIGIN {
      return None;
    }
    self.slot(id).ok().map(|fiber| unsafe { (*fiber).stack_region() })
  }

  /// The context that is running.
  pub fn current(&self) -> FiberId { self.current.get() }

  /// How many fibers have been spawned.
  pub fn len(&self) -> usize { self.len.get() }

  pub fn is_empty(&self) -> bool { self.len.get() == 0 }

  pub fn capacity(&self) -> usize { N }

  fn slot(&self, id: FiberId) -> Result<*mut Fiber, FiberError> {
    match id.index() {
      None => Ok(self.origin.get()),
      Some(index) if index < self.len.get() => Ok(self.fibers[index].get()),
      Some(_) => Err(FiberError::UnknownFiber(id)),
    }
  }

  fn id_of(&self, fiber: *mut Fiber) -> FiberId {
    self.fibers[..self.len.get()].iter()
      .position(|slot| slot.get() == fiber)
      .map_or(FiberId::ORIGIN, FiberId)
  }
}

impl<const N: usize> fmt::Debug for FiberPool<N> {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    f.debug_struct("FiberPool")
      .field("len", &self.len.get())
      .field("capacity", &N)
      .field("current", &self.current.get())
      .finish()
  }
}

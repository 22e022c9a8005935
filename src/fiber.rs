//! Fiber descriptors and their lifecycle: create and restart.
use crate::FiberError;
use crate::stack::StackAllocator;
use crate::switch::{launch, Context, Registers};
use core::fmt;
use core::marker::PhantomPinned;
use core::ops::Range;
use core::ptr::null_mut;
use log::{debug, trace, warn};

/// The user function a fiber runs. It gets the argument given to [`create`] or [`restart`].
///
/// It must not unwind: a panic escaping it aborts.
pub type EntryFn = fn(usize);

/// A cooperative yield, called over and over by a fiber that has returned.
pub type ParkFn = fn(usize);

/// Where a fiber is in its life.
///
/// Suspending and resuming doesn't change the state, only launching, returning and restarting do.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
  /// Created or restarted, not yet swapped into.
  Created,
  /// Running its entry point, or suspended somewhere inside it.
  Executing,
  /// The entry point returned. Resuming it only re-enters the park loop.
  Returned,
}

/// The saved context of one fiber.
///
/// A descriptor must not move while it may be resumed: the trampoline finds it by address and a
/// suspended context is saved into it. Descriptors are `!Unpin` and `!Send`.
///
/// [`Fiber::new`] makes a descriptor with nothing to launch. That is what the originating context
/// swaps itself out into.
#[repr(C)]
pub struct Fiber {
  pub(crate) regs:    Registers, // first, the trampoline is handed its address
  pub(crate) owner:   *mut Fiber,
  pub(crate) resumer: *mut Fiber,
  pub(crate) state:   State,
  pub(crate) entry:   Option<EntryFn>,
  pub(crate) arg:     usize,
  pub(crate) park:    Option<(ParkFn, usize)>,
  stack_size: usize,
  initial_sp: usize,
  _pin: PhantomPinned,
}

impl Fiber {
  /// A descriptor for whatever is running now. Swapping out of it saves the current context.
  pub const fn new() -> Fiber {
    Fiber {
      regs: <Registers as Context>::BLANK,
      owner: null_mut(),
      resumer: null_mut(),
      state: State::Executing,
      entry: None,
      arg: 0,
      park: None,
      stack_size: 0,
      initial_sp: 0,
      _pin: PhantomPinned,
    }
  }

  pub fn state(&self) -> State { self.state }

  /// The saved stack pointer. Stale while the fiber is the running context.
  pub fn stack_pointer(&self) -> usize { self.regs.stack_pointer() }

  /// The top of the fiber's stack region, where every launch starts.
  pub fn initial_stack_pointer(&self) -> usize { self.initial_sp }

  /// Bytes reserved for the fiber's stack, after alignment. 0 if never created.
  pub fn stack_size(&self) -> usize { self.stack_size }

  /// The fiber's stack region.
  pub fn stack_region(&self) -> Range<usize> {
    self.initial_sp - self.stack_size..self.initial_sp
  }

  pub fn argument(&self) -> usize { self.arg }

  /// Installs the cooperative yield the park loop calls once the entry point has returned.
  ///
  /// Without one, a returned fiber suspends back to whoever resumed it. The hook is kept across
  /// [`restart`].
  pub fn set_park(&mut self, hook: ParkFn, data: usize) {
    self.park = Some((hook, data));
  }

  /// Goes back to suspending to the resumer.
  pub fn clear_park(&mut self) {
    self.park = None;
  }
}

impl Default for Fiber {
  fn default() -> Self { Fiber::new() }
}

impl fmt::Debug for Fiber {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    f.debug_struct("Fiber")
      .field("state", &self.state)
      .field("stack", &format_args!("{:#x}..{:#x}", self.initial_sp - self.stack_size, self.initial_sp))
      .field("sp", &format_args!("{:#x}", self.stack_pointer()))
      .field("arg", &self.arg)
      .finish()
  }
}

/// Reserves a stack region for `fiber` and prepares it to run `entry(arg)`. Nothing runs until
/// the fiber is swapped into.
///
/// Fails only when `stacks` is a bounded arena that is full.
///
/// # Safety
///
/// * `fiber` must be valid for writes and must not move until it is no longer resumed.
/// * `fiber` must not be running or suspended. Its previous stack, if any, is abandoned.
pub unsafe fn create(
  stacks:     &mut StackAllocator,
  fiber:      *mut Fiber,
  stack_size: usize,
  entry:      EntryFn,
  arg:        usize,
) -> Result<(), FiberError> {
  let top = stacks.reserve(stack_size)?;
  (*fiber).stack_size = stacks.last_region_size();
  (*fiber).initial_sp = top;
  (*fiber).resumer = null_mut();
  arm(fiber, entry, arg);
  debug!("fiber: created {:p}, stack {:#x}..{:#x}", fiber, top - (*fiber).stack_size, top);
  Ok(())
}

/// Prepares a fiber to run `entry(arg)` from the top of the stack it already has.
///
/// Meant for fibers that have [`Returned`](State::Returned). Restarting one that is still
/// executing throws away whatever it was in the middle of.
///
/// # Safety
///
/// * `fiber` must have been created and must not have moved since.
/// * `fiber` must not be the running context.
/// * Nothing may still refer to data on the fiber's stack.
pub unsafe fn restart(fiber: *mut Fiber, entry: EntryFn, arg: usize) {
  if (*fiber).state == State::Executing {
    warn!("fiber: restarting {:p} while it is executing, its stack is discarded", fiber);
  }
  arm(fiber, entry, arg);
  debug!("fiber: restarted {:p}", fiber);
}

unsafe fn arm(fiber: *mut Fiber, entry: EntryFn, arg: usize) {
  (*fiber).entry = Some(entry);
  (*fiber).arg = arg;
  (*fiber).owner = fiber;
  (*fiber).state = State::Created;
  let top = (*fiber).initial_sp;
  (*fiber).regs.prime(top, launch);
  trace!("fiber: primed {:p} at {:#x}", fiber, top);
}

#[cfg(test)]
mod tests {
  use super::*;

  fn nothing(_: usize) {}
  fn other(_: usize) {}

  #[test]
  fn create_primes_at_region_top() {
    let mut stacks = unsafe { StackAllocator::with_base(0x4000_0000) };
    let mut fiber = Fiber::new();
    let f = &mut fiber as *mut Fiber;
    unsafe { create(&mut stacks, f, 1000, nothing, 7).unwrap() };
    assert_eq!(fiber.state(), State::Created);
    assert_eq!(fiber.stack_pointer(), fiber.initial_stack_pointer());
    assert_eq!(fiber.initial_stack_pointer(), 0x4000_0000);
    assert!(fiber.stack_size() >= 1000);
    assert_eq!(fiber.stack_region().end - fiber.stack_region().start, fiber.stack_size());
    assert_eq!(fiber.argument(), 7);
    assert_eq!(fiber.owner, f);
  }

  #[test]
  fn restart_rearms_without_reserving() {
    let mut stacks = unsafe { StackAllocator::with_base(0x4000_0000) };
    let mut fiber = Fiber::new();
    let f = &mut fiber as *mut Fiber;
    unsafe { create(&mut stacks, f, 512, nothing, 1).unwrap() };
    let floor = stacks.floor();
    fiber.state = State::Returned;
    fiber.set_park(nothing, 3);
    unsafe { restart(f, other, 2) };
    assert_eq!(stacks.floor(), floor);
    assert_eq!(fiber.state(), State::Created);
    assert_eq!(fiber.stack_pointer(), fiber.initial_stack_pointer());
    assert_eq!(fiber.argument(), 2);
    assert_eq!(fiber.entry.map(|e| e as *const () as usize), Some(other as *const () as usize));
    assert!(fiber.park.is_some());
  }

  #[test]
  fn fresh_descriptor_is_the_running_context() {
    let fiber = Fiber::new();
    assert_eq!(fiber.state(), State::Executing);
    assert_eq!(fiber.stack_size(), 0);
    assert!(fiber.stack_region().is_empty());
  }
}

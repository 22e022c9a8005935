//! The context switch engine and the launch trampoline.
//!
//! Everything architecture specific lives behind [`Context`]. The rest of the crate only ever
//! primes a context, asks it for its stack pointer or switches between two of them.
mod arch;
pub use arch::Registers;

use crate::fiber::{Fiber, State};
use core::ptr::{addr_of, addr_of_mut};

/// The function a freshly primed context starts in. It receives the context it was loaded from.
pub type Launch<C> = unsafe extern "C" fn(*const C) -> !;

/// A snapshot of the registers the calling convention promises survive a call.
///
/// # Safety
///
/// * `switch` must save every callee-saved register (and the stack pointer and return address)
///   into `save`, restore the same set from `load`, and pass `load` as the first argument when
///   the loaded context was primed.
/// * A context primed with `prime(top, launch)` must enter `launch` as if it had been called
///   with `top` as the caller's stack pointer.
pub unsafe trait Context: Sized {
  /// Required alignment of a stack pointer at a call boundary.
  const STACK_ALIGN: usize;
  /// An all-zero context, with default control words where the ABI has them.
  const BLANK: Self;

  /// Prepares a context that starts running `launch` on a stack ending at `stack_top`.
  ///
  /// Nothing is written to the stack itself.
  fn prime(&mut self, stack_top: usize, launch: Launch<Self>);

  /// The saved stack pointer. Meaningless while the context is live.
  fn stack_pointer(&self) -> usize;

  /// The stack pointer of the caller, right now.
  fn current_stack_pointer() -> usize;

  /// Saves the live state into `save` and resumes `load`. Returns when something loads `save`.
  ///
  /// # Safety
  ///
  /// * `save` must be valid for writes and stay put until it is loaded.
  /// * `load` must be primed or have been saved by a previous `switch`.
  unsafe fn switch(save: *mut Self, load: *const Self);
}

/// Stack alignment of the target. Every region handed out by a
/// [`StackAllocator`](crate::stack::StackAllocator) has a top aligned to this.
pub const STACK_ALIGN: usize = <Registers as Context>::STACK_ALIGN;

/// Suspends `prev` and resumes `next`.
///
/// `next` resumes in the launch trampoline if it was just created or restarted, otherwise right
/// after the `swap` that suspended it. This call returns once something swaps back into `prev`.
/// `next` remembers `prev` as its resumer, see [`suspend`].
///
/// # Safety
///
/// * Both descriptors must be valid and must not have moved since they were last saved or created.
/// * `prev` must describe the context that is running now.
/// * `next` must not be running (it was created, restarted, or suspended by an earlier swap).
/// * `next`'s stack region must still be reserved for it.
pub unsafe fn swap(next: *mut Fiber, prev: *mut Fiber) {
  (*next).resumer = prev;
  <Registers as Context>::switch(addr_of_mut!((*prev).regs), addr_of!((*next).regs));
}

/// Yields from `fiber` back to whichever context last swapped into it.
///
/// Unlike [`swap`] this leaves the resumer's own resumer alone, so a fiber that was resumed from
/// inside another fiber goes back there, and that one still goes back to its own resumer.
///
/// # Safety
///
/// * `fiber` must describe the running context and must have been swapped into at least once.
/// * The same as [`swap`] for the resumer.
pub unsafe fn suspend(fiber: *mut Fiber) {
  let resumer = (*fiber).resumer;
  <Registers as Context>::switch(addr_of_mut!((*fiber).regs), addr_of!((*resumer).regs));
}

/* Launch trampoline (terminates the call chain, becoming the first frame):
 * - entered through `switch` with a primed context, never called.
 * - finds its descriptor through the self reference, runs the entry point in a new frame.
 * - parks forever afterwards. there is nothing to return to.
 */
pub(crate) unsafe extern "C" fn launch(regs: *const Registers) -> ! {
  // the registers sit at the start of the descriptor, the self reference says where that should be.
  let fiber = (*regs.cast::<Fiber>()).owner;
  debug_assert_eq!(fiber as usize, regs as usize, "fiber descriptor moved after create");

  (*fiber).state = State::Executing;
  if let Some(entry) = (*fiber).entry {
    entry((*fiber).arg);
  }
  (*fiber).state = State::Returned;

  loop {
    park(fiber);
  }
}

#[inline(never)]
unsafe fn park(fiber: *mut Fiber) {
  match (*fiber).park {
    Some((hook, data)) => hook(data),
    None => suspend(fiber),
  }
}

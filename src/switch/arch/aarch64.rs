//! Fun ABI facts:
//!
//! * `sp` must always be 16-byte aligned.
//! * x19-x28 and the frame pointer are callee-saved, and so are the bottom halves of v8-v15
//!   (i.e. d8-d15). Nothing else is.
//! * x18 is the platform register on some OSes. We leave it alone in both directions.
use crate::switch::{Context, Launch};
use core::arch::{asm, naked_asm};

/// The callee-saved state of a suspended aarch64 context.
///
/// The field order is load-bearing: `swap_registers` addresses it by offset.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct Registers {
  x19_x28: [usize; 10], // 0
  fp:      usize,       // 80
  lr:      usize,       // 88
  sp:      usize,       // 96
  d8_d15:  [u64; 8],    // 104
}

unsafe impl Context for Registers {
  const STACK_ALIGN: usize = 16;

  const BLANK: Self = Registers { x19_x28: [0; 10], fp: 0, lr: 0, sp: 0, d8_d15: [0; 8] };

  fn prime(&mut self, stack_top: usize, launch: Launch<Self>) {
    // fp = 0 ends the frame record chain, `ret` branches to lr with x0 = the context.
    *self = Registers { sp: stack_top, lr: launch as *const () as usize, ..Self::BLANK };
  }

  fn stack_pointer(&self) -> usize { self.sp }

  #[inline(always)]
  fn current_stack_pointer() -> usize {
    let sp: usize;
    unsafe { asm!("mov {}, sp", out(reg) sp, options(nomem, nostack, preserves_flags)) };
    sp
  }

  #[inline(always)]
  unsafe fn switch(save: *mut Self, load: *const Self) {
    swap_registers(save, load)
  }
}

/// Saves the callee-saved state into `save`, loads it from `load` and returns to the loaded link
/// register with `load` as the first argument.
///
/// # Safety
///
/// * `save` must be valid for writes and `load` for reads.
/// * `load` must have been primed or filled by a previous `swap_registers`.
#[unsafe(naked)]
unsafe extern "C" fn swap_registers(_save: *mut Registers, _load: *const Registers) {
  naked_asm!(
    // step 1: state preservation. x0 = save, stp = store pair of registers.
    "stp x19, x20, [x0, #0]",
    "stp x21, x22, [x0, #16]",
    "stp x23, x24, [x0, #32]",
    "stp x25, x26, [x0, #48]",
    "stp x27, x28, [x0, #64]",
    "stp x29, x30, [x0, #80]", // frame pointer and our return address
    "mov x9, sp",              // sp can't be stored directly
    "str x9, [x0, #96]",
    "stp d8,  d9,  [x0, #104]",
    "stp d10, d11, [x0, #120]",
    "stp d12, d13, [x0, #136]",
    "stp d14, d15, [x0, #152]",

    // step 2: state restoration (inverse of preservation). x1 = load
    "ldp x19, x20, [x1, #0]",
    "ldp x21, x22, [x1, #16]",
    "ldp x23, x24, [x1, #32]",
    "ldp x25, x26, [x1, #48]",
    "ldp x27, x28, [x1, #64]",
    "ldp x29, x30, [x1, #80]",
    "ldr x9, [x1, #96]",
    "mov sp, x9",
    "ldp d8,  d9,  [x1, #104]",
    "ldp d10, d11, [x1, #120]",
    "ldp d12, d13, [x1, #136]",
    "ldp d14, d15, [x1, #152]",

    // step 3: a fresh context needs its own address in x0, a resumed one ignores it.
    "mov x0, x1",
    "ret",
  );
}

//! 32-bit Arm, written in the Thumb-1 subset so that it assembles for armv6-m (Cortex-M0) as
//! well as for armv7-m and A32.
//!
//! Fun ABI facts:
//!
//! * `sp` must be 8-byte aligned at public interfaces.
//! * r4-r11 are callee-saved. Thumb-1 can only `stm`/`ldm` the low registers, so r8-r11 are
//!   shuffled through r2-r5.
//! * With the hard-float ABI, d8-d15 (s16-s31) are callee-saved as well.
//! * Code addresses carry the Thumb bit. Rust function pointers already have it set and `bx`
//!   honours it, so nothing needs fixing up.
use crate::switch::{Context, Launch};
use core::arch::{asm, naked_asm};

/// The callee-saved state of a suspended Arm context.
///
/// The field order is load-bearing: `swap_registers` addresses it by offset.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct Registers {
  r4_r11: [usize; 8], // 0
  sp:     usize,      // 32
  lr:     usize,      // 36
  #[cfg(target_abi="eabihf")]
  d8_d15: [u64; 8],   // 40
}

unsafe impl Context for Registers {
  const STACK_ALIGN: usize = 8;

  const BLANK: Self = Registers {
    r4_r11: [0; 8],
    sp: 0,
    lr: 0,
    #[cfg(target_abi="eabihf")]
    d8_d15: [0; 8],
  };

  fn prime(&mut self, stack_top: usize, launch: Launch<Self>) {
    // r7 (the thumb frame pointer) and r11 start out zeroed, which ends the frame chain.
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
#[cfg(not(target_abi="eabihf"))]
#[unsafe(naked)]
unsafe extern "C" fn swap_registers(_save: *mut Registers, _load: *const Registers) {
  naked_asm!(
    // step 1: state preservation. r0 = save, advanced as we go.
    "stm  r0!, {{r4-r7}}",
    "mov  r2, r8",
    "mov  r3, r9",
    "mov  r4, r10",
    "mov  r5, r11",
    "stm  r0!, {{r2-r5}}",
    "mov  r2, sp",
    "mov  r3, lr",
    "stm  r0!, {{r2, r3}}",

    // step 2: state restoration. r1 = load; r4-r7 go last as they were our scratch.
    "adds r1, #16",          // r1 = &load.r8
    "ldm  r1!, {{r2-r5}}",
    "mov  r8, r2",
    "mov  r9, r3",
    "mov  r10, r4",
    "mov  r11, r5",
    "ldm  r1!, {{r2, r3}}",
    "mov  sp, r2",
    "mov  lr, r3",
    "subs r1, #40",          // r1 = load
    "ldm  r1!, {{r4-r7}}",
    "subs r1, #16",

    // step 3: a fresh context needs its own address in r0, a resumed one ignores it.
    "mov  r0, r1",
    "bx   lr",
  );
}

/// Hard-float flavour of the above, which also carries d8-d15.
///
/// # Safety
///
/// See the soft-float version.
#[cfg(target_abi="eabihf")]
#[unsafe(naked)]
unsafe extern "C" fn swap_registers(_save: *mut Registers, _load: *const Registers) {
  naked_asm!(
    "stm    r0!, {{r4-r7}}",
    "mov    r2, r8",
    "mov    r3, r9",
    "mov    r4, r10",
    "mov    r5, r11",
    "stm    r0!, {{r2-r5}}",
    "mov    r2, sp",
    "mov    r3, lr",
    "stm    r0!, {{r2, r3}}",
    "vstmia r0!, {{d8-d15}}",

    "adds   r1, #16",
    "ldm    r1!, {{r2-r5}}",
    "mov    r8, r2",
    "mov    r9, r3",
    "mov    r10, r4",
    "mov    r11, r5",
    "ldm    r1!, {{r2, r3}}",
    "mov    sp, r2",
    "mov    lr, r3",
    "vldmia r1!, {{d8-d15}}",
    "subs   r1, #104",       // r1 = load
    "ldm    r1!, {{r4-r7}}",
    "subs   r1, #16",

    "mov    r0, r1",
    "bx     lr",
  );
}

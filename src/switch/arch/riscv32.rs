//! 32-bit RISC-V, the usual microcontroller flavour (imac, imafc, ...).
//!
//! Fun ABI facts:
//!
//! * `sp` must always be 16-byte aligned.
//! * ra, sp and s0-s11 are callee-saved. s0 doubles as the frame pointer.
//! * With the F or D extension, fs0-fs11 are callee-saved too, at the width of the widest
//!   floating point extension present.
use crate::switch::{Context, Launch};
use core::arch::{asm, naked_asm};

/// The callee-saved state of a suspended RISC-V context.
///
/// The field order is load-bearing: `swap_registers` addresses it by offset.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct Registers {
  ra:       usize,       // 0
  sp:       usize,       // 4
  s0_s11:   [usize; 12], // 8
  #[cfg(target_feature="d")]
  fs0_fs11: [u64; 12],   // 56
  #[cfg(all(target_feature="f", not(target_feature="d")))]
  fs0_fs11: [u32; 12],   // 56
}

unsafe impl Context for Registers {
  const STACK_ALIGN: usize = 16;

  const BLANK: Self = Registers {
    ra: 0,
    sp: 0,
    s0_s11: [0; 12],
    #[cfg(target_feature="f")]
    fs0_fs11: [0; 12],
  };

  fn prime(&mut self, stack_top: usize, launch: Launch<Self>) {
    // s0 = 0 ends the frame chain, `ret` jumps to ra with a0 = the context.
    *self = Registers { sp: stack_top, ra: launch as *const () as usize, ..Self::BLANK };
  }

  fn stack_pointer(&self) -> usize { self.sp }

  #[inline(always)]
  fn current_stack_pointer() -> usize {
    let sp: usize;
    unsafe { asm!("mv {}, sp", out(reg) sp, options(nomem, nostack, preserves_flags)) };
    sp
  }

  #[inline(always)]
  unsafe fn switch(save: *mut Self, load: *const Self) {
    swap_registers(save, load)
  }
}

// The integer half is the same for every flavour, the floating point half is spliced in.
macro_rules! swap_registers {
  ($($fsave:literal,)* ; $($fload:literal,)*) => {
    /// Saves the callee-saved state into `save`, loads it from `load` and returns to the loaded
    /// return address with `load` as the first argument.
    ///
    /// # Safety
    ///
    /// * `save` must be valid for writes and `load` for reads.
    /// * `load` must have been primed or filled by a previous `swap_registers`.
    #[unsafe(naked)]
    unsafe extern "C" fn swap_registers(_save: *mut Registers, _load: *const Registers) {
      naked_asm!(
      // step 1: state preservation. a0 = save
      "sw ra,  0(a0)",
      "sw sp,  4(a0)",
      "sw s0,  8(a0)",
      "sw s1,  12(a0)",
      "sw s2,  16(a0)",
      "sw s3,  20(a0)",
      "sw s4,  24(a0)",
      "sw s5,  28(a0)",
      "sw s6,  32(a0)",
      "sw s7,  36(a0)",
      "sw s8,  40(a0)",
      "sw s9,  44(a0)",
      "sw s10, 48(a0)",
      "sw s11, 52(a0)",
      $($fsave,)*

      // step 2: state restoration (inverse of preservation). a1 = load
      "lw ra,  0(a1)",
      "lw sp,  4(a1)",
      "lw s0,  8(a1)",
      "lw s1,  12(a1)",
      "lw s2,  16(a1)",
      "lw s3,  20(a1)",
      "lw s4,  24(a1)",
      "lw s5,  28(a1)",
      "lw s6,  32(a1)",
      "lw s7,  36(a1)",
      "lw s8,  40(a1)",
      "lw s9,  44(a1)",
      "lw s10, 48(a1)",
      "lw s11, 52(a1)",
      $($fload,)*

      // step 3: a fresh context needs its own address in a0, a resumed one ignores it.
      "mv a0, a1",
      "ret",
      );
    }
  };
}

#[cfg(target_feature="d")]
swap_registers!(
  "fsd fs0,  56(a0)",
  "fsd fs1,  64(a0)",
  "fsd fs2,  72(a0)",
  "fsd fs3,  80(a0)",
  "fsd fs4,  88(a0)",
  "fsd fs5,  96(a0)",
  "fsd fs6,  104(a0)",
  "fsd fs7,  112(a0)",
  "fsd fs8,  120(a0)",
  "fsd fs9,  128(a0)",
  "fsd fs10, 136(a0)",
  "fsd fs11, 144(a0)",
;
  "fld fs0,  56(a1)",
  "fld fs1,  64(a1)",
  "fld fs2,  72(a1)",
  "fld fs3,  80(a1)",
  "fld fs4,  88(a1)",
  "fld fs5,  96(a1)",
  "fld fs6,  104(a1)",
  "fld fs7,  112(a1)",
  "fld fs8,  120(a1)",
  "fld fs9,  128(a1)",
  "fld fs10, 136(a1)",
  "fld fs11, 144(a1)",
);

#[cfg(all(target_feature="f", not(target_feature="d")))]
swap_registers!(
  "fsw fs0,  56(a0)",
  "fsw fs1,  60(a0)",
  "fsw fs2,  64(a0)",
  "fsw fs3,  68(a0)",
  "fsw fs4,  72(a0)",
  "fsw fs5,  76(a0)",
  "fsw fs6,  80(a0)",
  "fsw fs7,  84(a0)",
  "fsw fs8,  88(a0)",
  "fsw fs9,  92(a0)",
  "fsw fs10, 96(a0)",
  "fsw fs11, 100(a0)",
;
  "flw fs0,  56(a1)",
  "flw fs1,  60(a1)",
  "flw fs2,  64(a1)",
  "flw fs3,  68(a1)",
  "flw fs4,  72(a1)",
  "flw fs5,  76(a1)",
  "flw fs6,  80(a1)",
  "flw fs7,  84(a1)",
  "flw fs8,  88(a1)",
  "flw fs9,  92(a1)",
  "flw fs10, 96(a1)",
  "flw fs11, 100(a1)",
);

#[cfg(not(target_feature="f"))]
swap_registers!(;);

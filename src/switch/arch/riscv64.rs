//! Fun ABI facts:
//!
//! * `sp` must always be 16-byte aligned.
//! * No red zone under the stack pointer.
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
  sp:       usize,       // 8
  s0_s11:   [usize; 12], // 16
  #[cfg(target_feature="d")]
  fs0_fs11: [u64; 12],   // 112
  #[cfg(all(target_feature="f", not(target_feature="d")))]
  fs0_fs11: [u32; 12],   // 112
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
      "sd ra,  0(a0)",
      "sd sp,  8(a0)",
      "sd s0,  16(a0)",
      "sd s1,  24(a0)",
      "sd s2,  32(a0)",
      "sd s3,  40(a0)",
      "sd s4,  48(a0)",
      "sd s5,  56(a0)",
      "sd s6,  64(a0)",
      "sd s7,  72(a0)",
      "sd s8,  80(a0)",
      "sd s9,  88(a0)",
      "sd s10, 96(a0)",
      "sd s11, 104(a0)",
      $($fsave,)*

      // step 2: state restoration (inverse of preservation). a1 = load
      "ld ra,  0(a1)",
      "ld sp,  8(a1)",
      "ld s0,  16(a1)",
      "ld s1,  24(a1)",
      "ld s2,  32(a1)",
      "ld s3,  40(a1)",
      "ld s4,  48(a1)",
      "ld s5,  56(a1)",
      "ld s6,  64(a1)",
      "ld s7,  72(a1)",
      "ld s8,  80(a1)",
      "ld s9,  88(a1)",
      "ld s10, 96(a1)",
      "ld s11, 104(a1)",
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
  "fsd fs0,  112(a0)",
  "fsd fs1,  120(a0)",
  "fsd fs2,  128(a0)",
  "fsd fs3,  136(a0)",
  "fsd fs4,  144(a0)",
  "fsd fs5,  152(a0)",
  "fsd fs6,  160(a0)",
  "fsd fs7,  168(a0)",
  "fsd fs8,  176(a0)",
  "fsd fs9,  184(a0)",
  "fsd fs10, 192(a0)",
  "fsd fs11, 200(a0)",
;
  "fld fs0,  112(a1)",
  "fld fs1,  120(a1)",
  "fld fs2,  128(a1)",
  "fld fs3,  136(a1)",
  "fld fs4,  144(a1)",
  "fld fs5,  152(a1)",
  "fld fs6,  160(a1)",
  "fld fs7,  168(a1)",
  "fld fs8,  176(a1)",
  "fld fs9,  184(a1)",
  "fld fs10, 192(a1)",
  "fld fs11, 200(a1)",
);

#[cfg(all(target_feature="f", not(target_feature="d")))]
swap_registers!(
  "fsw fs0,  112(a0)",
  "fsw fs1,  116(a0)",
  "fsw fs2,  120(a0)",
  "fsw fs3,  124(a0)",
  "fsw fs4,  128(a0)",
  "fsw fs5,  132(a0)",
  "fsw fs6,  136(a0)",
  "fsw fs7,  140(a0)",
  "fsw fs8,  144(a0)",
  "fsw fs9,  148(a0)",
  "fsw fs10, 152(a0)",
  "fsw fs11, 156(a0)",
;
  "flw fs0,  112(a1)",
  "flw fs1,  116(a1)",
  "flw fs2,  120(a1)",
  "flw fs3,  124(a1)",
  "flw fs4,  128(a1)",
  "flw fs5,  132(a1)",
  "flw fs6,  136(a1)",
  "flw fs7,  140(a1)",
  "flw fs8,  144(a1)",
  "flw fs9,  148(a1)",
  "flw fs10, 152(a1)",
  "flw fs11, 156(a1)",
);

#[cfg(not(target_feature="f"))]
swap_registers!(;);

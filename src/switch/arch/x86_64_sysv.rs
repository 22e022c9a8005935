//! X86-64 (System V) is pretty simple. Six callee-saved registers plus the stack pointer, and two
//! control words for the floating point units.
//!
//! Fun ABI facts:
//!
//! * `sp` ought to be aligned to 16 bytes when making a function call, so a function is entered
//!   with `rsp % 16 == 8` (the return address has just been pushed).
//! * The MXCSR control bits and the x87 control word are callee-saved. The status bits are not,
//!   but we don't bother separating them.
//! * There is a 128-byte red zone below the stack. Nothing here uses it.
use crate::switch::{Context, Launch};
use core::arch::{asm, naked_asm};

const MXCSR_DEFAULT: u32 = 0x1f80; // all exceptions masked, round to nearest
const FPUCW_DEFAULT: u16 = 0x037f; // all exceptions masked, 64-bit precision

/// The callee-saved state of a suspended x86-64 context.
///
/// The field order is load-bearing: `swap_registers` addresses it by offset.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct Registers {
  rsp:   usize, // 0x00, as it will be once we have returned to `rip`
  rip:   usize, // 0x08
  rbp:   usize, // 0x10
  rbx:   usize, // 0x18
  r12:   usize, // 0x20
  r13:   usize, // 0x28
  r14:   usize, // 0x30
  r15:   usize, // 0x38
  mxcsr: u32,   // 0x40
  fpucw: u16,   // 0x44
}

unsafe impl Context for Registers {
  const STACK_ALIGN: usize = 16;

  const BLANK: Self = Registers {
    rsp: 0, rip: 0, rbp: 0, rbx: 0, r12: 0, r13: 0, r14: 0, r15: 0,
    mxcsr: MXCSR_DEFAULT,
    fpucw: FPUCW_DEFAULT,
  };

  fn prime(&mut self, stack_top: usize, launch: Launch<Self>) {
    // `enter` finishes the job: it pushes a null return address and jumps to r12.
    *self = Registers {
      rsp: stack_top,
      rip: enter as *const () as usize,
      r12: launch as *const () as usize,
      ..Self::BLANK
    };
  }

  fn stack_pointer(&self) -> usize { self.rsp }

  #[inline(always)]
  fn current_stack_pointer() -> usize {
    let sp: usize;
    unsafe { asm!("mov {}, rsp", out(reg) sp, options(nomem, nostack, preserves_flags)) };
    sp
  }

  #[inline(always)]
  unsafe fn switch(save: *mut Self, load: *const Self) {
    swap_registers(save, load)
  }
}

/// Saves the callee-saved state into `save`, loads it from `load` and jumps to the loaded `rip`
/// with `load` as the first argument.
///
/// # Safety
///
/// * `save` must be valid for writes and `load` for reads.
/// * `load` must have been primed or filled by a previous `swap_registers`.
#[unsafe(naked)]
unsafe extern "C" fn swap_registers(_save: *mut Registers, _load: *const Registers) {
  naked_asm!(
    // step 1: state preservation. rdi = save
    "mov rax, [rsp]",     // our return address is where we will resume
    "lea rdx, [rsp + 8]", // and the stack pointer as it will be after returning
    "mov [rdi + 0x00], rdx",
    "mov [rdi + 0x08], rax",
    "mov [rdi + 0x10], rbp",
    "mov [rdi + 0x18], rbx",
    "mov [rdi + 0x20], r12",
    "mov [rdi + 0x28], r13",
    "mov [rdi + 0x30], r14",
    "mov [rdi + 0x38], r15",
    "stmxcsr dword ptr [rdi + 0x40]",
    "fnstcw  word ptr [rdi + 0x44]",

    // step 2: state restoration (inverse of preservation). rsi = load
    "mov rsp, [rsi + 0x00]",
    "mov rbp, [rsi + 0x10]",
    "mov rbx, [rsi + 0x18]",
    "mov r12, [rsi + 0x20]",
    "mov r13, [rsi + 0x28]",
    "mov r14, [rsi + 0x30]",
    "mov r15, [rsi + 0x38]",
    "ldmxcsr dword ptr [rsi + 0x40]",
    "fldcw   word ptr [rsi + 0x44]",

    // step 3: hand the loaded context to whoever is waiting for it. a resumed context ignores
    // rdi (it is caller-saved), a fresh one is `enter` and passes it on to the trampoline.
    "mov rdi, rsi",
    "jmp qword ptr [rsi + 0x08]",
  );
}

/* Entry of a freshly primed context (terminates the call chain, becoming the first frame):
 * - rsp is the 16-byte aligned stack top, rdi the context, r12 the trampoline.
 * - pushes a null return address so the trampoline sees a normal, aligned call frame.
 */
#[unsafe(naked)]
unsafe extern "C" fn enter() {
  naked_asm!(
    "push 0",
    "jmp r12",
  );
}

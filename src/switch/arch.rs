#[cfg(target_arch="aarch64")]
mod aarch64;
#[cfg(target_arch="aarch64")]
pub use aarch64::*;

// Thumb-1 compatible so the same routine serves armv6-m, armv7-m and A32.
#[cfg(target_arch="arm")]
mod arm;
#[cfg(target_arch="arm")]
pub use arm::*;

#[cfg(target_arch="riscv32")]
mod riscv32;
#[cfg(target_arch="riscv32")]
pub use riscv32::*;

#[cfg(target_arch="riscv64")]
mod riscv64;
#[cfg(target_arch="riscv64")]
pub use riscv64::*;

// win64 has a different callee-saved set (xmm6-15, the TIB stack limits), which we don't do.
#[cfg(all(target_arch="x86_64", not(windows)))]
mod x86_64_sysv;
#[cfg(all(target_arch="x86_64", not(windows)))]
pub use x86_64_sysv::*;

#[cfg(all(
  not(target_arch="aarch64"),
  not(target_arch="arm"),
  not(target_arch="riscv32"),
  not(target_arch="riscv64"),
  not(all(target_arch="x86_64", not(windows))),
))]
compile_error!("Unsupported target platform!");

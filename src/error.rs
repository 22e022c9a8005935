use crate::pool::FiberId;
use core::fmt;

/// Failures of the checked layers: bounded stack arenas and the fiber pool.
///
/// The core operations ([`swap`](crate::swap), the trampoline) have no error channel at all, their
/// contracts are preconditions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FiberError {
  /// A bounded arena can't fit the region. `requested` is as asked for, `available` is what is
  /// left below the previous region.
  Exhausted { requested: usize, available: usize },
  /// Every slot of the pool holds a fiber already.
  PoolFull { capacity: usize },
  /// The handle wasn't issued by this pool.
  UnknownFiber(FiberId),
  /// The fiber hasn't returned from its entry point, restarting would throw its stack away.
  StillExecuting(FiberId),
  /// Only a fiber can suspend itself, the originating context has nobody to go back to.
  NotAFiber,
}

impl fmt::Display for FiberError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      FiberError::Exhausted { requested, available } =>
        write!(f, "stack arena exhausted: {} bytes requested, {} available", requested, available),
      FiberError::PoolFull { capacity } => write!(f, "fiber pool is full ({} slots)", capacity),
      FiberError::UnknownFiber(id) => write!(f, "no such fiber: {}", id),
      FiberError::StillExecuting(id) => write!(f, "fiber {} is still executing", id),
      FiberError::NotAFiber => f.write_str("the originating context can't suspend"),
    }
  }
}

#[cfg(feature="std")]
impl std::error::Error for FiberError {}

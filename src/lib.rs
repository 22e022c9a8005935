//! Cooperative fibers carved out of a single stack.
//!
//! A [`StackAllocator`] hands out disjoint regions below the running stack (or below any top you
//! give it), [`create`] primes a [`Fiber`] descriptor to start in one of them, and [`swap`] moves
//! the processor from one descriptor to another. There is no scheduler: every switch names its
//! target. [`FiberPool`] wraps the same operations behind handles.
#![cfg_attr(not(feature="std"), no_std)]

mod error;
pub mod fiber;
pub mod pool;
pub mod stack;
pub mod switch;

pub use error::FiberError;
pub use fiber::{create, restart, EntryFn, Fiber, ParkFn, State};
pub use pool::{FiberId, FiberPool};
pub use stack::{StackAllocator, DEFAULT_ORIGIN_STACK_SIZE};
pub use switch::{swap, suspend};

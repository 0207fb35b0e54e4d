//! The cooperative runtime: scheduler, timers, fibers, signal plumbing.
//!
//! - [`scheduler`]: the process-wide event loop
//! - [`timer`]: the deadline-ordered timer queue
//! - [`fiber`]: suspendable fibers and the [`FiberCx`] capability handle
//! - [`signal`]: OS signal watches (flag-polled, Unix only)

pub mod fiber;
pub mod scheduler;
pub mod signal;
pub mod timer;

pub use fiber::{in_fiber, yield_now, FiberCx, FiberId};
pub use scheduler::{Scheduler, MICROTASK_BATCH};
pub use timer::TimerId;

//! Fibra: a cooperative, cancel-correct async runtime on one logical thread.
//!
//! # Overview
//!
//! Fibra weaves together deferred I/O results, timeouts, retries, and
//! structured concurrency patterns without a reactor or a thread pool.
//! User code runs inside suspendable fibers interleaved with a microtask
//! queue and a timer queue; deferred values are promises with chainable
//! transformations; cancellation is a first-class protocol that
//! propagates through a token tree and releases its subscriptions on
//! settlement.
//!
//! # Core Guarantees
//!
//! - **One-shot settlement**: a promise settles exactly once; callback
//!   lists are drained in registration order and then cleared
//! - **Absorption, not wrapping**: resolving with a promise subscribes to
//!   it; values are never rewrapped
//! - **Cancel-correctness**: cancellation carries a reason, runs every
//!   subscriber exactly once, and reaches fibers at their next yield
//! - **No silent callback failures**: detached-callback errors and panics
//!   route to the background sink, never into loop state
//! - **Cooperative only**: a fiber that never yields cannot be stopped
//!   mid-burn; there is no preemption
//!
//! # Module Structure
//!
//! - [`error`]: the kinded error type, aggregates included
//! - [`promise`]: promise state, the promise engine, deferreds
//! - [`cancel`]: tokens, combined tokens, token sources
//! - [`runtime`]: scheduler, timer queue, fibers, signal watches
//! - [`combinator`]: all/race/any/allSettled, pool, sequence, retry,
//!   timeout, debounce, throttle
//! - [`facade`]: the [`Async`] static entry points
//! - [`sink`]: the background-error side channel

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]

pub mod cancel;
pub mod combinator;
pub mod error;
pub mod facade;
pub mod promise;
pub mod runtime;
pub mod sink;

#[cfg(test)]
pub(crate) mod test_utils;

pub use cancel::{CancelSource, CancelToken, Registration};
pub use combinator::{
    all, all_keyed, all_settled, any, debounce, delay, pool, race, retry, sequence, throttle,
    timeout, Debounced, Settlement, Task, Throttled,
};
pub use error::{Error, ErrorKind, Result};
pub use facade::Async;
pub use promise::{Deferred, Promise, PromiseState};
pub use runtime::{in_fiber, yield_now, FiberCx, FiberId, Scheduler, TimerId};

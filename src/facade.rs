//! The static entry-point surface.
//!
//! [`Async`] bundles the whole runtime behind associated functions so
//! application code can drive promises, fibers, timers, and token sources
//! without importing the individual modules. Everything here delegates to
//! the core; nothing lives only in the facade.

use std::time::Duration;

use crate::cancel::{CancelSource, CancelToken};
use crate::combinator::{self, Debounced, Settlement, Task, Throttled};
use crate::error::{Error, Result};
use crate::promise::Promise;
use crate::runtime::fiber::FiberCx;
use crate::runtime::scheduler::Scheduler;
use crate::runtime::timer::TimerId;

/// Default concurrency for [`Async::pool_default`].
pub const DEFAULT_POOL_CONCURRENCY: usize = 10;
/// Default attempt count for [`Async::retry_default`].
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
/// Default base delay for [`Async::retry_default`].
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(1_000);
/// Default delay cap for [`Async::retry_default`].
pub const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_millis(30_000);

/// Static entry points over the Fibra runtime.
pub struct Async;

impl Async {
    // === Fibers ===

    /// Runs `body` in a fiber, optionally governed by `token`; the
    /// returned promise settles from the body's result.
    pub fn run<T, F>(body: F, token: Option<CancelToken>) -> Promise<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce(&FiberCx) -> Result<T> + Send + 'static,
    {
        Scheduler::global().spawn(body, token)
    }

    /// Returns true: this build hosts suspendable fibers.
    #[must_use]
    pub const fn supports_fibers() -> bool {
        true
    }

    // === Promises ===

    /// Wraps a plain value in an already fulfilled promise. Existing
    /// promises are never rewrapped; clone the handle instead.
    #[must_use]
    pub fn resolve<T: Clone + Send + 'static>(value: T) -> Promise<T> {
        Promise::fulfilled(value)
    }

    /// Returns an already rejected promise.
    #[must_use]
    pub fn reject<T: Clone + Send + 'static>(error: Error) -> Promise<T> {
        Promise::rejected(error)
    }

    /// Returns a promise fulfilled with `value` after `ms` milliseconds.
    #[must_use]
    pub fn delay<T: Clone + Send + 'static>(ms: u64, value: T) -> Promise<T> {
        combinator::delay(ms, value)
    }

    // === Combinators ===

    /// See [`combinator::all`].
    #[must_use]
    pub fn all<T: Clone + Send + 'static>(promises: Vec<Promise<T>>) -> Promise<Vec<T>> {
        combinator::all(promises)
    }

    /// See [`combinator::all_keyed`].
    #[must_use]
    pub fn all_keyed<K, T>(entries: Vec<(K, Promise<T>)>) -> Promise<Vec<(K, T)>>
    where
        K: Clone + Send + 'static,
        T: Clone + Send + 'static,
    {
        combinator::all_keyed(entries)
    }

    /// See [`combinator::race`].
    pub fn race<T: Clone + Send + 'static>(promises: Vec<Promise<T>>) -> Result<Promise<T>> {
        combinator::race(promises)
    }

    /// See [`combinator::any`].
    pub fn any<T: Clone + Send + 'static>(promises: Vec<Promise<T>>) -> Result<Promise<T>> {
        combinator::any(promises)
    }

    /// See [`combinator::all_settled`].
    #[must_use]
    pub fn all_settled<T: Clone + Send + 'static>(
        promises: Vec<Promise<T>>,
    ) -> Promise<Vec<Settlement<T>>> {
        combinator::all_settled(promises)
    }

    /// See [`combinator::timeout`].
    pub fn timeout<T, F>(body: F, ms: u64) -> Result<Promise<T>>
    where
        T: Clone + Send + 'static,
        F: FnOnce(&FiberCx) -> Result<T> + Send + 'static,
    {
        combinator::timeout(body, ms)
    }

    /// See [`combinator::pool`].
    pub fn pool<T: Clone + Send + 'static>(
        tasks: Vec<Task<T>>,
        concurrency: usize,
    ) -> Result<Promise<Vec<T>>> {
        combinator::pool(tasks, concurrency)
    }

    /// [`combinator::pool`] with [`DEFAULT_POOL_CONCURRENCY`].
    pub fn pool_default<T: Clone + Send + 'static>(
        tasks: Vec<Task<T>>,
    ) -> Result<Promise<Vec<T>>> {
        combinator::pool(tasks, DEFAULT_POOL_CONCURRENCY)
    }

    /// See [`combinator::sequence`].
    #[must_use]
    pub fn sequence<T: Clone + Send + 'static>(tasks: Vec<Task<T>>) -> Promise<Vec<T>> {
        combinator::sequence(tasks)
    }

    /// See [`combinator::retry`].
    pub fn retry<T, F>(
        op: F,
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
    ) -> Result<Promise<T>>
    where
        T: Clone + Send + 'static,
        F: FnMut() -> Promise<T> + Send + 'static,
    {
        combinator::retry(op, max_attempts, base_delay, max_delay)
    }

    /// [`combinator::retry`] with the default policy (3 attempts, 1 s
    /// base delay, 30 s cap).
    pub fn retry_default<T, F>(op: F) -> Result<Promise<T>>
    where
        T: Clone + Send + 'static,
        F: FnMut() -> Promise<T> + Send + 'static,
    {
        combinator::retry(
            op,
            DEFAULT_RETRY_ATTEMPTS,
            DEFAULT_RETRY_BASE_DELAY,
            DEFAULT_RETRY_MAX_DELAY,
        )
    }

    /// See [`combinator::debounce`].
    pub fn debounce<T, F>(op: F, delay_ms: u64) -> Debounced<T>
    where
        T: Clone + Send + 'static,
        F: FnMut() -> Promise<T> + Send + 'static,
    {
        combinator::debounce(op, delay_ms)
    }

    /// See [`combinator::throttle`].
    pub fn throttle<T, F>(op: F, interval_ms: u64) -> Throttled<T>
    where
        T: Clone + Send + 'static,
        F: FnMut() -> Promise<T> + Send + 'static,
    {
        combinator::throttle(op, interval_ms)
    }

    // === Scheduler ===

    /// Enqueues a microtask.
    pub fn schedule(task: impl FnOnce() + Send + 'static) {
        Scheduler::global().schedule(task);
    }

    /// Schedules a one-shot timer.
    pub fn set_timeout(callback: impl FnOnce() + Send + 'static, ms: u64) -> TimerId {
        Scheduler::global().set_timeout(callback, ms)
    }

    /// Schedules a repeating timer.
    pub fn set_interval(callback: impl FnMut() + Send + 'static, ms: u64) -> TimerId {
        Scheduler::global().set_interval(callback, ms)
    }

    /// Cancels a timer by id.
    pub fn clear_timer(id: TimerId) {
        Scheduler::global().clear_timer(id);
    }

    /// Marks the event loop started; [`Async::wait`] then idles at
    /// quiescence instead of returning.
    pub fn start_event_loop() {
        Scheduler::global().start();
    }

    /// Drives the event loop (see [`Scheduler::run`]).
    pub fn wait() {
        Scheduler::global().run();
    }

    /// Suspends the current fiber; no-op outside a fiber.
    pub fn yield_now() -> Result<()> {
        crate::runtime::yield_now()
    }

    /// Stops a started event loop.
    pub fn stop_event_loop() {
        Scheduler::global().stop();
    }

    /// Process-shutdown hook: flush one tick, then stop.
    pub fn shutdown() {
        Scheduler::global().shutdown();
    }

    /// Monotonic milliseconds since the scheduler epoch.
    #[must_use]
    pub fn current_time() -> f64 {
        Scheduler::global().current_time_ms()
    }

    // === Cancellation ===

    /// Creates a source over a fresh cancellable token.
    #[must_use]
    pub fn cancellation_source() -> CancelSource {
        CancelSource::new()
    }

    /// Creates a source whose token cancels after `ms` milliseconds.
    pub fn timeout_source(ms: u64) -> Result<CancelSource> {
        CancelSource::with_timeout(ms)
    }

    /// Creates a source over a token that can never be cancelled.
    #[must_use]
    pub fn never_source() -> CancelSource {
        CancelSource::never()
    }

    /// Creates a source whose token cancels on the OS signal `sig`.
    #[must_use]
    pub fn signal_source(sig: i32) -> CancelSource {
        CancelSource::with_signal(sig)
    }

    /// Creates a source over a fan-in token combining `tokens`.
    #[must_use]
    pub fn combine_tokens(tokens: &[CancelToken]) -> CancelSource {
        CancelSource::combined(tokens)
    }

    /// Returns true if this build can hook OS signals.
    #[must_use]
    pub fn supports_signals() -> bool {
        Scheduler::global().supports_signals()
    }
}

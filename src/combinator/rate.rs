//! Call-rate shaping: debounce and throttle.
//!
//! Both wrap a promise-producing operation behind a callable handle and
//! shape when the operation actually runs, using the scheduler's timers
//! and monotonic clock.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::promise::Promise;
use crate::runtime::scheduler::Scheduler;
use crate::runtime::timer::TimerId;

type OpFn<T> = Box<dyn FnMut() -> Promise<T> + Send>;

/// A debounced operation handle returned by [`debounce`].
///
/// Each [`Debounced::call`] cancels the pending timer and re-arms it for
/// the full delay; when the timer finally fires, the operation runs and
/// its settlement is forwarded to the promise returned by *that* call.
/// Promises returned by superseded calls stay pending forever.
pub struct Debounced<T> {
    op: Arc<Mutex<OpFn<T>>>,
    pending: Arc<Mutex<Option<TimerId>>>,
    delay_ms: u64,
}

/// Wraps `op` so that only the last call in a burst actually runs, after
/// `delay_ms` milliseconds of quiet.
pub fn debounce<T, F>(op: F, delay_ms: u64) -> Debounced<T>
where
    T: Clone + Send + 'static,
    F: FnMut() -> Promise<T> + Send + 'static,
{
    Debounced {
        op: Arc::new(Mutex::new(Box::new(op))),
        pending: Arc::new(Mutex::new(None)),
        delay_ms,
    }
}

impl<T: Clone + Send + 'static> Debounced<T> {
    /// Schedules the operation for `delay_ms` from now, superseding any
    /// previously scheduled run.
    pub fn call(&self) -> Promise<T> {
        let out: Promise<T> = Promise::pending();
        let scheduler = Scheduler::global();
        let mut pending = self.pending.lock();
        if let Some(id) = pending.take() {
            scheduler.clear_timer(id);
        }
        let op = Arc::clone(&self.op);
        let slot = Arc::clone(&self.pending);
        let target = out.clone();
        let id = scheduler.set_timeout(
            move || {
                *slot.lock() = None;
                let promise = (&mut *op.lock())();
                promise.pipe(&target);
            },
            self.delay_ms,
        );
        *pending = Some(id);
        out
    }
}

/// A throttled operation handle returned by [`throttle`].
///
/// The first call (and any call arriving after a full quiet interval)
/// runs immediately. Other calls advance a virtual last-execution time by
/// one interval each and queue for the residual, so queued calls are
/// serialized in arrival order.
pub struct Throttled<T> {
    op: Arc<Mutex<OpFn<T>>>,
    virtual_last: Arc<Mutex<Option<f64>>>,
    interval_ms: u64,
}

/// Wraps `op` so it runs at most once per `interval_ms` milliseconds.
pub fn throttle<T, F>(op: F, interval_ms: u64) -> Throttled<T>
where
    T: Clone + Send + 'static,
    F: FnMut() -> Promise<T> + Send + 'static,
{
    Throttled {
        op: Arc::new(Mutex::new(Box::new(op))),
        virtual_last: Arc::new(Mutex::new(None)),
        interval_ms,
    }
}

impl<T: Clone + Send + 'static> Throttled<T> {
    /// Runs the operation now if the interval has elapsed, otherwise
    /// queues it for its slot in the serialized schedule.
    pub fn call(&self) -> Promise<T> {
        let scheduler = Scheduler::global();
        let now = scheduler.current_time_ms();
        let interval = self.interval_ms as f64;
        let mut last = self.virtual_last.lock();
        match *last {
            Some(previous) if now - previous < interval => {
                let scheduled = previous + interval;
                *last = Some(scheduled);
                drop(last);
                let residual_ms = (scheduled - now).max(0.0).ceil() as u64;
                let out: Promise<T> = Promise::pending();
                let op = Arc::clone(&self.op);
                let target = out.clone();
                scheduler.set_timeout(
                    move || {
                        (&mut *op.lock())().pipe(&target);
                    },
                    residual_ms,
                );
                out
            }
            _ => {
                *last = Some(now);
                drop(last);
                (&mut *self.op.lock())()
            }
        }
    }
}

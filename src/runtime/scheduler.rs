//! The cooperative scheduler: microtask queue, timer scan, fiber stepping.
//!
//! One scheduler exists per process (see [`Scheduler::global`]); tests
//! serialize access and call [`Scheduler::reset`] between cases. The
//! scheduler never holds its state lock while user code runs: each tick
//! phase collects work under the lock, releases it, then dispatches with
//! panic isolation to the background sink.
//!
//! # Tick order
//!
//! 1. Poll armed signal flags and cancel their tokens.
//! 2. Fire due timers, ascending deadline, ties by id.
//! 3. Drain up to [`MICROTASK_BATCH`] microtasks (FIFO; the rest carry
//!    over, which bounds starvation from microtask loops).
//! 4. Step every live fiber: start it if never started, resume it if
//!    suspended.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_queue::SegQueue;
use parking_lot::Mutex;

use super::fiber::{self, FiberCtrl, FiberCx, FiberId};
use super::signal::SignalWatch;
use super::timer::{TimerId, TimerQueue};
use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::promise::Promise;
use crate::sink;

/// Maximum microtasks drained per tick; the remainder carries over.
pub const MICROTASK_BATCH: usize = 100;

type Microtask = Box<dyn FnOnce() + Send>;

struct SchedState {
    epoch: Instant,
    timers: TimerQueue,
    fibers: Vec<std::sync::Arc<FiberCtrl>>,
    watches: Vec<SignalWatch>,
    next_fiber_id: u64,
    running: bool,
    loop_started: bool,
}

impl SchedState {
    fn fresh() -> Self {
        Self {
            epoch: Instant::now(),
            timers: TimerQueue::new(),
            fibers: Vec::new(),
            watches: Vec::new(),
            next_fiber_id: 0,
            running: false,
            loop_started: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct TickStats {
    timers_fired: usize,
    microtasks_run: usize,
}

impl TickStats {
    const fn idle(self) -> bool {
        self.timers_fired == 0 && self.microtasks_run == 0
    }
}

/// The cooperative event loop.
pub struct Scheduler {
    microtasks: SegQueue<Microtask>,
    state: Mutex<SchedState>,
}

impl Scheduler {
    fn new() -> Self {
        Self {
            microtasks: SegQueue::new(),
            state: Mutex::new(SchedState::fresh()),
        }
    }

    /// Returns the process-wide scheduler instance.
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<Scheduler> = OnceLock::new();
        GLOBAL.get_or_init(Self::new)
    }

    // === Time ===

    /// Monotonic time since the scheduler epoch.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.state.lock().epoch.elapsed()
    }

    /// Monotonic time since the scheduler epoch, in milliseconds.
    #[must_use]
    pub fn current_time_ms(&self) -> f64 {
        self.now().as_secs_f64() * 1_000.0
    }

    // === Microtasks ===

    /// Enqueues a microtask; FIFO order with respect to other microtasks.
    pub fn schedule(&self, task: impl FnOnce() + Send + 'static) {
        self.microtasks.push(Box::new(task));
    }

    // === Timers ===

    /// Schedules a one-shot callback after `ms` milliseconds.
    pub fn set_timeout(&self, callback: impl FnOnce() + Send + 'static, ms: u64) -> TimerId {
        let mut slot = Some(callback);
        let wrapped = Box::new(move || {
            if let Some(f) = slot.take() {
                f();
            }
        });
        let mut state = self.state.lock();
        let deadline = state.epoch.elapsed() + Duration::from_millis(ms);
        state.timers.insert(wrapped, deadline, None)
    }

    /// Schedules a repeating callback every `ms` milliseconds (minimum 1,
    /// so an interval always makes forward progress). Re-arming is
    /// drift-tolerant: the next deadline is measured from the firing scan.
    pub fn set_interval(&self, callback: impl FnMut() + Send + 'static, ms: u64) -> TimerId {
        let interval = Duration::from_millis(ms.max(1));
        let mut state = self.state.lock();
        let deadline = state.epoch.elapsed() + interval;
        state
            .timers
            .insert(Box::new(callback), deadline, Some(interval))
    }

    /// Cancels a timer by id. Unknown ids are ignored.
    pub fn clear_timer(&self, id: TimerId) {
        self.state.lock().timers.cancel(id);
    }

    // === Fibers ===

    /// Launches a fiber running `body`, optionally governed by `token`.
    ///
    /// With an already-cancelled token the fiber is never created and an
    /// already-rejected promise is returned. The fiber starts at the next
    /// tick; its promise settles from the body's result.
    pub fn spawn<T, F>(&self, body: F, token: Option<CancelToken>) -> Promise<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce(&FiberCx) -> Result<T> + Send + 'static,
    {
        let token = token.unwrap_or_else(CancelToken::never);
        if token.is_cancellation_requested() {
            return Promise::rejected(
                token
                    .reason()
                    .map_or_else(Error::cancelled_default, Error::cancelled),
            );
        }
        let id = {
            let mut state = self.state.lock();
            let id = FiberId(state.next_fiber_id);
            state.next_fiber_id += 1;
            id
        };
        tracing::trace!(fiber = id.0, "spawning fiber");
        let (ctrl, promise) = fiber::launch(id, body, token);
        self.state.lock().fibers.push(ctrl);
        promise
    }

    // === Signal watches ===

    pub(crate) fn add_signal_watch(&self, watch: SignalWatch) {
        self.state.lock().watches.push(watch);
    }

    /// Returns true if this build can hook OS signals.
    #[must_use]
    pub fn supports_signals(&self) -> bool {
        super::signal::supported()
    }

    // === Tick ===

    /// Runs one scheduler tick: signals, timers, microtasks, fibers.
    pub fn tick(&self) {
        let _ = self.tick_inner();
    }

    fn tick_inner(&self) -> TickStats {
        self.poll_signals();
        let timers_fired = self.fire_due_timers();
        let microtasks_run = self.drain_microtasks();
        self.step_fibers();
        TickStats {
            timers_fired,
            microtasks_run,
        }
    }

    fn poll_signals(&self) {
        let fired: Vec<SignalWatch> = {
            let mut state = self.state.lock();
            if state.watches.is_empty() {
                return;
            }
            let mut fired = Vec::new();
            let mut kept = Vec::with_capacity(state.watches.len());
            for watch in state.watches.drain(..) {
                if watch.flag.swap(false, Ordering::SeqCst)
                    || watch.token.is_cancellation_requested()
                {
                    fired.push(watch);
                } else {
                    kept.push(watch);
                }
            }
            state.watches = kept;
            fired
        };
        for watch in fired {
            tracing::debug!(sig = watch.sig, "signal flag observed");
            watch.token.cancel(Some(format!("Received signal {}", watch.sig)));
            watch.unhook();
        }
    }

    fn fire_due_timers(&self) -> usize {
        let due = {
            let mut state = self.state.lock();
            let now = state.epoch.elapsed();
            state.timers.pop_due(now)
        };
        let fired = due.len();
        for timer in due {
            let mut callback = timer.callback;
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback())) {
                sink::report_panic("timer callback", payload.as_ref());
            }
            if let Some(interval) = timer.interval {
                let mut state = self.state.lock();
                let deadline = state.epoch.elapsed() + interval;
                state.timers.restore_interval(timer.id, callback, deadline);
            }
        }
        fired
    }

    fn drain_microtasks(&self) -> usize {
        let mut run = 0;
        while run < MICROTASK_BATCH {
            let Some(task) = self.microtasks.pop() else {
                break;
            };
            run += 1;
            if let Err(payload) = catch_unwind(AssertUnwindSafe(task)) {
                sink::report_panic("microtask", payload.as_ref());
            }
        }
        run
    }

    fn step_fibers(&self) {
        let fibers: Vec<std::sync::Arc<FiberCtrl>> = self.state.lock().fibers.clone();
        for fiber in &fibers {
            fiber.step();
        }
        if !fibers.is_empty() {
            let mut state = self.state.lock();
            state.fibers.retain(|f| !f.is_terminated());
        }
    }

    // === Loop driving ===

    /// Returns true while any microtask, timer, or live fiber remains.
    ///
    /// Armed signal watches do not count: a signal may never arrive, and
    /// a watch alone must not keep [`Scheduler::run`] from returning.
    #[must_use]
    pub fn has_pending_work(&self) -> bool {
        if !self.microtasks.is_empty() {
            return true;
        }
        let state = self.state.lock();
        state.timers.active_len() > 0 || state.fibers.iter().any(|f| !f.is_terminated())
    }

    /// Drives ticks until no pending work remains.
    ///
    /// Idle polls (a tick that fired no timer and ran no microtask) sleep
    /// one millisecond to avoid busy-spinning on future deadlines. While
    /// the loop is started ([`Scheduler::start`]), quiescence idles
    /// instead of returning, until [`Scheduler::stop`]. A nested call on
    /// the driver thread returns immediately; a call from a fiber thread
    /// performs a single cooperative yield instead (the loop is already
    /// being driven underneath it).
    pub fn run(&self) {
        if fiber::in_fiber() {
            let _ = fiber::yield_now();
            return;
        }
        {
            let mut state = self.state.lock();
            if state.running {
                return;
            }
            state.running = true;
        }
        loop {
            let stats = self.tick_inner();
            if self.has_pending_work() {
                if stats.idle() {
                    thread::sleep(Duration::from_millis(1));
                }
                continue;
            }
            if !self.state.lock().loop_started {
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
        self.state.lock().running = false;
    }

    /// Marks the loop as started: [`Scheduler::run`] idles at quiescence
    /// instead of returning.
    pub fn start(&self) {
        self.state.lock().loop_started = true;
    }

    /// Clears the started flag; a running [`Scheduler::run`] observes
    /// termination at its next idle check.
    pub fn stop(&self) {
        self.state.lock().loop_started = false;
    }

    /// Process-shutdown hook: flush one tick, then stop the loop.
    pub fn shutdown(&self) {
        self.tick();
        self.stop();
    }

    // === Test support ===

    /// Restores the scheduler to a fresh state.
    ///
    /// Live fibers are cancelled and drained (bounded; an uncooperative
    /// fiber is abandoned), timers/microtasks/watches are dropped, and the
    /// epoch is re-armed. Intended for tests.
    pub fn reset(&self) {
        let fibers = std::mem::take(&mut self.state.lock().fibers);
        for fiber in fibers {
            let mut attempts = 0;
            while !fiber.is_terminated() && attempts < 1024 {
                fiber.request_cancel(Error::cancelled("scheduler reset"));
                fiber.step();
                attempts += 1;
            }
            if !fiber.is_terminated() {
                tracing::warn!(fiber = fiber.id().0, "abandoning uncooperative fiber on reset");
            }
        }
        while self.microtasks.pop().is_some() {}
        let watches = {
            let mut state = self.state.lock();
            state.timers.clear();
            state.running = false;
            state.loop_started = false;
            state.epoch = Instant::now();
            std::mem::take(&mut state.watches)
        };
        for watch in watches {
            watch.unhook();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{init_test_logging, scheduler_guard};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn microtasks_run_in_fifo_order() {
        init_test_logging();
        let _guard = scheduler_guard();
        let scheduler = Scheduler::global();

        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let order = Arc::clone(&order);
            scheduler.schedule(move || order.lock().push(i));
        }
        scheduler.tick();
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
        assert!(!scheduler.has_pending_work());
    }

    #[test]
    fn microtask_drain_is_bounded_per_tick() {
        init_test_logging();
        let _guard = scheduler_guard();
        let scheduler = Scheduler::global();

        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..(MICROTASK_BATCH + 7) {
            let count = Arc::clone(&count);
            scheduler.schedule(move || {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }
        scheduler.tick();
        assert_eq!(count.load(Ordering::SeqCst), MICROTASK_BATCH);
        assert!(scheduler.has_pending_work());
        scheduler.tick();
        assert_eq!(count.load(Ordering::SeqCst), MICROTASK_BATCH + 7);
    }

    #[test]
    fn timers_fire_in_deadline_order() {
        init_test_logging();
        let _guard = scheduler_guard();
        let scheduler = Scheduler::global();

        let order = Arc::new(Mutex::new(Vec::new()));
        for (label, ms) in [(200u64, 20u64), (100, 10), (300, 30)] {
            let order = Arc::clone(&order);
            scheduler.set_timeout(move || order.lock().push(label), ms);
        }
        scheduler.run();
        assert_eq!(*order.lock(), vec![100, 200, 300]);
    }

    #[test]
    fn cleared_timer_never_fires() {
        init_test_logging();
        let _guard = scheduler_guard();
        let scheduler = Scheduler::global();

        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = Arc::clone(&fired);
        let id = scheduler.set_timeout(
            move || {
                fired2.fetch_add(1, Ordering::SeqCst);
            },
            5,
        );
        scheduler.clear_timer(id);
        scheduler.run();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn interval_refires_until_cleared() {
        init_test_logging();
        let _guard = scheduler_guard();
        let scheduler = Scheduler::global();

        let count = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::clone(&count);
        let id_cell: Arc<Mutex<Option<TimerId>>> = Arc::new(Mutex::new(None));
        let id_cell2 = Arc::clone(&id_cell);
        let id = scheduler.set_interval(
            move || {
                let n = count2.fetch_add(1, Ordering::SeqCst) + 1;
                if n >= 3 {
                    if let Some(id) = *id_cell2.lock() {
                        Scheduler::global().clear_timer(id);
                    }
                }
            },
            2,
        );
        *id_cell.lock() = Some(id);
        scheduler.run();
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(!scheduler.has_pending_work());
    }

    #[test]
    fn panicking_callbacks_do_not_wedge_the_loop() {
        init_test_logging();
        let _guard = scheduler_guard();
        let scheduler = Scheduler::global();

        let after = Arc::new(AtomicUsize::new(0));
        scheduler.schedule(|| panic!("microtask exploded"));
        let after2 = Arc::clone(&after);
        scheduler.schedule(move || {
            after2.fetch_add(1, Ordering::SeqCst);
        });
        scheduler.set_timeout(|| panic!("timer exploded"), 1);
        scheduler.run();
        assert_eq!(after.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn current_time_is_monotonic() {
        init_test_logging();
        let _guard = scheduler_guard();
        let scheduler = Scheduler::global();

        let t1 = scheduler.current_time_ms();
        std::thread::sleep(Duration::from_millis(2));
        let t2 = scheduler.current_time_ms();
        assert!(t2 > t1);
    }

    #[test]
    fn start_and_stop_gate_loop_exit() {
        init_test_logging();
        let _guard = scheduler_guard();
        let scheduler = Scheduler::global();

        scheduler.start();
        // stop from within the loop so run() can return
        scheduler.set_timeout(|| Scheduler::global().stop(), 5);
        scheduler.run();
        assert!(!scheduler.has_pending_work());
    }
}

//! Shared helpers for unit tests.
//!
//! - Consistent tracing-based logging initialization
//! - A process-wide lock serializing tests that touch the singleton
//!   scheduler, resetting it on acquisition

use std::sync::{Mutex, MutexGuard, Once, PoisonError};

static INIT_LOGGING: Once = Once::new();
static SCHED_LOCK: Mutex<()> = Mutex::new(());

/// Initialize test logging with trace-level output.
///
/// Safe to call multiple times; only initializes once.
pub(crate) fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .with_target(true)
            .with_ansi(false)
            .try_init();
    });
}

/// Acquire the scheduler lock and reset the singleton to a fresh state.
///
/// Every test that schedules work must hold this guard for its whole
/// body; `cargo test` runs tests on parallel threads and the scheduler is
/// process-wide.
pub(crate) fn scheduler_guard() -> MutexGuard<'static, ()> {
    let guard = SCHED_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    crate::runtime::scheduler::Scheduler::global().reset();
    guard
}

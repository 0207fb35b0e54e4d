//! Shared helpers for the conformance and e2e suites.

use std::sync::{Mutex, MutexGuard, Once, PoisonError};

use fibra::Scheduler;

static INIT_LOGGING: Once = Once::new();
static SCHED_LOCK: Mutex<()> = Mutex::new(());

/// Initialize test logging once per test binary.
pub fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .with_ansi(false)
            .try_init();
    });
}

/// Serialize access to the process-wide scheduler and reset it.
///
/// Hold the returned guard for the whole test body.
pub fn guard() -> MutexGuard<'static, ()> {
    init_logging();
    let guard = SCHED_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    Scheduler::global().reset();
    guard
}

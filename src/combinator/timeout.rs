//! Deadline combinators: timeout and delay.
//!
//! A timeout is just a token source that auto-cancels on a scheduled
//! delay; the body runs in a fiber governed by that token and observes
//! the deadline cooperatively.

use crate::cancel::CancelSource;
use crate::error::{Error, Result};
use crate::promise::Promise;
use crate::runtime::fiber::FiberCx;
use crate::runtime::scheduler::Scheduler;

/// Runs `body` in a fiber under a token that cancels after `ms`
/// milliseconds. Cancellation surfaces as a rejection with
/// "Timeout of {ms} milliseconds exceeded".
///
/// Fails synchronously with [`crate::ErrorKind::InvalidArgument`] when
/// `ms` is zero.
pub fn timeout<T, F>(body: F, ms: u64) -> Result<Promise<T>>
where
    T: Clone + Send + 'static,
    F: FnOnce(&FiberCx) -> Result<T> + Send + 'static,
{
    if ms == 0 {
        return Err(Error::invalid_argument(
            "timeout must be greater than zero milliseconds",
        ));
    }
    let source = CancelSource::with_timeout(ms)?;
    let token = source.token()?;
    Ok(Scheduler::global().spawn(body, Some(token)))
}

/// Returns a promise fulfilled with `value` after `ms` milliseconds.
///
/// The promise carries a canceller: cancelling it clears the underlying
/// timer and rejects with the standard cancellation error.
pub fn delay<T: Clone + Send + 'static>(ms: u64, value: T) -> Promise<T> {
    let out: Promise<T> = Promise::pending();
    let target = out.clone();
    let id = Scheduler::global().set_timeout(move || target.complete_value(value), ms);
    out.set_canceller(move || {
        Scheduler::global().clear_timer(id);
        Ok(())
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_utils::{init_test_logging, scheduler_guard};

    #[test]
    fn zero_timeout_is_invalid() {
        let err = timeout(|_| Ok(1), 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn delay_resolves_after_the_deadline() {
        init_test_logging();
        let _guard = scheduler_guard();

        let p = delay(5, "done");
        assert!(p.is_pending());
        assert_eq!(p.wait().unwrap(), "done");
    }

    #[test]
    fn cancelled_delay_clears_its_timer() {
        init_test_logging();
        let _guard = scheduler_guard();
        let scheduler = Scheduler::global();

        let p = delay(5, ());
        p.cancel();
        assert!(p.reason().unwrap().is_cancelled());
        // the timer was cleared, so the loop has nothing left to do
        scheduler.run();
        assert!(!scheduler.has_pending_work());
    }

    #[test]
    fn timeout_cancels_a_slow_body() {
        init_test_logging();
        let _guard = scheduler_guard();

        let result: Promise<i32> = timeout(
            |cx| {
                loop {
                    cx.checkpoint()?;
                    cx.yield_now()?;
                }
            },
            10,
        )
        .unwrap();
        let reason = result.wait().unwrap_err();
        assert!(reason.is_cancelled());
        assert_eq!(reason.message(), "Timeout of 10 milliseconds exceeded");
    }

    #[test]
    fn fast_body_beats_the_timeout() {
        init_test_logging();
        let _guard = scheduler_guard();

        let result = timeout(|_| Ok(42), 1_000).unwrap();
        assert_eq!(result.wait().unwrap(), 42);
    }
}

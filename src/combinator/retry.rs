//! Retry combinator with exponential backoff.
//!
//! The operation runs inside a fiber so the delays between attempts are
//! cooperative sleeps, not blocking ones. Cancellation is respected
//! between attempts and during sleeps; an in-flight attempt is never
//! force-stopped. The final rejection surfaces the last underlying error.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::promise::Promise;
use crate::runtime::scheduler::Scheduler;

/// Runs `op` until it fulfills or `max_attempts` attempts have failed.
///
/// The delay before attempt `n` (n ≥ 2) is
/// `min(base_delay × 2^(n−2), max_delay)`: attempt 2 waits `base_delay`,
/// attempt 3 twice that, and so on.
///
/// Fails synchronously with [`crate::ErrorKind::InvalidArgument`] when
/// `max_attempts` is zero.
pub fn retry<T, F>(
    mut op: F,
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
) -> Result<Promise<T>>
where
    T: Clone + Send + 'static,
    F: FnMut() -> Promise<T> + Send + 'static,
{
    if max_attempts == 0 {
        return Err(Error::invalid_argument(
            "retry requires at least one attempt",
        ));
    }
    Ok(Scheduler::global().spawn(
        move |cx| {
            let mut attempt = 0u32;
            loop {
                attempt += 1;
                let outcome = {
                    let in_flight = op();
                    cx.wait(&in_flight)
                };
                match outcome {
                    Ok(value) => return Ok(value),
                    Err(error) => {
                        if attempt >= max_attempts {
                            return Err(error);
                        }
                        tracing::debug!(attempt, error = %error, "retrying after failure");
                        let delay = backoff_delay(base_delay, max_delay, attempt);
                        if delay.is_zero() {
                            cx.yield_now()?;
                        } else {
                            cx.sleep(delay.as_millis() as u64)?;
                        }
                    }
                }
            }
        },
        None,
    ))
}

/// Backoff after `failed_attempts` failures: `base × 2^(failed−1)`,
/// capped at `max`.
fn backoff_delay(base: Duration, max: Duration, failed_attempts: u32) -> Duration {
    let shift = failed_attempts.saturating_sub(1).min(31);
    base.saturating_mul(1u32 << shift).min(max)
}

//! Bounded-concurrency task execution: pool and sequence.
//!
//! Tasks are thunks producing promises, so a queued task does no work
//! until the pool launches it. Launches hop through the microtask queue,
//! which bounds recursion depth when tasks settle synchronously.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::promise::Promise;
use crate::runtime::scheduler::Scheduler;

/// A deferred unit of work for [`pool`] and [`sequence`].
pub type Task<T> = Box<dyn FnOnce() -> Promise<T> + Send>;

struct PoolState<T> {
    queue: VecDeque<(usize, Task<T>)>,
    results: Vec<Option<T>>,
    remaining: usize,
    rejected: bool,
    short_circuit: bool,
}

/// Runs up to `concurrency` tasks at a time; as each settles, the next
/// queued task starts. Fulfills with results in task order.
///
/// The first rejection rejects the pool result. Tasks already in flight
/// continue to run and queued tasks still launch; their results are
/// discarded and no cancellation is propagated to them.
///
/// Fails synchronously with [`crate::ErrorKind::InvalidArgument`] when
/// `concurrency` is zero.
pub fn pool<T: Clone + Send + 'static>(
    tasks: Vec<Task<T>>,
    concurrency: usize,
) -> Result<Promise<Vec<T>>> {
    if concurrency == 0 {
        return Err(Error::invalid_argument(
            "pool concurrency must be greater than zero",
        ));
    }
    Ok(run_tasks(tasks, concurrency, false))
}

/// Runs tasks one at a time, in order. The first rejection short-circuits:
/// queued tasks are never launched.
pub fn sequence<T: Clone + Send + 'static>(tasks: Vec<Task<T>>) -> Promise<Vec<T>> {
    run_tasks(tasks, 1, true)
}

fn run_tasks<T: Clone + Send + 'static>(
    tasks: Vec<Task<T>>,
    concurrency: usize,
    short_circuit: bool,
) -> Promise<Vec<T>> {
    if tasks.is_empty() {
        return Promise::fulfilled(Vec::new());
    }
    let total = tasks.len();
    let out: Promise<Vec<T>> = Promise::pending();
    let state = Arc::new(Mutex::new(PoolState {
        queue: tasks.into_iter().enumerate().collect(),
        results: (0..total).map(|_| None).collect(),
        remaining: total,
        rejected: false,
        short_circuit,
    }));
    for _ in 0..concurrency.min(total) {
        launch_next(&state, &out);
    }
    out
}

fn launch_next<T: Clone + Send + 'static>(
    state: &Arc<Mutex<PoolState<T>>>,
    out: &Promise<Vec<T>>,
) {
    let Some((index, task)) = state.lock().queue.pop_front() else {
        return;
    };
    let state = Arc::clone(state);
    let out = out.clone();
    Scheduler::global().schedule(move || {
        let promise = task();
        let fulfill_state = Arc::clone(&state);
        let fulfill_out = out.clone();
        promise.subscribe(
            Some(Box::new(move |value| {
                let finished = {
                    let mut st = fulfill_state.lock();
                    st.results[index] = Some(value);
                    st.remaining -= 1;
                    st.remaining == 0 && !st.rejected
                };
                if finished {
                    let collected: Vec<T> = fulfill_state
                        .lock()
                        .results
                        .iter_mut()
                        .map(|slot| slot.take().expect("pool: every slot filled"))
                        .collect();
                    fulfill_out.complete_value(collected);
                } else {
                    launch_next(&fulfill_state, &fulfill_out);
                }
            })),
            Some(Box::new(move |error| {
                {
                    let mut st = state.lock();
                    st.rejected = true;
                    st.remaining -= 1;
                    if st.short_circuit {
                        st.queue.clear();
                    }
                }
                out.complete_error(error);
                launch_next(&state, &out);
            })),
        );
    });
}

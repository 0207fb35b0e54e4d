//! Suspendable fibers with strict scheduler hand-off.
//!
//! A fiber is a user-level execution context backed by an OS thread and a
//! pair of zero-capacity rendezvous channels. The scheduler resumes a
//! fiber by sending on its resume channel and then blocks until the fiber
//! either suspends or completes, so exactly one logical thread of control
//! exists at any instant. There is no preemption: a fiber that never
//! yields cannot be cancelled mid-burn.
//!
//! Fiber bodies receive a [`FiberCx`] capability handle. All effects a
//! body needs (cancellation polling, suspension, driving nested promises)
//! flow through it; [`yield_now`] is also exposed as a free function that
//! degrades to a no-op outside a fiber.

use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::promise::Promise;
use crate::sink;

/// Identifier for a fiber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FiberId(pub(crate) u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FiberPhase {
    Created,
    Running,
    Suspended,
    Terminated,
}

enum ResumeSignal {
    Continue,
    Cancel(Error),
}

enum FiberEvent {
    Suspended,
    Completed,
}

struct FiberChannels {
    event_tx: SyncSender<FiberEvent>,
    resume_rx: Receiver<ResumeSignal>,
}

thread_local! {
    static CURRENT: RefCell<Option<FiberChannels>> = const { RefCell::new(None) };
}

/// Returns true when called from a fiber thread.
#[must_use]
pub fn in_fiber() -> bool {
    CURRENT.with(|cell| cell.borrow().is_some())
}

/// Suspends the current fiber back to the scheduler.
///
/// This is the sole cooperative suspension point. Outside a fiber it is a
/// no-op. A pending cancellation is delivered here: the suspended fiber is
/// resumed with the cancellation error, which this function returns.
pub fn yield_now() -> Result<()> {
    CURRENT.with(|cell| {
        let guard = cell.borrow();
        let Some(channels) = guard.as_ref() else {
            return Ok(());
        };
        channels
            .event_tx
            .send(FiberEvent::Suspended)
            .map_err(|_| Error::wrong_state("scheduler detached from suspended fiber"))?;
        match channels.resume_rx.recv() {
            Ok(ResumeSignal::Continue) => Ok(()),
            Ok(ResumeSignal::Cancel(error)) => Err(error),
            Err(_) => Err(Error::wrong_state("scheduler detached from suspended fiber")),
        }
    })
}

/// Scheduler-side control record for one fiber.
pub(crate) struct FiberCtrl {
    id: FiberId,
    phase: Mutex<FiberPhase>,
    pending_cancel: Mutex<Option<Error>>,
    resume_tx: SyncSender<ResumeSignal>,
    events: Mutex<Receiver<FiberEvent>>,
}

impl FiberCtrl {
    pub(crate) fn id(&self) -> FiberId {
        self.id
    }

    pub(crate) fn is_terminated(&self) -> bool {
        *self.phase.lock() == FiberPhase::Terminated
    }

    /// Queues a cancellation for delivery at the next resume and returns
    /// the phase observed at the request.
    pub(crate) fn request_cancel(&self, error: Error) -> FiberPhase {
        let phase = *self.phase.lock();
        if phase != FiberPhase::Terminated {
            let mut pending = self.pending_cancel.lock();
            if pending.is_none() {
                *pending = Some(error);
            }
        }
        phase
    }

    /// Starts or resumes the fiber and blocks until it suspends or
    /// completes. No-op on a terminated or currently running fiber.
    pub(crate) fn step(&self) {
        {
            let phase = *self.phase.lock();
            if phase == FiberPhase::Terminated || phase == FiberPhase::Running {
                return;
            }
        }
        let signal = self
            .pending_cancel
            .lock()
            .take()
            .map_or(ResumeSignal::Continue, ResumeSignal::Cancel);
        *self.phase.lock() = FiberPhase::Running;
        if self.resume_tx.send(signal).is_err() {
            *self.phase.lock() = FiberPhase::Terminated;
            return;
        }
        let event = self.events.lock().recv();
        *self.phase.lock() = match event {
            Ok(FiberEvent::Suspended) => FiberPhase::Suspended,
            Ok(FiberEvent::Completed) | Err(_) => FiberPhase::Terminated,
        };
    }
}

/// The capability handle passed to every fiber body.
///
/// Bodies poll cancellation through [`FiberCx::checkpoint`], suspend
/// through [`FiberCx::yield_now`], and drive nested promises through
/// [`FiberCx::wait`]. Fibers spawned without a token carry a never-cancel
/// token, so the same body shape works either way.
#[derive(Debug)]
pub struct FiberCx {
    token: CancelToken,
}

impl FiberCx {
    /// Returns the governing cancellation token.
    #[must_use]
    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    /// Fails with the token's cancellation error if cancellation has been
    /// requested.
    pub fn checkpoint(&self) -> Result<()> {
        self.token.checkpoint()
    }

    /// Suspends this fiber back to the scheduler.
    pub fn yield_now(&self) -> Result<()> {
        yield_now()
    }

    /// Drives a nested promise to settlement by poll-and-yield, returning
    /// its payload.
    pub fn wait<T: Clone + Send + 'static>(&self, promise: &Promise<T>) -> Result<T> {
        loop {
            if promise.is_fulfilled() {
                return promise.value();
            }
            if promise.is_rejected() {
                return Err(promise.reason()?);
            }
            self.yield_now()?;
        }
    }

    /// Sleeps cooperatively for `ms` milliseconds.
    pub fn sleep(&self, ms: u64) -> Result<()> {
        let timer = crate::combinator::timeout::delay(ms, ());
        self.wait(&timer)
    }
}

/// Creates the fiber thread and its control record.
///
/// The thread parks at the first rendezvous until the scheduler steps it.
/// The wrapper polls the token once before the body runs, settles the
/// promise from the body's result (panics become rejections), releases the
/// token registration, and reports completion.
pub(crate) fn launch<T, F>(
    id: FiberId,
    body: F,
    token: CancelToken,
) -> (Arc<FiberCtrl>, Promise<T>)
where
    T: Clone + Send + 'static,
    F: FnOnce(&FiberCx) -> Result<T> + Send + 'static,
{
    let (resume_tx, resume_rx) = sync_channel::<ResumeSignal>(0);
    let (event_tx, event_rx) = sync_channel::<FiberEvent>(0);
    let ctrl = Arc::new(FiberCtrl {
        id,
        phase: Mutex::new(FiberPhase::Created),
        pending_cancel: Mutex::new(None),
        resume_tx,
        events: Mutex::new(event_rx),
    });
    let promise: Promise<T> = Promise::pending();

    // Cancellation delivery: a suspended (or not yet started) fiber gets
    // the error thrown out of its next yield; a running fiber has its
    // promise rejected directly and keeps burning to its next checkpoint.
    let registration = {
        let ctrl = Arc::downgrade(&ctrl);
        let reject = promise.clone();
        let watched = token.clone();
        token.register(move || {
            let error = watched
                .reason()
                .map_or_else(Error::cancelled_default, Error::cancelled);
            if let Some(ctrl) = ctrl.upgrade() {
                let phase = ctrl.request_cancel(error.clone());
                if phase == FiberPhase::Running {
                    reject.complete_error(error);
                }
            }
        })
    };

    let thread_promise = promise.clone();
    let spawned = thread::Builder::new()
        .name(format!("fibra-fiber-{}", id.0))
        .spawn(move || {
            let first = match resume_rx.recv() {
                Ok(signal) => signal,
                Err(_) => return,
            };
            if let ResumeSignal::Cancel(error) = first {
                thread_promise.complete_error(error);
                registration.unregister();
                let _ = event_tx.send(FiberEvent::Completed);
                return;
            }

            CURRENT.with(|cell| {
                *cell.borrow_mut() = Some(FiberChannels {
                    event_tx: event_tx.clone(),
                    resume_rx,
                });
            });
            let cx = FiberCx { token };
            let result = catch_unwind(AssertUnwindSafe(|| {
                cx.checkpoint()?;
                body(&cx)
            }));
            CURRENT.with(|cell| {
                *cell.borrow_mut() = None;
            });

            match result {
                Ok(Ok(value)) => thread_promise.complete_value(value),
                Ok(Err(error)) => thread_promise.complete_error(error),
                Err(payload) => thread_promise.complete_error(sink::panic_error(payload.as_ref())),
            }
            registration.unregister();
            let _ = event_tx.send(FiberEvent::Completed);
        });

    if let Err(error) = spawned {
        *ctrl.phase.lock() = FiberPhase::Terminated;
        promise.complete_error(
            Error::wrong_state("failed to spawn fiber thread").with_source(error),
        );
    }

    (ctrl, promise)
}

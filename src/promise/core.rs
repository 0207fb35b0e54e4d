//! The promise engine: chainable transformations over a deferred value.
//!
//! A [`Promise`] is a cheap cloneable handle to shared settlement state.
//! Two clones of one promise observe the same settlement; this is the
//! crate's rendition of reference identity, so "resolving with an existing
//! promise" never rewraps a value.
//!
//! # Settlement callbacks are synchronous
//!
//! When a promise settles, the drained callbacks run on the spot, in
//! registration order; registering against an already settled promise
//! invokes the adapter immediately. Callbacks must not block.
//!
//! # Absorption
//!
//! A promise given another promise as its result subscribes to it and
//! adopts its eventual settlement ([`Promise::then`], [`Deferred::resolve_from`]).
//! Absorption is modeled by subscription forwarding, never by wrapping.
//!
//! [`Deferred::resolve_from`]: super::deferred::Deferred::resolve_from

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use smallvec::SmallVec;

use super::state::PromiseState;
use crate::error::{Error, ErrorKind, Result};
use crate::runtime::scheduler::Scheduler;
use crate::sink;

type FulfillCallback<T> = Box<dyn FnOnce(T) + Send>;
type RejectCallback = Box<dyn FnOnce(Error) + Send>;
type Canceller = Box<dyn FnOnce() -> Result<()> + Send>;

struct Inner<T> {
    state: PromiseState<T>,
    on_fulfill: SmallVec<[FulfillCallback<T>; 2]>,
    on_reject: SmallVec<[RejectCallback; 2]>,
    canceller: Option<Canceller>,
}

/// A three-state container for a deferred value with chainable
/// transformations.
pub struct Promise<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = {
            let inner = self.inner.lock();
            match inner.state {
                PromiseState::Pending => "pending",
                PromiseState::Fulfilled(_) => "fulfilled",
                PromiseState::Rejected(_) => "rejected",
            }
        };
        f.debug_struct("Promise").field("state", &tag).finish()
    }
}

impl<T> Promise<T> {
    /// Creates a promise that never settles on its own.
    #[must_use]
    pub fn pending() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: PromiseState::Pending,
                on_fulfill: SmallVec::new(),
                on_reject: SmallVec::new(),
                canceller: None,
            })),
        }
    }

    /// Returns true if the promise has not settled.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.inner.lock().state.is_pending()
    }

    /// Returns true if the promise has settled either way.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.inner.lock().state.is_settled()
    }

    /// Returns true if the promise is fulfilled.
    #[must_use]
    pub fn is_fulfilled(&self) -> bool {
        self.inner.lock().state.is_fulfilled()
    }

    /// Returns true if the promise is rejected.
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        self.inner.lock().state.is_rejected()
    }

    /// Returns true if the two handles share one settlement state.
    #[must_use]
    pub fn same_promise(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Attaches the canceller closure invoked by [`Promise::cancel`].
    ///
    /// Only one canceller is kept; attaching to a settled promise is a
    /// no-op.
    pub(crate) fn set_canceller(&self, canceller: impl FnOnce() -> Result<()> + Send + 'static) {
        let mut inner = self.inner.lock();
        if inner.state.is_pending() {
            inner.canceller = Some(Box::new(canceller));
        }
    }
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// Creates an already fulfilled promise.
    #[must_use]
    pub fn fulfilled(value: T) -> Self {
        let p = Self::pending();
        p.complete_value(value);
        p
    }

    /// Creates an already rejected promise.
    #[must_use]
    pub fn rejected(error: Error) -> Self {
        let p = Self::pending();
        p.complete_error(error);
        p
    }

    /// Returns a clone of the fulfillment value.
    ///
    /// Fails with [`ErrorKind::WrongState`] unless fulfilled.
    pub fn value(&self) -> Result<T> {
        self.inner.lock().state.value().map(Clone::clone)
    }

    /// Returns a clone of the rejection reason.
    ///
    /// Fails with [`ErrorKind::WrongState`] unless rejected.
    pub fn reason(&self) -> Result<Error> {
        self.inner.lock().state.reason().map(Clone::clone)
    }

    /// Registers settlement adapters.
    ///
    /// While pending, the adapters are queued per polarity; on a settled
    /// promise the matching adapter runs immediately. Either adapter may be
    /// absent (that polarity is simply unobserved by this subscription).
    pub(crate) fn subscribe(
        &self,
        on_fulfill: Option<FulfillCallback<T>>,
        on_reject: Option<RejectCallback>,
    ) {
        enum Immediate<T> {
            None,
            Value(T),
            Error(Error),
        }

        let mut on_fulfill = on_fulfill;
        let mut on_reject = on_reject;

        let immediate = {
            let mut inner = self.inner.lock();
            match &inner.state {
                PromiseState::Pending => {
                    if let Some(cb) = on_fulfill.take() {
                        inner.on_fulfill.push(cb);
                    }
                    if let Some(cb) = on_reject.take() {
                        inner.on_reject.push(cb);
                    }
                    Immediate::None
                }
                PromiseState::Fulfilled(v) => Immediate::Value(v.clone()),
                PromiseState::Rejected(e) => Immediate::Error(e.clone()),
            }
        };

        match immediate {
            Immediate::None => {}
            Immediate::Value(v) => {
                if let Some(cb) = on_fulfill {
                    cb(v);
                }
            }
            Immediate::Error(e) => {
                if let Some(cb) = on_reject {
                    cb(e);
                }
            }
        }
    }

    /// Transitions to fulfilled and drains the fulfillment callbacks in
    /// registration order. No-op on a settled promise.
    pub(crate) fn complete_value(&self, value: T) {
        let callbacks = {
            let mut inner = self.inner.lock();
            if inner.state.is_settled() {
                return;
            }
            inner.state = PromiseState::Fulfilled(value.clone());
            inner.canceller = None;
            inner.on_reject.clear();
            std::mem::take(&mut inner.on_fulfill)
        };
        for cb in callbacks {
            cb(value.clone());
        }
    }

    /// Transitions to rejected and drains the rejection callbacks in
    /// registration order. No-op on a settled promise.
    pub(crate) fn complete_error(&self, error: Error) {
        let callbacks = {
            let mut inner = self.inner.lock();
            if inner.state.is_settled() {
                return;
            }
            inner.state = PromiseState::Rejected(error.clone());
            inner.canceller = None;
            inner.on_fulfill.clear();
            std::mem::take(&mut inner.on_reject)
        };
        for cb in callbacks {
            cb(error.clone());
        }
    }

    /// Forwards this promise's settlement into `target` (absorption).
    pub(crate) fn pipe(&self, target: &Self) {
        let on_value = target.clone();
        let on_error = target.clone();
        self.subscribe(
            Some(Box::new(move |v| on_value.complete_value(v))),
            Some(Box::new(move |e| on_error.complete_error(e))),
        );
    }

    /// Transforms the fulfillment value; rejection passes through.
    pub fn map<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let out = Promise::pending();
        let fulfill = out.clone();
        let reject = out.clone();
        self.subscribe(
            Some(Box::new(move |v| fulfill.complete_value(f(v)))),
            Some(Box::new(move |e| reject.complete_error(e))),
        );
        out
    }

    /// Fallibly transforms the fulfillment value; an `Err` becomes the
    /// downstream rejection. Rejection passes through.
    pub fn and_then<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<U> + Send + 'static,
    {
        let out = Promise::pending();
        let fulfill = out.clone();
        let reject = out.clone();
        self.subscribe(
            Some(Box::new(move |v| match f(v) {
                Ok(u) => fulfill.complete_value(u),
                Err(e) => fulfill.complete_error(e),
            })),
            Some(Box::new(move |e| reject.complete_error(e))),
        );
        out
    }

    /// Chains a promise-returning handler; the returned promise is
    /// absorbed, never wrapped. Rejection passes through.
    pub fn then<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Promise<U> + Send + 'static,
    {
        let out = Promise::pending();
        let fulfill = out.clone();
        let reject = out.clone();
        self.subscribe(
            Some(Box::new(move |v| f(v).pipe(&fulfill))),
            Some(Box::new(move |e| reject.complete_error(e))),
        );
        out
    }

    /// Recovers from rejection; fulfillment passes through.
    ///
    /// Settled fast path: on an already fulfilled promise the handler can
    /// never run, so a clone of the same handle is returned.
    pub fn catch<F>(&self, f: F) -> Self
    where
        F: FnOnce(Error) -> Result<T> + Send + 'static,
    {
        self.catch_if(|_| true, f)
    }

    /// Recovers from rejections matching `pred`; unmatched rejections pass
    /// through unchanged, as does fulfillment.
    pub fn catch_if<P, F>(&self, pred: P, f: F) -> Self
    where
        P: Fn(&Error) -> bool + Send + 'static,
        F: FnOnce(Error) -> Result<T> + Send + 'static,
    {
        if self.is_fulfilled() {
            return self.clone();
        }
        let out = Self::pending();
        let fulfill = out.clone();
        let reject = out.clone();
        self.subscribe(
            Some(Box::new(move |v| fulfill.complete_value(v))),
            Some(Box::new(move |e| {
                if pred(&e) {
                    match f(e) {
                        Ok(v) => reject.complete_value(v),
                        Err(e2) => reject.complete_error(e2),
                    }
                } else {
                    reject.complete_error(e);
                }
            })),
        );
        out
    }

    /// Recovers from rejections of the given kind; other kinds fall
    /// through until matched by a later handler.
    pub fn catch_kind<F>(&self, kind: ErrorKind, f: F) -> Self
    where
        F: FnOnce(Error) -> Result<T> + Send + 'static,
    {
        self.catch_if(move |e| e.kind() == kind, f)
    }

    /// Recovers from rejection with a promise-returning handler; the
    /// returned promise is absorbed.
    pub fn catch_then<F>(&self, f: F) -> Self
    where
        F: FnOnce(Error) -> Self + Send + 'static,
    {
        if self.is_fulfilled() {
            return self.clone();
        }
        let out = Self::pending();
        let fulfill = out.clone();
        let reject = out.clone();
        self.subscribe(
            Some(Box::new(move |v| fulfill.complete_value(v))),
            Some(Box::new(move |e| f(e).pipe(&reject))),
        );
        out
    }

    /// Runs `f` on either settlement, preserving polarity and payload.
    ///
    /// An `Err` from `f` overrides the settlement with that rejection.
    pub fn finally<F>(&self, f: F) -> Self
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        // Only one polarity ever fires, but both adapters need the hook.
        let hook = Arc::new(Mutex::new(Some(f)));
        let out = Self::pending();
        let fulfill = out.clone();
        let reject = out.clone();
        let hook_f = Arc::clone(&hook);
        self.subscribe(
            Some(Box::new(move |v| {
                let taken = hook_f.lock().take();
                match taken.map_or(Ok(()), |f| f()) {
                    Ok(()) => fulfill.complete_value(v),
                    Err(e) => fulfill.complete_error(e),
                }
            })),
            Some(Box::new(move |orig| {
                let taken = hook.lock().take();
                match taken.map_or(Ok(()), |f| f()) {
                    Ok(()) => reject.complete_error(orig),
                    Err(e) => reject.complete_error(e),
                }
            })),
        );
        out
    }

    /// Cancels a pending promise.
    ///
    /// No-op on a settled promise. If a canceller is attached it runs
    /// first; a canceller error becomes the rejection. Otherwise (and
    /// after a clean canceller run that did not itself settle the
    /// promise) the promise rejects with a cancellation error carrying
    /// "Promise was cancelled".
    pub fn cancel(&self) {
        let canceller = {
            let mut inner = self.inner.lock();
            if inner.state.is_settled() {
                return;
            }
            inner.canceller.take()
        };
        if let Some(c) = canceller {
            match catch_unwind(AssertUnwindSafe(c)) {
                Ok(Ok(())) => self.complete_error(Error::promise_cancelled()),
                Ok(Err(e)) => self.complete_error(e),
                Err(payload) => self.complete_error(sink::panic_error(payload.as_ref())),
            }
        } else {
            self.complete_error(Error::promise_cancelled());
        }
    }

    /// Blocks until the promise settles and returns its payload.
    ///
    /// On a fiber thread this cooperatively yields between polls. On the
    /// driver thread it drives the scheduler; if the scheduler runs out
    /// of pending work while the promise is still pending, this fails
    /// with [`ErrorKind::WrongState`] instead of hanging.
    pub fn wait(&self) -> Result<T> {
        loop {
            {
                let inner = self.inner.lock();
                match &inner.state {
                    PromiseState::Fulfilled(v) => return Ok(v.clone()),
                    PromiseState::Rejected(e) => return Err(e.clone()),
                    PromiseState::Pending => {}
                }
            }
            if crate::runtime::fiber::in_fiber() {
                crate::runtime::yield_now()?;
            } else {
                let scheduler = Scheduler::global();
                if !scheduler.has_pending_work() {
                    return Err(Error::wrong_state(
                        "promise cannot settle: no pending work on the scheduler",
                    ));
                }
                scheduler.tick();
                if self.is_pending() {
                    std::thread::sleep(Duration::from_millis(1));
                }
            }
        }
    }
}

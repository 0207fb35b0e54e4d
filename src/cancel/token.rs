//! Cancellation tokens.
//!
//! A token is a one-way boolean signal observable by many subscribers.
//! Cancellation is a protocol, not a silent drop: the transition carries a
//! reason, runs every registered callback exactly once, and releases the
//! subscription graph so long-lived tokens do not accumulate garbage.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::promise::Promise;
use crate::sink;

type CancelCallback = Box<dyn FnOnce() + Send>;

pub(crate) struct TokenInner {
    cancellable: bool,
    pub(crate) state: Mutex<TokenState>,
}

pub(crate) struct TokenState {
    cancelled: bool,
    reason: Option<String>,
    next_registration: u64,
    callbacks: SmallVec<[(u64, CancelCallback); 2]>,
    /// Upstream unregister handles held by combined tokens. Released on
    /// self-cancel and on drop so upstream tokens do not leak subscribers.
    pub(crate) upstream_regs: Vec<Registration>,
}

impl Drop for TokenInner {
    fn drop(&mut self) {
        for reg in std::mem::take(&mut self.state.get_mut().upstream_regs) {
            reg.unregister();
        }
    }
}

/// A cancellation signal observable by many subscribers.
///
/// Handles are cheap clones of one shared state. A token with
/// `can_be_cancelled() == false` ignores every cancel request.
#[derive(Clone)]
pub struct CancelToken {
    pub(crate) inner: Arc<TokenInner>,
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancellable", &self.inner.cancellable)
            .field("cancelled", &self.is_cancellation_requested())
            .finish()
    }
}

impl CancelToken {
    fn with_cancellable(cancellable: bool) -> Self {
        Self {
            inner: Arc::new(TokenInner {
                cancellable,
                state: Mutex::new(TokenState {
                    cancelled: false,
                    reason: None,
                    next_registration: 0,
                    callbacks: SmallVec::new(),
                    upstream_regs: Vec::new(),
                }),
            }),
        }
    }

    /// Creates a fresh cancellable token.
    pub(crate) fn new() -> Self {
        Self::with_cancellable(true)
    }

    /// Creates a token that can never be cancelled.
    #[must_use]
    pub fn never() -> Self {
        Self::with_cancellable(false)
    }

    /// Creates a token that is already cancelled with the given reason.
    pub(crate) fn cancelled_with(reason: Option<String>) -> Self {
        let token = Self::new();
        token.cancel(reason);
        token
    }

    /// Returns true if cancellation has been requested.
    #[must_use]
    pub fn is_cancellation_requested(&self) -> bool {
        self.inner.cancellable && self.inner.state.lock().cancelled
    }

    /// Returns true if this token can ever be cancelled.
    #[must_use]
    pub fn can_be_cancelled(&self) -> bool {
        self.inner.cancellable
    }

    /// Returns the stored cancellation reason, if cancelled with one.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.inner.state.lock().reason.clone()
    }

    /// Returns true if the two handles share one token state.
    #[must_use]
    pub fn same_token(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Fails with a cancellation error if cancellation has been requested.
    ///
    /// The error carries the stored reason, or "Operation was cancelled"
    /// when none was given. This is the polling point for cooperative
    /// code.
    pub fn checkpoint(&self) -> Result<()> {
        if !self.is_cancellation_requested() {
            return Ok(());
        }
        Err(self
            .reason()
            .map_or_else(Error::cancelled_default, Error::cancelled))
    }

    /// Requests cancellation.
    ///
    /// No-op when the token is not cancellable or already cancelled. The
    /// flag and reason are set atomically, upstream subscriptions are
    /// released, then the registered callbacks run exactly once in
    /// registration order. Callback panics are swallowed and reported to
    /// the background sink.
    pub fn cancel(&self, reason: Option<String>) {
        if !self.inner.cancellable {
            return;
        }
        let (callbacks, upstream) = {
            let mut state = self.inner.state.lock();
            if state.cancelled {
                return;
            }
            state.cancelled = true;
            state.reason = reason;
            (
                std::mem::take(&mut state.callbacks),
                std::mem::take(&mut state.upstream_regs),
            )
        };
        for reg in upstream {
            reg.unregister();
        }
        for (_, callback) in callbacks {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(callback)) {
                sink::report_panic("cancellation callback", payload.as_ref());
            }
        }
    }

    /// Registers a callback to run on cancellation.
    ///
    /// On an already cancelled token the callback runs synchronously and a
    /// no-op handle is returned. On a never-cancel token the callback is
    /// dropped (it can never fire) and a no-op handle is returned.
    pub fn register(&self, callback: impl FnOnce() + Send + 'static) -> Registration {
        if !self.inner.cancellable {
            return Registration::noop();
        }
        {
            let mut state = self.inner.state.lock();
            if !state.cancelled {
                let id = state.next_registration;
                state.next_registration += 1;
                state.callbacks.push((id, Box::new(callback)));
                return Registration {
                    target: Some(Arc::clone(&self.inner)),
                    id,
                };
            }
        }
        callback();
        Registration::noop()
    }

    /// Returns a promise fulfilled when cancellation is requested.
    ///
    /// Already-resolved on a cancelled token; never-settling on a
    /// never-cancel token.
    #[must_use]
    pub fn wait_for_cancellation(&self) -> Promise<()> {
        if !self.inner.cancellable {
            return Promise::pending();
        }
        let promise = Promise::pending();
        let target = promise.clone();
        self.register(move || target.complete_value(()));
        promise
    }

    /// Combines this token with others into a fan-in token.
    ///
    /// With no arguments this returns a clone of the same handle
    /// (identity). Otherwise the combined token cancels exactly when any
    /// upstream cancels, with the first upstream's reason.
    #[must_use]
    pub fn combine_with(&self, others: &[Self]) -> Self {
        if others.is_empty() {
            return self.clone();
        }
        let mut upstreams = Vec::with_capacity(others.len() + 1);
        upstreams.push(self.clone());
        upstreams.extend_from_slice(others);
        super::combined::combine(&upstreams)
    }

    #[cfg(test)]
    pub(crate) fn callback_count(&self) -> usize {
        self.inner.state.lock().callbacks.len()
    }
}

/// An opaque unregister handle returned by [`CancelToken::register`].
pub struct Registration {
    target: Option<Arc<TokenInner>>,
    id: u64,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

impl Registration {
    /// A handle that unregisters nothing.
    pub(crate) const fn noop() -> Self {
        Self { target: None, id: 0 }
    }

    /// Returns true if this handle still refers to a queued callback slot.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.target.is_some()
    }

    /// Removes the registered callback, if it has not already run.
    pub fn unregister(mut self) {
        if let Some(target) = self.target.take() {
            let id = self.id;
            target.state.lock().callbacks.retain(|(i, _)| *i != id);
        }
    }
}

//! The externally controlled producer side of a promise.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::core::Promise;
use crate::error::{Error, Result};

/// An externally controlled producer for exactly one [`Promise`].
///
/// A deferred is settled by the first of `resolve`, `resolve_from`,
/// `reject`, or `cancel`. A second `resolve`/`reject` fails with
/// [`crate::ErrorKind::AlreadySettled`]; a second `cancel` is a no-op.
#[derive(Debug)]
pub struct Deferred<T> {
    promise: Promise<T>,
    settled: Arc<AtomicBool>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            promise: self.promise.clone(),
            settled: Arc::clone(&self.settled),
        }
    }
}

impl<T: Clone + Send + 'static> Deferred<T> {
    /// Creates a deferred with a fresh pending promise.
    #[must_use]
    pub fn new() -> Self {
        Self {
            promise: Promise::pending(),
            settled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Creates a deferred whose promise carries a canceller closure.
    #[must_use]
    pub fn with_canceller(canceller: impl FnOnce() -> Result<()> + Send + 'static) -> Self {
        let deferred = Self::new();
        deferred.promise.set_canceller(canceller);
        deferred
    }

    /// Returns a handle to the owned promise.
    #[must_use]
    pub fn promise(&self) -> Promise<T> {
        self.promise.clone()
    }

    /// Returns true if any of resolve/reject/cancel has been called.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::SeqCst)
    }

    fn mark_settled(&self, operation: &str) -> Result<()> {
        if self.settled.swap(true, Ordering::SeqCst) {
            return Err(Error::already_settled(format!(
                "{operation} on an already settled deferred"
            )));
        }
        Ok(())
    }

    /// Fulfills the promise with a value.
    pub fn resolve(&self, value: T) -> Result<()> {
        self.mark_settled("resolve")?;
        self.promise.complete_value(value);
        Ok(())
    }

    /// Resolves by absorbing another promise's eventual settlement.
    ///
    /// The deferred counts as settled immediately; the owned promise stays
    /// pending until `source` settles and then adopts its state.
    pub fn resolve_from(&self, source: &Promise<T>) -> Result<()> {
        self.mark_settled("resolve")?;
        source.pipe(&self.promise);
        Ok(())
    }

    /// Rejects the promise with an error.
    pub fn reject(&self, error: Error) -> Result<()> {
        self.mark_settled("reject")?;
        self.promise.complete_error(error);
        Ok(())
    }

    /// Cancels the promise. No-op if the deferred is already settled.
    pub fn cancel(&self) {
        if self.settled.swap(true, Ordering::SeqCst) {
            return;
        }
        self.promise.cancel();
    }
}

impl<T: Clone + Send + 'static> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

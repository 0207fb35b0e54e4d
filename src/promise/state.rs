//! Promise settlement state.
//!
//! A promise is a three-state container: pending, fulfilled with a value,
//! or rejected with an error. Settlement is one-way and one-shot; the
//! accessors fail loudly when called in the wrong state.

use crate::error::{Error, Result};

/// The settlement state of a promise.
#[derive(Debug, Clone)]
pub enum PromiseState<T> {
    /// Not yet settled.
    Pending,
    /// Settled with a value.
    Fulfilled(T),
    /// Settled with an error.
    Rejected(Error),
}

impl<T> PromiseState<T> {
    /// Returns true if the state is pending.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Returns true if the state is not pending.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        !self.is_pending()
    }

    /// Returns true if the state is fulfilled.
    #[must_use]
    pub const fn is_fulfilled(&self) -> bool {
        matches!(self, Self::Fulfilled(_))
    }

    /// Returns true if the state is rejected.
    #[must_use]
    pub const fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// Returns the fulfillment value.
    ///
    /// Fails with [`crate::ErrorKind::WrongState`] unless fulfilled.
    pub fn value(&self) -> Result<&T> {
        match self {
            Self::Fulfilled(v) => Ok(v),
            Self::Pending => Err(Error::wrong_state("value of a pending promise")),
            Self::Rejected(_) => Err(Error::wrong_state("value of a rejected promise")),
        }
    }

    /// Returns the rejection reason.
    ///
    /// Fails with [`crate::ErrorKind::WrongState`] unless rejected.
    pub fn reason(&self) -> Result<&Error> {
        match self {
            Self::Rejected(e) => Ok(e),
            Self::Pending => Err(Error::wrong_state("reason of a pending promise")),
            Self::Fulfilled(_) => Err(Error::wrong_state("reason of a fulfilled promise")),
        }
    }
}

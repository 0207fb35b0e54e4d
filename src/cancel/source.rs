//! Token sources: the owning controllers of cancellation tokens.
//!
//! A source owns exactly one token and is the only sanctioned way to
//! cancel it from outside. Disposal severs the source from its token:
//! source-side calls fail afterwards, while previously obtained token
//! handles keep working.

use std::sync::atomic::{AtomicBool, Ordering};

use super::combined;
use super::token::CancelToken;
use crate::error::{Error, Result};
use crate::runtime::scheduler::Scheduler;

/// The owning controller of a single [`CancelToken`].
///
/// Every factory hands the owned token to the source through the one
/// constructor; there is no post-hoc token swapping.
#[derive(Debug)]
pub struct CancelSource {
    token: CancelToken,
    disposed: AtomicBool,
}

impl CancelSource {
    fn with_token(token: CancelToken) -> Self {
        Self {
            token,
            disposed: AtomicBool::new(false),
        }
    }

    /// Creates a source over a fresh cancellable token.
    #[must_use]
    pub fn new() -> Self {
        Self::with_token(CancelToken::new())
    }

    /// Creates a source over a token that can never be cancelled.
    #[must_use]
    pub fn never() -> Self {
        Self::with_token(CancelToken::never())
    }

    /// Creates a source whose token is already cancelled with `reason`.
    #[must_use]
    pub fn cancelled(reason: Option<String>) -> Self {
        Self::with_token(CancelToken::cancelled_with(reason))
    }

    /// Creates a source whose token cancels itself after `ms` milliseconds
    /// with the reason "Timeout of {ms} milliseconds exceeded".
    ///
    /// Fails with [`crate::ErrorKind::InvalidArgument`] when `ms` is zero.
    pub fn with_timeout(ms: u64) -> Result<Self> {
        if ms == 0 {
            return Err(Error::invalid_argument(
                "timeout must be greater than zero milliseconds",
            ));
        }
        let source = Self::new();
        let token = source.token.clone();
        Scheduler::global().set_timeout(
            move || token.cancel(Some(format!("Timeout of {ms} milliseconds exceeded"))),
            ms,
        );
        Ok(source)
    }

    /// Creates a source over a fan-in token combining the given upstreams.
    #[must_use]
    pub fn combined(tokens: &[CancelToken]) -> Self {
        Self::with_token(combined::combine(tokens))
    }

    /// Creates a source whose token cancels when the OS delivers `sig`,
    /// with the reason "Received signal {sig}".
    ///
    /// When signal support is unavailable (non-Unix targets, or the signal
    /// cannot be hooked) the handler registration is silently omitted and
    /// the returned source is simply never signal-cancelled.
    #[must_use]
    pub fn with_signal(sig: i32) -> Self {
        let source = Self::new();
        let _ = crate::runtime::signal::watch(sig, source.token.clone());
        source
    }

    fn ensure_live(&self) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(Error::disposed("token source has been disposed"));
        }
        Ok(())
    }

    /// Returns a handle to the owned token.
    pub fn token(&self) -> Result<CancelToken> {
        self.ensure_live()?;
        Ok(self.token.clone())
    }

    /// Cancels the owned token with the given reason.
    pub fn cancel(&self, reason: Option<String>) -> Result<()> {
        self.ensure_live()?;
        self.token.cancel(reason);
        Ok(())
    }

    /// Returns true if the owned token has been cancelled.
    pub fn is_cancellation_requested(&self) -> Result<bool> {
        self.ensure_live()?;
        Ok(self.token.is_cancellation_requested())
    }

    /// Severs the source from its token. Idempotent.
    ///
    /// Subsequent source-side calls fail with
    /// [`crate::ErrorKind::Disposed`]; token handles obtained earlier keep
    /// operating.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }

    /// Returns true if the source has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn source_controls_its_token() {
        let source = CancelSource::new();
        let token = source.token().unwrap();
        assert!(!source.is_cancellation_requested().unwrap());

        source.cancel(Some("done".into())).unwrap();
        assert!(token.is_cancellation_requested());
        assert_eq!(token.reason().as_deref(), Some("done"));
    }

    #[test]
    fn cancelled_factory_is_precancelled() {
        let source = CancelSource::cancelled(Some("born dead".into()));
        assert!(source.is_cancellation_requested().unwrap());
        assert_eq!(
            source.token().unwrap().reason().as_deref(),
            Some("born dead")
        );
    }

    #[test]
    fn never_factory_cannot_cancel() {
        let source = CancelSource::never();
        source.cancel(Some("try".into())).unwrap();
        assert!(!source.is_cancellation_requested().unwrap());
        assert!(!source.token().unwrap().can_be_cancelled());
    }

    #[test]
    fn zero_timeout_is_invalid() {
        let err = CancelSource::with_timeout(0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn dispose_blocks_the_source_but_not_the_token() {
        let source = CancelSource::new();
        let token = source.token().unwrap();
        source.dispose();
        source.dispose(); // idempotent

        assert_eq!(source.token().unwrap_err().kind(), ErrorKind::Disposed);
        assert_eq!(
            source.cancel(None).unwrap_err().kind(),
            ErrorKind::Disposed
        );
        assert_eq!(
            source.is_cancellation_requested().unwrap_err().kind(),
            ErrorKind::Disposed
        );

        // the token itself remains functional via other references
        token.cancel(Some("still works".into()));
        assert!(token.is_cancellation_requested());
    }

    #[test]
    fn combined_factory_fans_in() {
        let a = CancelSource::new();
        let b = CancelSource::new();
        let combined = CancelSource::combined(&[a.token().unwrap(), b.token().unwrap()]);
        let token = combined.token().unwrap();

        b.cancel(Some("stop".into())).unwrap();
        assert!(token.is_cancellation_requested());
        assert_eq!(token.reason().as_deref(), Some("stop"));
    }
}

//! Combined tokens: fan-in over N upstream tokens.
//!
//! A combined token cancels exactly when any upstream cancels; the first
//! upstream to cancel wins the reason. Upstream callbacks hold only a weak
//! reference downstream, while the combined token's state holds the strong
//! upstream registrations, so the subscription graph is broken from either
//! end: self-cancel and drop both release every upstream slot.

use std::sync::Arc;

use super::token::CancelToken;

/// Builds a fan-in token over the given upstreams.
///
/// Never-cancel upstreams are filtered out at construction. If any
/// remaining upstream is already cancelled, the result is constructed
/// already-cancelled with that upstream's reason (first in input order).
/// If no cancellable upstream remains, the result can never cancel.
pub(crate) fn combine(upstreams: &[CancelToken]) -> CancelToken {
    let cancellable: Vec<&CancelToken> = upstreams
        .iter()
        .filter(|t| t.can_be_cancelled())
        .collect();

    if let Some(pre) = cancellable.iter().find(|t| t.is_cancellation_requested()) {
        return CancelToken::cancelled_with(pre.reason());
    }
    if cancellable.is_empty() {
        return CancelToken::never();
    }

    let combined = CancelToken::new();
    let weak = Arc::downgrade(&combined.inner);
    let mut regs = Vec::with_capacity(cancellable.len());
    for upstream in cancellable {
        let weak = weak.clone();
        let source = upstream.clone();
        regs.push(upstream.register(move || {
            if let Some(inner) = weak.upgrade() {
                CancelToken { inner }.cancel(source.reason());
            }
        }));
    }
    combined.inner.state.lock().upstream_regs = regs;
    combined
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_upstream_cancel_wins_the_reason() {
        let a = CancelToken::new();
        let b = CancelToken::new();
        let combined = a.combine_with(std::slice::from_ref(&b));

        b.cancel(Some("stop".into()));
        assert!(combined.is_cancellation_requested());
        assert_eq!(combined.reason().as_deref(), Some("stop"));

        a.cancel(Some("late".into()));
        assert_eq!(combined.reason().as_deref(), Some("stop"));
    }

    #[test]
    fn precancelled_upstream_yields_precancelled_combined() {
        let a = CancelToken::new();
        let b = CancelToken::cancelled_with(Some("gone".into()));
        let combined = combine(&[a, b]);
        assert!(combined.is_cancellation_requested());
        assert_eq!(combined.reason().as_deref(), Some("gone"));
    }

    #[test]
    fn never_upstreams_are_filtered_out() {
        let never = CancelToken::never();
        let live = CancelToken::new();
        let combined = combine(&[never.clone(), live.clone()]);

        live.cancel(Some("go".into()));
        assert!(combined.is_cancellation_requested());

        let all_never = combine(&[never, CancelToken::never()]);
        assert!(!all_never.can_be_cancelled());
    }

    #[test]
    fn cancel_releases_upstream_subscriptions() {
        let a = CancelToken::new();
        let b = CancelToken::new();
        let combined = combine(&[a.clone(), b.clone()]);
        assert_eq!(a.callback_count(), 1);
        assert_eq!(b.callback_count(), 1);

        a.cancel(None);
        // a's slot was consumed by the dispatch, b's was unregistered.
        assert_eq!(a.callback_count(), 0);
        assert_eq!(b.callback_count(), 0);
        assert!(combined.is_cancellation_requested());
    }

    #[test]
    fn drop_releases_upstream_subscriptions() {
        let a = CancelToken::new();
        let combined = combine(std::slice::from_ref(&a));
        assert_eq!(a.callback_count(), 1);
        drop(combined);
        assert_eq!(a.callback_count(), 0);

        // cancelling afterwards must not fire into freed state
        a.cancel(None);
    }

    #[test]
    fn combined_exposes_the_full_token_contract() {
        let a = CancelToken::new();
        let combined = combine(std::slice::from_ref(&a));
        let waited = combined.wait_for_cancellation();
        assert!(combined.checkpoint().is_ok());

        a.cancel(Some("halt".into()));
        assert!(waited.is_fulfilled());
        assert_eq!(combined.checkpoint().unwrap_err().message(), "halt");
    }
}

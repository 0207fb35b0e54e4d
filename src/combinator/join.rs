//! Fan-in combinators: all, all_keyed, race, any, all_settled.
//!
//! Inputs are materialized eagerly; the fan-in counters ride on the
//! promises' idempotent settlement, so a late loser simply lands on an
//! already settled result.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::promise::Promise;

/// Per-entry outcome descriptor produced by [`all_settled`].
#[derive(Debug, Clone)]
pub enum Settlement<T> {
    /// The entry fulfilled with a value.
    Fulfilled(T),
    /// The entry rejected with a reason.
    Rejected(Error),
}

impl<T> Settlement<T> {
    /// Returns true for a fulfilled entry.
    #[must_use]
    pub const fn is_fulfilled(&self) -> bool {
        matches!(self, Self::Fulfilled(_))
    }

    /// Returns true for a rejected entry.
    #[must_use]
    pub const fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// Returns the fulfillment value, if any.
    #[must_use]
    pub const fn value(&self) -> Option<&T> {
        match self {
            Self::Fulfilled(v) => Some(v),
            Self::Rejected(_) => None,
        }
    }

    /// Returns the rejection reason, if any.
    #[must_use]
    pub const fn reason(&self) -> Option<&Error> {
        match self {
            Self::Rejected(e) => Some(e),
            Self::Fulfilled(_) => None,
        }
    }
}

/// Waits for every promise; fulfills with values in input order, or
/// rejects with the first rejection. Empty input fulfills with an empty
/// vector.
pub fn all<T: Clone + Send + 'static>(promises: Vec<Promise<T>>) -> Promise<Vec<T>> {
    let keyed = promises.into_iter().map(|p| ((), p)).collect();
    all_keyed(keyed).map(|pairs| pairs.into_iter().map(|((), v)| v).collect())
}

/// Like [`all`], but each entry carries a caller key that is preserved in
/// the result pairs (input order).
pub fn all_keyed<K, T>(entries: Vec<(K, Promise<T>)>) -> Promise<Vec<(K, T)>>
where
    K: Clone + Send + 'static,
    T: Clone + Send + 'static,
{
    if entries.is_empty() {
        return Promise::fulfilled(Vec::new());
    }
    let total = entries.len();
    let out: Promise<Vec<(K, T)>> = Promise::pending();
    let slots: Arc<Mutex<Vec<Option<(K, T)>>>> =
        Arc::new(Mutex::new((0..total).map(|_| None).collect()));
    let remaining = Arc::new(AtomicUsize::new(total));

    for (index, (key, promise)) in entries.into_iter().enumerate() {
        let slots = Arc::clone(&slots);
        let remaining = Arc::clone(&remaining);
        let fulfill = out.clone();
        let reject = out.clone();
        promise.subscribe(
            Some(Box::new(move |value| {
                slots.lock()[index] = Some((key, value));
                if remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                    let collected: Vec<(K, T)> = slots
                        .lock()
                        .iter_mut()
                        .map(|slot| slot.take().expect("all: every slot filled"))
                        .collect();
                    fulfill.complete_value(collected);
                }
            })),
            Some(Box::new(move |error| reject.complete_error(error))),
        );
    }
    out
}

/// Settles with the first settlement of either polarity; later
/// settlements are ignored.
///
/// Fails synchronously with [`crate::ErrorKind::InvalidArgument`] on
/// empty input.
pub fn race<T: Clone + Send + 'static>(promises: Vec<Promise<T>>) -> Result<Promise<T>> {
    if promises.is_empty() {
        return Err(Error::invalid_argument("race requires at least one promise"));
    }
    let out = Promise::pending();
    for promise in promises {
        promise.pipe(&out);
    }
    Ok(out)
}

/// Fulfills with the first fulfillment; if every entry rejects, rejects
/// with an aggregate ("All promises rejected") whose inner list preserves
/// input order.
///
/// Fails synchronously with [`crate::ErrorKind::InvalidArgument`] on
/// empty input.
pub fn any<T: Clone + Send + 'static>(promises: Vec<Promise<T>>) -> Result<Promise<T>> {
    if promises.is_empty() {
        return Err(Error::invalid_argument("any requires at least one promise"));
    }
    let total = promises.len();
    let out: Promise<T> = Promise::pending();
    let reasons: Arc<Mutex<Vec<Option<Error>>>> =
        Arc::new(Mutex::new((0..total).map(|_| None).collect()));
    let remaining = Arc::new(AtomicUsize::new(total));

    for (index, promise) in promises.into_iter().enumerate() {
        let reasons = Arc::clone(&reasons);
        let remaining = Arc::clone(&remaining);
        let fulfill = out.clone();
        let reject = out.clone();
        promise.subscribe(
            Some(Box::new(move |value| fulfill.complete_value(value))),
            Some(Box::new(move |error| {
                reasons.lock()[index] = Some(error);
                if remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                    let inner: Vec<Error> = reasons
                        .lock()
                        .iter_mut()
                        .map(|slot| slot.take().expect("any: every slot filled"))
                        .collect();
                    reject.complete_error(Error::aggregate("All promises rejected", inner));
                }
            })),
        );
    }
    Ok(out)
}

/// Waits for every promise and fulfills with per-entry descriptors in
/// input order. Never rejects; empty input fulfills with an empty vector.
pub fn all_settled<T: Clone + Send + 'static>(
    promises: Vec<Promise<T>>,
) -> Promise<Vec<Settlement<T>>> {
    if promises.is_empty() {
        return Promise::fulfilled(Vec::new());
    }
    let total = promises.len();
    let out: Promise<Vec<Settlement<T>>> = Promise::pending();
    let slots: Arc<Mutex<Vec<Option<Settlement<T>>>>> =
        Arc::new(Mutex::new((0..total).map(|_| None).collect()));
    let remaining = Arc::new(AtomicUsize::new(total));

    for (index, promise) in promises.into_iter().enumerate() {
        let record = {
            let slots = Arc::clone(&slots);
            let remaining = Arc::clone(&remaining);
            let out = out.clone();
            move |settlement: Settlement<T>| {
                slots.lock()[index] = Some(settlement);
                if remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                    let collected: Vec<Settlement<T>> = slots
                        .lock()
                        .iter_mut()
                        .map(|slot| slot.take().expect("all_settled: every slot filled"))
                        .collect();
                    out.complete_value(collected);
                }
            }
        };
        let record_err = record.clone();
        promise.subscribe(
            Some(Box::new(move |value| record(Settlement::Fulfilled(value)))),
            Some(Box::new(move |error| {
                record_err(Settlement::Rejected(error));
            })),
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn all_preserves_input_order() {
        let result = all(vec![
            Promise::fulfilled("v1"),
            Promise::fulfilled("v2"),
            Promise::fulfilled("v3"),
        ]);
        assert_eq!(result.value().unwrap(), vec!["v1", "v2", "v3"]);
    }

    #[test]
    fn all_of_nothing_is_empty() {
        let result: Promise<Vec<i32>> = all(Vec::new());
        assert_eq!(result.value().unwrap(), Vec::<i32>::new());
    }

    #[test]
    fn all_rejects_with_first_rejection() {
        let pending: Promise<i32> = Promise::pending();
        let result = all(vec![
            Promise::fulfilled(1),
            Promise::rejected(Error::user("first")),
            pending,
        ]);
        assert_eq!(result.reason().unwrap().message(), "first");
    }

    #[test]
    fn all_keyed_preserves_keys() {
        let result = all_keyed(vec![
            ("k1", Promise::fulfilled("v1")),
            ("k2", Promise::fulfilled("v2")),
        ]);
        assert_eq!(
            result.value().unwrap(),
            vec![("k1", "v1"), ("k2", "v2")]
        );
    }

    #[test]
    fn all_waits_for_late_entries() {
        let late: Promise<i32> = Promise::pending();
        let result = all(vec![Promise::fulfilled(1), late.clone()]);
        assert!(result.is_pending());
        late.complete_value(2);
        assert_eq!(result.value().unwrap(), vec![1, 2]);
    }

    #[test]
    fn race_takes_the_first_settlement_of_either_polarity() {
        let a: Promise<i32> = Promise::pending();
        let b: Promise<i32> = Promise::pending();
        let winner = race(vec![a.clone(), b.clone()]).unwrap();

        b.complete_value(2);
        a.complete_value(1);
        assert_eq!(winner.value().unwrap(), 2);

        let a: Promise<i32> = Promise::pending();
        let b: Promise<i32> = Promise::pending();
        let winner = race(vec![a.clone(), b.clone()]).unwrap();
        a.complete_error(Error::user("lost it"));
        b.complete_value(5);
        assert_eq!(winner.reason().unwrap().message(), "lost it");
    }

    #[test]
    fn race_of_nothing_is_invalid() {
        let err = race::<i32>(Vec::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn any_takes_the_first_fulfillment() {
        let result = any(vec![
            Promise::rejected(Error::user("e1")),
            Promise::fulfilled(7),
            Promise::fulfilled(8),
        ])
        .unwrap();
        assert_eq!(result.value().unwrap(), 7);
    }

    #[test]
    fn any_aggregates_when_all_reject() {
        let result: Promise<i32> = any(vec![
            Promise::rejected(Error::user("e1")),
            Promise::rejected(Error::user("e2")),
            Promise::rejected(Error::user("e3")),
        ])
        .unwrap();
        let reason = result.reason().unwrap();
        assert_eq!(reason.kind(), ErrorKind::Aggregate);
        assert_eq!(reason.message(), "All promises rejected");
        assert_eq!(reason.inner_len(), 3);
        assert_eq!(reason.inner_messages(), vec!["e1", "e2", "e3"]);
    }

    #[test]
    fn any_of_nothing_is_invalid() {
        let err = any::<i32>(Vec::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn all_settled_records_mixed_outcomes_in_order() {
        let result = all_settled(vec![
            Promise::fulfilled("s1"),
            Promise::rejected(Error::user("e1")),
            Promise::fulfilled("s2"),
        ]);
        let settlements = result.value().unwrap();
        assert_eq!(settlements.len(), 3);
        assert!(settlements[0].is_fulfilled());
        assert!(settlements[1].is_rejected());
        assert!(settlements[2].is_fulfilled());
        assert_eq!(*settlements[0].value().unwrap(), "s1");
        assert_eq!(settlements[1].reason().unwrap().message(), "e1");
        assert_eq!(*settlements[2].value().unwrap(), "s2");
    }

    #[test]
    fn all_settled_never_rejects() {
        let result: Promise<Vec<Settlement<i32>>> =
            all_settled(vec![Promise::rejected(Error::user("only"))]);
        assert!(result.is_fulfilled());

        let empty: Promise<Vec<Settlement<i32>>> = all_settled(Vec::new());
        assert!(empty.is_fulfilled());
    }
}

//! Timer queue for deadline management.
//!
//! A min-heap of `(deadline, id)` pairs over a keyed record map. Ties on
//! the deadline are broken by timer id, which increases monotonically, so
//! simultaneous timers fire in registration order. Cancelled timers are
//! dropped lazily when the scan reaches them.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

/// Identifier for a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub(crate) u64);

pub(crate) type TimerCallback = Box<dyn FnMut() + Send>;

#[derive(Debug, Clone, Eq, PartialEq)]
struct TimerEntry {
    deadline: Duration,
    id: TimerId,
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (earliest deadline first, then
        // lowest id).
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct TimerRecord {
    callback: Option<TimerCallback>,
    interval: Option<Duration>,
    cancelled: bool,
}

/// A due timer popped out of the queue, ready to fire.
pub(crate) struct DueTimer {
    pub(crate) id: TimerId,
    pub(crate) callback: TimerCallback,
    pub(crate) interval: Option<Duration>,
}

/// Timers ordered by deadline, keyed by id.
#[derive(Default)]
pub(crate) struct TimerQueue {
    heap: BinaryHeap<TimerEntry>,
    records: HashMap<TimerId, TimerRecord>,
    next_id: u64,
}

impl TimerQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Number of timers that have not been cancelled.
    pub(crate) fn active_len(&self) -> usize {
        self.records.values().filter(|r| !r.cancelled).count()
    }

    /// Adds a timer. `interval` of `None` means one-shot.
    pub(crate) fn insert(
        &mut self,
        callback: TimerCallback,
        deadline: Duration,
        interval: Option<Duration>,
    ) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.records.insert(
            id,
            TimerRecord {
                callback: Some(callback),
                interval,
                cancelled: false,
            },
        );
        self.heap.push(TimerEntry { deadline, id });
        id
    }

    /// Marks a timer cancelled; the record is swept at the next scan.
    pub(crate) fn cancel(&mut self, id: TimerId) {
        if let Some(record) = self.records.get_mut(&id) {
            record.cancelled = true;
        }
    }

    /// Pops every non-cancelled timer whose deadline is `<= now`, in
    /// ascending deadline order (ties by id). One-shot records are removed;
    /// interval records stay keyed with their callback lent out, awaiting
    /// [`TimerQueue::restore_interval`].
    pub(crate) fn pop_due(&mut self, now: Duration) -> Vec<DueTimer> {
        let mut due = Vec::new();
        while let Some(top) = self.heap.peek() {
            if top.deadline > now {
                break;
            }
            let Some(entry) = self.heap.pop() else { break };
            match self.records.get_mut(&entry.id) {
                None => {}
                Some(record) if record.cancelled => {
                    self.records.remove(&entry.id);
                }
                Some(record) => {
                    let Some(callback) = record.callback.take() else {
                        continue;
                    };
                    let interval = record.interval;
                    if interval.is_none() {
                        self.records.remove(&entry.id);
                    }
                    due.push(DueTimer {
                        id: entry.id,
                        callback,
                        interval,
                    });
                }
            }
        }
        due
    }

    /// Returns a fired interval timer's callback and re-arms it for
    /// `deadline`, unless the timer was cleared while firing.
    pub(crate) fn restore_interval(
        &mut self,
        id: TimerId,
        callback: TimerCallback,
        deadline: Duration,
    ) {
        match self.records.get_mut(&id) {
            Some(record) if !record.cancelled => {
                record.callback = Some(callback);
                self.heap.push(TimerEntry { deadline, id });
            }
            _ => {
                self.records.remove(&id);
            }
        }
    }

    /// Drops every timer.
    pub(crate) fn clear(&mut self) {
        self.heap.clear();
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn noop() -> TimerCallback {
        Box::new(|| {})
    }

    #[test]
    fn due_timers_come_out_in_deadline_order() {
        let mut queue = TimerQueue::new();
        let t200 = queue.insert(noop(), ms(200), None);
        let t100 = queue.insert(noop(), ms(100), None);
        let t300 = queue.insert(noop(), ms(300), None);

        let due: Vec<TimerId> = queue.pop_due(ms(300)).into_iter().map(|d| d.id).collect();
        assert_eq!(due, vec![t100, t200, t300]);
        assert_eq!(queue.active_len(), 0);
    }

    #[test]
    fn deadline_ties_break_by_registration_order() {
        let mut queue = TimerQueue::new();
        let first = queue.insert(noop(), ms(50), None);
        let second = queue.insert(noop(), ms(50), None);

        let due: Vec<TimerId> = queue.pop_due(ms(50)).into_iter().map(|d| d.id).collect();
        assert_eq!(due, vec![first, second]);
    }

    #[test]
    fn future_timers_stay_queued() {
        let mut queue = TimerQueue::new();
        queue.insert(noop(), ms(100), None);
        assert!(queue.pop_due(ms(99)).is_empty());
        assert_eq!(queue.active_len(), 1);
    }

    #[test]
    fn cancelled_timers_are_swept_lazily() {
        let mut queue = TimerQueue::new();
        let id = queue.insert(noop(), ms(10), None);
        queue.cancel(id);
        assert_eq!(queue.active_len(), 0);

        assert!(queue.pop_due(ms(10)).is_empty());
        assert_eq!(queue.active_len(), 0);
    }

    #[test]
    fn interval_record_survives_firing_until_cleared() {
        let mut queue = TimerQueue::new();
        let id = queue.insert(noop(), ms(10), Some(ms(10)));

        let mut due = queue.pop_due(ms(10));
        assert_eq!(due.len(), 1);
        let timer = due.pop().unwrap();
        queue.restore_interval(timer.id, timer.callback, ms(20));
        assert_eq!(queue.active_len(), 1);

        let mut due = queue.pop_due(ms(20));
        assert_eq!(due.len(), 1);
        let timer = due.pop().unwrap();
        queue.cancel(id);
        queue.restore_interval(timer.id, timer.callback, ms(30));
        assert_eq!(queue.active_len(), 0);
    }
}

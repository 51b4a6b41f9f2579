//! Tick-bucketed event scheduler.
//!
//! Events are grouped into buckets keyed by the absolute tick at which they
//! must fire. `fire(tick)` drains exactly one bucket, so per-tick cost is
//! proportional to the events due, not to the number of live timers. The
//! scheduler only stores integers and an event kind; resolving what the ids
//! mean is the handler's job.

use std::collections::BTreeMap;

use contracts::Tick;

// ---------------------------------------------------------------------------
// Events and handlers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledEvent<K> {
    pub tick: Tick,
    pub kind: K,
    pub id_a: u64,
    pub id_b: u64,
}

impl<K: PartialEq> ScheduledEvent<K> {
    fn matches(&self, kind: &K, id_a: u64, id_b: u64) -> bool {
        self.kind == *kind && self.id_a == id_a && self.id_b == id_b
    }
}

/// Receives events drained from a bucket.
pub trait TickEventHandler<K> {
    fn handle_event(&mut self, event: ScheduledEvent<K>);
}

impl<K, F> TickEventHandler<K> for F
where
    F: FnMut(ScheduledEvent<K>),
{
    fn handle_event(&mut self, event: ScheduledEvent<K>) {
        self(event)
    }
}

// ---------------------------------------------------------------------------
// TickEventScheduler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TickEventScheduler<K> {
    /// Invariant: no bucket is ever empty.
    buckets: BTreeMap<Tick, Vec<ScheduledEvent<K>>>,
}

impl<K> Default for TickEventScheduler<K> {
    fn default() -> Self {
        Self {
            buckets: BTreeMap::new(),
        }
    }
}

impl<K: Copy + PartialEq> TickEventScheduler<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event to the bucket for `tick`. Duplicates are allowed and
    /// fire twice; callers wanting one timer per key cancel first.
    pub fn schedule(&mut self, tick: Tick, kind: K, id_a: u64, id_b: u64) {
        self.buckets.entry(tick).or_default().push(ScheduledEvent {
            tick,
            kind,
            id_a,
            id_b,
        });
    }

    /// Removes the earliest pending event matching the key. Linear in the
    /// number of pending events.
    pub fn cancel(&mut self, kind: K, id_a: u64, id_b: u64) -> bool {
        let found = self.buckets.iter().find_map(|(tick, events)| {
            events
                .iter()
                .position(|event| event.matches(&kind, id_a, id_b))
                .map(|index| (*tick, index))
        });
        let Some((tick, index)) = found else {
            return false;
        };

        if let Some(events) = self.buckets.get_mut(&tick) {
            events.remove(index);
            if events.is_empty() {
                self.buckets.remove(&tick);
            }
        }
        true
    }

    /// Removes and returns the whole bucket for `tick`. A second call for the
    /// same tick returns nothing.
    pub fn fire(&mut self, tick: Tick) -> Vec<ScheduledEvent<K>> {
        self.buckets.remove(&tick).unwrap_or_default()
    }

    /// Drains the bucket for `tick` into `handler`, returning how many events
    /// were delivered.
    pub fn dispatch<H>(&mut self, tick: Tick, handler: &mut H) -> usize
    where
        H: TickEventHandler<K> + ?Sized,
    {
        let due = self.fire(tick);
        let delivered = due.len();
        for event in due {
            handler.handle_event(event);
        }
        delivered
    }

    pub fn reset(&mut self) {
        self.buckets.clear();
    }

    pub fn pending_len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn next_due_tick(&self) -> Option<Tick> {
        self.buckets.keys().next().copied()
    }

    /// Number of pending events with this key, across all buckets.
    pub fn pending_for(&self, kind: K, id_a: u64, id_b: u64) -> usize {
        self.iter()
            .filter(|event| event.matches(&kind, id_a, id_b))
            .count()
    }

    /// Tick of the earliest pending event with this key.
    pub fn due_tick_for(&self, kind: K, id_a: u64, id_b: u64) -> Option<Tick> {
        self.iter()
            .find(|event| event.matches(&kind, id_a, id_b))
            .map(|event| event.tick)
    }

    /// Pending events in tick order, insertion order within a tick.
    pub fn iter(&self) -> impl Iterator<Item = &ScheduledEvent<K>> + '_ {
        self.buckets.values().flatten()
    }

    pub(crate) fn has_empty_bucket(&self) -> bool {
        self.buckets.values().any(Vec::is_empty)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::EventKind;

    const KIND: EventKind = EventKind::BlacklistExpiry;

    #[test]
    fn fire_returns_bucket_in_insertion_order_and_only_once() {
        let mut sched = TickEventScheduler::new();
        sched.schedule(5, KIND, 1, 10);
        sched.schedule(5, KIND, 2, 20);
        sched.schedule(7, KIND, 3, 30);

        let due = sched.fire(5);
        let ids: Vec<(u64, u64)> = due.iter().map(|e| (e.id_a, e.id_b)).collect();
        assert_eq!(ids, vec![(1, 10), (2, 20)]);
        assert!(due.iter().all(|e| e.tick == 5));

        assert!(sched.fire(5).is_empty());
        assert_eq!(sched.pending_len(), 1);
        assert_eq!(sched.next_due_tick(), Some(7));
    }

    #[test]
    fn duplicate_schedules_fire_twice() {
        let mut sched = TickEventScheduler::new();
        sched.schedule(3, KIND, 1, 1);
        sched.schedule(3, KIND, 1, 1);
        assert_eq!(sched.pending_for(KIND, 1, 1), 2);
        assert_eq!(sched.fire(3).len(), 2);
    }

    #[test]
    fn cancel_removes_earliest_match_and_empty_bucket() {
        let mut sched = TickEventScheduler::new();
        sched.schedule(9, KIND, 1, 1);
        sched.schedule(4, KIND, 1, 1);
        sched.schedule(9, KIND, 2, 2);

        assert!(sched.cancel(KIND, 1, 1));
        assert_eq!(sched.bucket_count(), 1, "tick 4 bucket should be gone");
        assert_eq!(sched.due_tick_for(KIND, 1, 1), Some(9));

        assert!(sched.cancel(KIND, 1, 1));
        assert!(sched.cancel(KIND, 2, 2));
        assert!(sched.is_empty());
        assert!(!sched.has_empty_bucket());
    }

    #[test]
    fn cancel_without_match_is_noop() {
        let mut sched = TickEventScheduler::new();
        sched.schedule(2, KIND, 1, 1);
        assert!(!sched.cancel(KIND, 1, 2));
        assert!(!sched.cancel(KIND, 9, 9));
        assert_eq!(sched.pending_len(), 1);
    }

    #[test]
    fn skipped_ticks_are_delivered_when_their_tick_is_fired() {
        let mut sched = TickEventScheduler::new();
        sched.schedule(10, KIND, 1, 1);

        assert!(sched.fire(11).is_empty());
        assert_eq!(sched.pending_len(), 1, "bucket persists until drained");
        assert_eq!(sched.fire(10).len(), 1);
    }

    #[test]
    fn dispatch_feeds_closure_handler() {
        let mut sched = TickEventScheduler::new();
        sched.schedule(1, KIND, 4, 40);
        sched.schedule(1, KIND, 5, 50);

        let mut seen = Vec::new();
        let delivered = sched.dispatch(1, &mut |event: ScheduledEvent<EventKind>| {
            seen.push(event.id_a)
        });
        assert_eq!(delivered, 2);
        assert_eq!(seen, vec![4, 5]);
        assert_eq!(sched.dispatch(1, &mut |_: ScheduledEvent<EventKind>| {}), 0);
    }

    #[test]
    fn reset_drops_everything() {
        let mut sched = TickEventScheduler::new();
        sched.schedule(1, KIND, 1, 1);
        sched.schedule(2, KIND, 1, 1);
        sched.reset();
        assert!(sched.is_empty());
        assert_eq!(sched.pending_len(), 0);
        assert_eq!(sched.next_due_tick(), None);
    }
}

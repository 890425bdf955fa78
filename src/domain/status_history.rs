//! Bounded, time-ordered status history
//!
//! A [`StatusHistory`] is always seeded with one entry, only accepts entries
//! whose timestamp is not older than the current head, and drops its oldest
//! entries once `max_len` is exceeded. Re-inserting the current value is a
//! no-op, so neither the history nor the change notifications grow on
//! redundant updates.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_HISTORY_SIZE: usize = 50;

/// A status value and the time it became effective
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry<T> {
    pub value: T,
    pub timestamp: DateTime<Utc>,
    /// Who reported the value (controller id, "engine", operator login, ...)
    pub source: Option<String>,
}

impl<T> StatusEntry<T> {
    pub fn new(value: T, timestamp: DateTime<Utc>, source: Option<String>) -> Self {
        Self {
            value,
            timestamp,
            source,
        }
    }
}

/// Head change produced by a successful insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange<T> {
    pub old: StatusEntry<T>,
    pub new: StatusEntry<T>,
}

#[derive(Debug, Clone)]
pub struct StatusHistory<T> {
    /// Oldest first; `back()` is the current value
    entries: VecDeque<StatusEntry<T>>,
    max_len: usize,
}

impl<T: Clone + PartialEq> StatusHistory<T> {
    pub fn new(initial: T, timestamp: DateTime<Utc>) -> Self {
        Self::with_max_len(initial, timestamp, DEFAULT_HISTORY_SIZE)
    }

    /// `max_len` is clamped to at least 1 so the current value always survives.
    pub fn with_max_len(initial: T, timestamp: DateTime<Utc>, max_len: usize) -> Self {
        let max_len = max_len.max(1);
        let mut entries = VecDeque::with_capacity(max_len.min(DEFAULT_HISTORY_SIZE));
        entries.push_back(StatusEntry::new(initial, timestamp, None));
        Self { entries, max_len }
    }

    /// Append `value` as the new head.
    ///
    /// Returns `None` when the timestamp is older than the head or the value
    /// equals the current one.
    pub fn insert(
        &mut self,
        value: T,
        timestamp: DateTime<Utc>,
        source: Option<String>,
    ) -> Option<StatusChange<T>> {
        let head = self.current();
        if timestamp < head.timestamp || head.value == value {
            return None;
        }

        let old = head.clone();
        let new = StatusEntry::new(value, timestamp, source);
        self.entries.push_back(new.clone());
        while self.entries.len() > self.max_len {
            self.entries.pop_front();
        }

        Some(StatusChange { old, new })
    }

    pub fn current(&self) -> &StatusEntry<T> {
        // Seeded at construction and never drained below one entry.
        &self.entries[self.entries.len() - 1]
    }

    pub fn value(&self) -> T {
        self.current().value.clone()
    }

    /// Up to `max_count` most recent entries, newest first.
    pub fn snapshot(&self, max_count: usize) -> Vec<StatusEntry<T>> {
        self.entries.iter().rev().take(max_count).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn seeded_history_is_not_empty() {
        let h = StatusHistory::new("a", t(0));
        assert_eq!(h.len(), 1);
        assert_eq!(h.current().value, "a");
        assert!(!h.is_empty());
    }

    #[test]
    fn insert_returns_old_and_new() {
        let mut h = StatusHistory::new(1, t(0));
        let change = h.insert(2, t(1), Some("test".into())).unwrap();
        assert_eq!(change.old.value, 1);
        assert_eq!(change.new.value, 2);
        assert_eq!(change.new.source.as_deref(), Some("test"));
        assert_eq!(h.value(), 2);
    }

    #[test]
    fn equal_value_is_a_noop() {
        let mut h = StatusHistory::new(1, t(0));
        assert!(h.insert(1, t(5), None).is_none());
        assert_eq!(h.len(), 1);
        assert_eq!(h.current().timestamp, t(0));
    }

    #[test]
    fn older_timestamp_is_rejected() {
        let mut h = StatusHistory::new(1, t(10));
        assert!(h.insert(2, t(9), None).is_none());
        assert_eq!(h.value(), 1);
    }

    #[test]
    fn equal_timestamp_is_accepted_in_insertion_order() {
        let mut h = StatusHistory::new(1, t(10));
        assert!(h.insert(2, t(10), None).is_some());
        assert!(h.insert(3, t(10), None).is_some());
        let snap = h.snapshot(10);
        let values: Vec<_> = snap.iter().map(|e| e.value).collect();
        assert_eq!(values, vec![3, 2, 1]);
    }

    #[test]
    fn length_never_exceeds_max_and_current_survives() {
        let mut h = StatusHistory::with_max_len(0, t(0), 5);
        for i in 1..=20 {
            h.insert(i, t(i as i64), None);
            assert!(h.len() <= 5);
            assert_eq!(h.value(), i);
        }
        let snap = h.snapshot(100);
        assert_eq!(snap.len(), 5);
        assert_eq!(snap[0].value, 20);
        assert_eq!(snap[4].value, 16);
    }

    #[test]
    fn zero_max_len_keeps_current() {
        let mut h = StatusHistory::with_max_len("a", t(0), 0);
        h.insert("b", t(1), None);
        assert_eq!(h.len(), 1);
        assert_eq!(h.value(), "b");
    }

    #[test]
    fn current_tracks_last_distinct_value_for_monotonic_inserts() {
        let mut h = StatusHistory::new('x', t(0));
        let inserts = ['x', 'y', 'y', 'z', 'x', 'x'];
        let mut ts = t(0);
        for v in inserts {
            ts += Duration::seconds(1);
            h.insert(v, ts, None);
            assert_eq!(h.value(), v);
        }
        assert_eq!(h.len(), 4);
    }

    #[test]
    fn snapshot_limits_count() {
        let mut h = StatusHistory::new(0, t(0));
        h.insert(1, t(1), None);
        h.insert(2, t(2), None);
        assert_eq!(h.snapshot(2).len(), 2);
        assert_eq!(h.snapshot(0).len(), 0);
    }
}

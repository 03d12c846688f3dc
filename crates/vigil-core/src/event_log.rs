//! Bounded, ordered, in-memory event log.
//!
//! The log assigns sequence ids and evicts the oldest entries once it is
//! over capacity. It is a plain data structure with no locking and no
//! fan-out; [`TelemetryHub`](crate::hub::TelemetryHub) owns one behind its
//! mutex and adds the broadcast side.

use std::collections::VecDeque;

use chrono::Utc;
use vigil_types::{Event, EventCategory, SequenceId};

/// Ring of the most recent events.
#[derive(Debug, Clone)]
pub struct EventLog {
    entries: VecDeque<Event>,
    capacity: usize,
    next_id: SequenceId,
    evicted: u64,
}

impl EventLog {
    /// Create an empty log retaining at most `capacity` events.
    ///
    /// A capacity of 0 is treated as 1; configuration validation rejects
    /// it before it gets here.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            next_id: SequenceId::FIRST,
            evicted: 0,
        }
    }

    /// Append an event, assigning it the next sequence id.
    ///
    /// Evicts the oldest entry when the log is full. Returns a copy of
    /// the stored event.
    pub fn append(&mut self, category: EventCategory, message: impl Into<String>) -> Event {
        let event = Event {
            sequence_id: self.next_id,
            timestamp: Utc::now(),
            category,
            message: message.into(),
        };
        self.next_id = self.next_id.next();

        self.entries.push_back(event.clone());
        while self.entries.len() > self.capacity {
            if self.entries.pop_front().is_some() {
                self.evicted = self.evicted.saturating_add(1);
            }
        }
        event
    }

    /// Copy of every retained event, oldest first.
    pub fn snapshot(&self) -> Vec<Event> {
        self.entries.iter().cloned().collect()
    }

    /// Iterate over retained events, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.entries.iter()
    }

    /// Number of retained events.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log holds no events.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of retained events.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of events dropped by eviction so far.
    pub const fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Sequence id of the newest event, if any event was ever appended.
    pub fn last_sequence_id(&self) -> Option<SequenceId> {
        self.entries.back().map(|e| e.sequence_id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn ids_start_at_one() {
        let mut log = EventLog::new(10);
        let first = log.append(EventCategory::System, "boot");
        assert_eq!(first.sequence_id, SequenceId(1));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn eviction_keeps_last_capacity_entries_without_gaps() {
        let capacity = 5;
        let appends = 23_u64;
        let mut log = EventLog::new(capacity);
        for i in 0..appends {
            log.append(EventCategory::Progress, format!("step {i}"));
        }

        assert_eq!(log.len(), capacity);
        assert_eq!(log.last_sequence_id(), Some(SequenceId(appends)));
        assert_eq!(log.evicted(), appends - 5);

        let ids: Vec<u64> = log.iter().map(|e| e.sequence_id.get()).collect();
        assert_eq!(ids, vec![19, 20, 21, 22, 23]);
    }

    #[test]
    fn ids_are_never_reused_after_eviction() {
        let mut log = EventLog::new(1);
        log.append(EventCategory::System, "a");
        log.append(EventCategory::System, "b");
        let c = log.append(EventCategory::System, "c");
        assert_eq!(c.sequence_id, SequenceId(3));
        assert_eq!(log.snapshot().len(), 1);
    }

    #[test]
    fn snapshot_preserves_order_and_categories() {
        let mut log = EventLog::new(10);
        log.append(EventCategory::System, "one");
        log.append(EventCategory::Progress, "two");
        log.append(EventCategory::Error, "three");

        let snapshot = log.snapshot();
        let categories: Vec<_> = snapshot.iter().map(|e| e.category).collect();
        assert_eq!(
            categories,
            vec![
                EventCategory::System,
                EventCategory::Progress,
                EventCategory::Error
            ]
        );
        assert_eq!(snapshot.last().unwrap().message, "three");
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut log = EventLog::new(0);
        log.append(EventCategory::System, "only");
        assert_eq!(log.capacity(), 1);
        assert_eq!(log.len(), 1);
    }
}

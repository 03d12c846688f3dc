//! Telemetry hub: the event log plus fan-out to connected observers.
//!
//! Every [`append`](TelemetryHub::append) stores the event and pushes a
//! [`ServerMessage::Progress`] to each observer with a non-blocking
//! `try_send`. Each observer owns a bounded channel; when it is full or
//! closed the observer is unsubscribed on the spot and the hub moves on.
//! No observer can ever block an append.
//!
//! # Ordering
//!
//! The log and the observer registry sit behind a single mutex. Sequence
//! ids are assigned, and messages queued, while that mutex is held, so:
//!
//! - appends are totally ordered in call order;
//! - each observer receives ids in strictly increasing order;
//! - [`subscribe`](TelemetryHub::subscribe) takes its snapshot and
//!   registers under the same lock, so nothing falls between the snapshot
//!   and the live stream.
//!
//! The mutex is never held across an `.await`.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use vigil_types::{CandidateRecord, Event, EventCategory, MissionState, ServerMessage};

use crate::event_log::EventLog;

/// Identifier of a subscribed observer, unique for the hub's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObserverId(u64);

impl core::fmt::Display for ObserverId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "observer-{}", self.0)
    }
}

/// A freshly subscribed observer.
///
/// `snapshot` is the exact log content at subscribe time; `receiver`
/// yields every message pushed afterwards. When the hub drops the
/// observer, `receiver` returns `None` once drained.
#[derive(Debug)]
pub struct ObserverHandle {
    /// Identifier to pass to [`TelemetryHub::unsubscribe`].
    pub id: ObserverId,
    /// Events retained at subscribe time, oldest first.
    pub snapshot: Vec<Event>,
    /// Live stream of subsequent messages.
    pub receiver: mpsc::Receiver<ServerMessage>,
}

#[derive(Debug)]
struct HubInner {
    log: EventLog,
    observers: BTreeMap<ObserverId, mpsc::Sender<ServerMessage>>,
    next_observer: u64,
    last_round: Vec<CandidateRecord>,
}

impl HubInner {
    /// Queue `message` on every observer, dropping the ones that refuse it.
    fn fan_out(&mut self, message: &ServerMessage) -> usize {
        let mut dropped = Vec::new();
        for (id, tx) in &self.observers {
            if let Err(e) = tx.try_send(message.clone()) {
                let reason = match e {
                    mpsc::error::TrySendError::Full(_) => "buffer full",
                    mpsc::error::TrySendError::Closed(_) => "disconnected",
                };
                debug!(observer = %id, reason, "dropping observer");
                dropped.push(*id);
            }
        }
        for id in &dropped {
            self.observers.remove(id);
        }
        self.observers.len()
    }
}

/// Pub/sub broadcaster over a bounded event log.
#[derive(Debug)]
pub struct TelemetryHub {
    inner: Mutex<HubInner>,
    observer_buffer: usize,
}

impl TelemetryHub {
    /// Create a hub retaining `log_capacity` events and buffering up to
    /// `observer_buffer` messages per observer.
    pub fn new(log_capacity: usize, observer_buffer: usize) -> Self {
        Self {
            inner: Mutex::new(HubInner {
                log: EventLog::new(log_capacity),
                observers: BTreeMap::new(),
                next_observer: 0,
                last_round: Vec::new(),
            }),
            observer_buffer: observer_buffer.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HubInner> {
        // A panic while holding the lock cannot leave the log half-written:
        // every mutation is a single push/pop. Keep serving.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an event and push it to every observer.
    pub fn append(&self, category: EventCategory, message: impl Into<String>) -> Event {
        let (event, receivers) = {
            let mut inner = self.lock();
            let event = inner.log.append(category, message);
            let receivers = inner.fan_out(&ServerMessage::Progress(event.clone()));
            (event, receivers)
        };
        trace_event(&event, receivers);
        event
    }

    /// Register a new observer and return the current log snapshot with it.
    pub fn subscribe(&self) -> ObserverHandle {
        let (tx, receiver) = mpsc::channel(self.observer_buffer);
        let mut inner = self.lock();
        let id = ObserverId(inner.next_observer);
        inner.next_observer = inner.next_observer.saturating_add(1);
        let snapshot = inner.log.snapshot();
        inner.observers.insert(id, tx);
        debug!(observer = %id, backlog = snapshot.len(), "observer subscribed");
        ObserverHandle {
            id,
            snapshot,
            receiver,
        }
    }

    /// Remove an observer. Returns whether it was still registered.
    ///
    /// Calling this for an unknown or already removed observer is a no-op.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let removed = self.lock().observers.remove(&id).is_some();
        if removed {
            debug!(observer = %id, "observer unsubscribed");
        }
        removed
    }

    /// Push the records of an evaluation round and remember them for
    /// [`last_round`](Self::last_round).
    pub fn broadcast_candidates(&self, candidates: &[CandidateRecord]) -> usize {
        let mut inner = self.lock();
        inner.last_round = candidates.to_vec();
        inner.fan_out(&ServerMessage::Candidates {
            candidates: candidates.to_vec(),
        })
    }

    /// Push a mission status snapshot to every observer.
    pub fn broadcast_status(&self, mission: &MissionState) -> usize {
        self.lock().fan_out(&ServerMessage::Status {
            mission: mission.clone(),
        })
    }

    /// Record a message from an observer and acknowledge it.
    ///
    /// Appends the text as a [`EventCategory::UserMessage`] event followed
    /// by a [`EventCategory::System`] acknowledgement, and returns the
    /// acknowledgement text for the caller to send back.
    pub fn acknowledge_user_message(&self, text: &str) -> String {
        let received = self.append(EventCategory::UserMessage, text);
        let reply = format!("Message {} received", received.sequence_id);
        self.append(EventCategory::System, reply.clone());
        reply
    }

    /// Copy of every retained event, oldest first.
    pub fn snapshot(&self) -> Vec<Event> {
        self.lock().log.snapshot()
    }

    /// Candidate records of the most recent evaluation round.
    pub fn last_round(&self) -> Vec<CandidateRecord> {
        self.lock().last_round.clone()
    }

    /// Number of currently registered observers.
    pub fn observer_count(&self) -> usize {
        self.lock().observers.len()
    }
}

/// Mirror an appended event into the process log.
fn trace_event(event: &Event, receivers: usize) {
    let seq = event.sequence_id.get();
    let category = event.category.as_str();
    match event.category {
        EventCategory::Error => {
            error!(seq, category, receivers, "{}", event.message);
        }
        EventCategory::Healing => {
            warn!(seq, category, receivers, "{}", event.message);
        }
        EventCategory::System
        | EventCategory::Progress
        | EventCategory::Success
        | EventCategory::SelfModify => {
            info!(seq, category, receivers, "{}", event.message);
        }
        EventCategory::UserMessage => {
            debug!(seq, category, receivers, "{}", event.message);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use vigil_types::{CandidateStatus, SequenceId};

    use super::*;

    fn expect_progress(msg: Option<ServerMessage>) -> Event {
        match msg {
            Some(ServerMessage::Progress(event)) => event,
            other => panic!("expected progress message, got {other:?}"),
        }
    }

    #[test]
    fn subscribe_returns_exact_snapshot() {
        let hub = TelemetryHub::new(10, 8);
        hub.append(EventCategory::System, "boot");
        hub.append(EventCategory::Progress, "gate build passed");
        hub.append(EventCategory::Error, "gate lint failed");

        let handle = hub.subscribe();
        let categories: Vec<_> = handle.snapshot.iter().map(|e| e.category).collect();
        let ids: Vec<_> = handle.snapshot.iter().map(|e| e.sequence_id).collect();

        assert_eq!(
            categories,
            vec![
                EventCategory::System,
                EventCategory::Progress,
                EventCategory::Error
            ]
        );
        assert_eq!(ids, vec![SequenceId(1), SequenceId(2), SequenceId(3)]);
    }

    #[test]
    fn observer_sees_every_later_event_in_order() {
        let hub = TelemetryHub::new(3, 16);
        for i in 0..5 {
            hub.append(EventCategory::Progress, format!("before {i}"));
        }
        let mut handle = hub.subscribe();
        assert_eq!(handle.snapshot.first().unwrap().sequence_id, SequenceId(3));

        for i in 0..4 {
            hub.append(EventCategory::Progress, format!("after {i}"));
        }

        let mut last = handle.snapshot.last().unwrap().sequence_id;
        for _ in 0..4 {
            let event = expect_progress(handle.receiver.try_recv().ok());
            assert_eq!(event.sequence_id, last.next());
            last = event.sequence_id;
        }
        assert!(handle.receiver.try_recv().is_err());
    }

    #[test]
    fn slow_observer_is_dropped_without_affecting_others() {
        let hub = TelemetryHub::new(100, 2);
        let mut slow = hub.subscribe();
        let mut fast = hub.subscribe();

        for i in 0..5 {
            hub.append(EventCategory::Progress, format!("event {i}"));
            // Drain the fast observer after each append.
            let event = expect_progress(fast.receiver.try_recv().ok());
            assert_eq!(event.message, format!("event {i}"));
        }

        assert_eq!(hub.observer_count(), 1);

        // The slow observer keeps what was buffered, then sees the close.
        assert!(slow.receiver.try_recv().is_ok());
        assert!(slow.receiver.try_recv().is_ok());
        assert!(matches!(
            slow.receiver.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn disconnected_observer_is_dropped_on_next_append() {
        let hub = TelemetryHub::new(10, 4);
        let handle = hub.subscribe();
        drop(handle.receiver);
        assert_eq!(hub.observer_count(), 1);

        hub.append(EventCategory::System, "tick");
        assert_eq!(hub.observer_count(), 0);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let hub = TelemetryHub::new(10, 4);
        let handle = hub.subscribe();
        assert!(hub.unsubscribe(handle.id));
        assert!(!hub.unsubscribe(handle.id));
        assert_eq!(hub.observer_count(), 0);
    }

    #[test]
    fn candidates_are_broadcast_and_remembered() {
        let hub = TelemetryHub::new(10, 4);
        let mut handle = hub.subscribe();
        let mut record = CandidateRecord::pending("a", "first");
        record.status = CandidateStatus::Completed;
        record.score = 90;

        let receivers = hub.broadcast_candidates(std::slice::from_ref(&record));
        assert_eq!(receivers, 1);
        assert_eq!(hub.last_round(), vec![record.clone()]);
        match handle.receiver.try_recv().ok() {
            Some(ServerMessage::Candidates { candidates }) => {
                assert_eq!(candidates, vec![record]);
            }
            other => panic!("expected candidates message, got {other:?}"),
        }
    }

    #[test]
    fn user_message_is_logged_and_acknowledged() {
        let hub = TelemetryHub::new(10, 4);
        let reply = hub.acknowledge_user_message("how is it going?");
        assert_eq!(reply, "Message #1 received");

        let snapshot = hub.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].category, EventCategory::UserMessage);
        assert_eq!(snapshot[0].message, "how is it going?");
        assert_eq!(snapshot[1].category, EventCategory::System);
    }
}

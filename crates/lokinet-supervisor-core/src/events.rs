//! Lifecycle event log and subscriptions.
//!
//! Every event is kept in a bounded diagnostic ring and pushed to each live
//! subscriber over an unbounded channel, so a slow subscriber never loses
//! an event.

use std::collections::VecDeque;

use tokio::sync::mpsc;

use crate::types::{LifecycleEvent, SupervisorState, TransitionCause};

/// Receiver side of a lifecycle subscription.
pub type EventReceiver = mpsc::UnboundedReceiver<LifecycleEvent>;

/// Bounded event history plus subscriber fan-out.
///
/// Not synchronized on its own; the supervisor keeps it under its state lock
/// so event order always matches transition order.
#[derive(Debug)]
pub struct EventLog {
    capacity: usize,
    next_sequence: u64,
    history: VecDeque<LifecycleEvent>,
    subscribers: Vec<mpsc::UnboundedSender<LifecycleEvent>>,
}

impl EventLog {
    /// Creates an empty log keeping at most `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            next_sequence: 0,
            history: VecDeque::with_capacity(capacity.min(1024)),
            subscribers: Vec::new(),
        }
    }

    /// Records a transition and delivers it to subscribers.
    pub fn record(
        &mut self,
        from: SupervisorState,
        to: SupervisorState,
        cause: TransitionCause,
        generation: u64,
    ) -> LifecycleEvent {
        let event = LifecycleEvent::now(self.next_sequence, from, to, cause, generation);
        self.next_sequence += 1;

        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(event.clone());

        // Dropped receivers are pruned here
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());

        event
    }

    /// Registers a new subscriber. It sees every event recorded from now on.
    pub fn subscribe(&mut self) -> EventReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    /// Returns the retained history, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<LifecycleEvent> {
        self.history.iter().cloned().collect()
    }

    /// Returns the most recent event.
    #[must_use]
    pub fn last(&self) -> Option<&LifecycleEvent> {
        self.history.back()
    }

    /// Returns the total number of events ever recorded.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.next_sequence
    }

    /// Returns the number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SupervisorState::{Running, Starting, Stopped};

    #[test]
    fn test_record_assigns_sequence() {
        let mut log = EventLog::new(8);
        let a = log.record(Stopped, Starting, TransitionCause::StartRequested, 0);
        let b = log.record(Starting, Running, TransitionCause::Spawned { pid: 1 }, 1);

        assert_eq!(a.sequence, 0);
        assert_eq!(b.sequence, 1);
        assert_eq!(log.total(), 2);
        assert_eq!(log.last(), Some(&b));
    }

    #[test]
    fn test_history_is_bounded() {
        let mut log = EventLog::new(2);
        for _ in 0..5 {
            log.record(Stopped, Starting, TransitionCause::StartRequested, 0);
        }

        let history = log.snapshot();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].sequence, 3);
        assert_eq!(history[1].sequence, 4);
        assert_eq!(log.total(), 5);
    }

    #[test]
    fn test_subscriber_receives_every_event() {
        let mut log = EventLog::new(1);
        let mut rx = log.subscribe();

        for _ in 0..10 {
            log.record(Stopped, Starting, TransitionCause::StartRequested, 0);
        }

        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            seen.push(event.sequence);
        }
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_dropped_subscriber_pruned() {
        let mut log = EventLog::new(4);
        let rx = log.subscribe();
        let _keep = log.subscribe();
        assert_eq!(log.subscriber_count(), 2);

        drop(rx);
        log.record(Stopped, Starting, TransitionCause::StartRequested, 0);
        assert_eq!(log.subscriber_count(), 1);
    }

    #[test]
    fn test_late_subscriber_sees_only_new_events() {
        let mut log = EventLog::new(4);
        log.record(Stopped, Starting, TransitionCause::StartRequested, 0);

        let mut rx = log.subscribe();
        assert!(rx.try_recv().is_err());

        log.record(Starting, Running, TransitionCause::Spawned { pid: 9 }, 1);
        assert_eq!(rx.try_recv().unwrap().to, Running);
    }
}

//! Typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::Manipulation`] | Attach / place edge events from the manipulator |
//! | [`Topic::Outcomes`] | One [`ExecutionOutcome`][errand_types::ExecutionOutcome] per executed action |
//! | [`Topic::WorldUpdates`] | Every [`UpdateRecord`][errand_types::UpdateRecord] as it is recorded |
//! | [`Topic::Reports`] | Operator-facing report lines |
//!
//! # Subscription lifetime
//!
//! A subscription is a [`TopicReceiver`].  It starts receiving at the moment
//! it is created and is detached exactly when it is dropped; there is no
//! separate unsubscribe call to get wrong.

use errand_types::{Event, EventPayload};
use tokio::sync::broadcast;
use tracing::warn;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Edge-triggered attach / place signals.
    Manipulation,
    /// Terminal per-action outcomes.
    Outcomes,
    /// World mutations recorded by the state machines.
    WorldUpdates,
    /// Messages shown to the operator.
    Reports,
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    manipulation: broadcast::Sender<Event>,
    outcomes: broadcast::Sender<Event>,
    world_updates: broadcast::Sender<Event>,
    reports: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every topic channel independently.
    pub fn new(capacity: usize) -> Self {
        let (manipulation, _) = broadcast::channel(capacity);
        let (outcomes, _) = broadcast::channel(capacity);
        let (world_updates, _) = broadcast::channel(capacity);
        let (reports, _) = broadcast::channel(capacity);
        Self {
            manipulation,
            outcomes,
            world_updates,
            reports,
        }
    }

    /// Publish `event` to the given [`Topic`] channel.
    ///
    /// Returns the number of active receivers that were handed the event;
    /// `0` when nobody is listening, which is a normal condition.
    pub fn publish_to(&self, topic: Topic, event: Event) -> usize {
        self.topic_sender(topic).send(event).unwrap_or(0)
    }

    /// Wrap `payload` in an [`Event`] stamped with `source` and publish it.
    pub fn emit(&self, topic: Topic, source: &str, payload: EventPayload) -> usize {
        self.publish_to(topic, Event::new(source, payload))
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    /// Number of live subscriptions on `topic`.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topic_sender(topic).receiver_count()
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Manipulation => &self.manipulation,
            Topic::Outcomes => &self.outcomes,
            Topic::WorldUpdates => &self.world_updates,
            Topic::Reports => &self.reports,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Topic-based receiver
// ---------------------------------------------------------------------------

/// A receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
#[derive(Debug)]
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(broadcast::error::RecvError::Lagged(n))` – the subscriber fell
    ///   behind and `n` messages were dropped.
    /// * `Err(broadcast::error::RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Drain every event currently buffered without waiting.
    ///
    /// Lag is logged and skipped over; a closed channel simply ends the
    /// drain.
    pub fn drain(&mut self) -> Vec<Event> {
        let mut out = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(event) => out.push(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "topic receiver lagged");
                }
                Err(broadcast::error::TryRecvError::Empty)
                | Err(broadcast::error::TryRecvError::Closed) => break,
            }
        }
        out
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use errand_types::Severity;

    fn make_event(text: &str) -> Event {
        Event::new(
            "errand-middleware::test",
            EventPayload::Report {
                text: text.to_string(),
                severity: Severity::Info,
            },
        )
    }

    #[test]
    fn publish_without_subscribers_is_not_an_error() {
        let bus = EventBus::default();
        assert_eq!(bus.publish_to(Topic::Reports, make_event("nobody")), 0);
    }

    /// Two independent subscribers on the same topic both receive the event.
    #[tokio::test]
    async fn topic_multiple_subscribers_receive_same_event() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut subscriber1 = bus.subscribe_to(Topic::Outcomes);
        let mut subscriber2 = bus.subscribe_to(Topic::Outcomes);

        let event = make_event("step done");
        assert_eq!(bus.publish_to(Topic::Outcomes, event.clone()), 2);

        assert_eq!(subscriber1.recv().await?.id, event.id);
        assert_eq!(subscriber2.recv().await?.id, event.id);
        Ok(())
    }

    /// A subscriber on one topic never sees traffic from another.
    #[tokio::test]
    async fn topic_subscriber_does_not_receive_other_topic_events() {
        let bus = EventBus::default();
        let mut reports = bus.subscribe_to(Topic::Reports);

        bus.emit(
            Topic::Manipulation,
            "errand-hal::sim",
            EventPayload::Attached {
                object: "laptop".into(),
            },
        );

        let result =
            tokio::time::timeout(std::time::Duration::from_millis(50), reports.recv()).await;
        assert!(result.is_err(), "Reports subscriber must not receive a Manipulation event");
    }

    #[test]
    fn drain_returns_buffered_events_in_order() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe_to(Topic::Reports);
        bus.publish_to(Topic::Reports, make_event("a"));
        bus.publish_to(Topic::Reports, make_event("b"));

        let drained = rx.drain();
        assert_eq!(drained.len(), 2);
        assert!(matches!(&drained[0].payload, EventPayload::Report { text, .. } if text == "a"));
        assert!(rx.drain().is_empty());
    }

    #[test]
    fn dropping_receiver_unsubscribes_exactly() {
        let bus = EventBus::default();
        let first = bus.subscribe_to(Topic::Manipulation);
        let second = bus.subscribe_to(Topic::Manipulation);
        assert_eq!(bus.subscriber_count(Topic::Manipulation), 2);
        drop(first);
        assert_eq!(bus.subscriber_count(Topic::Manipulation), 1);
        drop(second);
        assert_eq!(bus.subscriber_count(Topic::Manipulation), 0);
    }

    /// Flooding a low-capacity channel while a subscriber sleeps must produce
    /// a `Lagged` error rather than panicking or blocking.
    #[tokio::test]
    async fn topic_channel_lag_on_slow_subscriber() {
        let bus = EventBus::new(16);
        let mut slow_sub = bus.subscribe_to(Topic::WorldUpdates);

        for _ in 0..1_000 {
            bus.publish_to(Topic::WorldUpdates, make_event("flood"));
        }

        let result = slow_sub.recv().await;
        assert!(
            matches!(result, Err(broadcast::error::RecvError::Lagged(_))),
            "expected Lagged error, got: {result:?}"
        );
        // Draining after lag still yields the retained tail.
        assert!(!slow_sub.drain().is_empty());
    }
}

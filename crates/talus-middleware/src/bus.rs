//! Topic-partitioned publish/subscribe bus for operator-facing traffic.
//!
//! Each [`Topic`] is its own [`tokio::sync::broadcast`] channel, so a slow
//! telemetry consumer can never delay a safety alert.  Publishing with
//! nobody listening is normal for a headless robot and returns `Ok(0)`.
//!
//! | Topic | Traffic |
//! |---|---|
//! | [`Topic::Telemetry`] | Per-iteration pose, battery, mode and margin |
//! | [`Topic::SafetyAlerts`] | Safety faults that forced a stop or return |
//! | [`Topic::MissionEvents`] | Mission status changes, findings, navigation failures |
//!
//! # Example
//!
//! ```rust
//! use talus_middleware::{EventBus, Topic};
//! use talus_types::{Event, EventPayload, SafetyCondition};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let bus = EventBus::default();
//! let mut alerts = bus.subscribe_to(Topic::SafetyAlerts);
//!
//! let fault = SafetyCondition::CliffEdge { distance: 0.4 };
//! bus.publish_to(Topic::SafetyAlerts, Event::new("doc", EventPayload::SafetyFault(fault)))
//!     .unwrap();
//!
//! let event = alerts.recv().await.unwrap();
//! assert!(matches!(event.payload, EventPayload::SafetyFault(_)));
//! # }
//! ```

use talus_types::{Event, TalusError};
use tokio::sync::broadcast;
use tracing::warn;

/// Events buffered per topic before slow subscribers start lagging.
const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Telemetry,
    SafetyAlerts,
    MissionEvents,
}

/// Shared event bus.  Clones share the same channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    telemetry: broadcast::Sender<Event>,
    safety_alerts: broadcast::Sender<Event>,
    mission_events: broadcast::Sender<Event>,
}

impl EventBus {
    /// `capacity` applies to each topic independently.
    ///
    /// # Errors
    ///
    /// [`TalusError::Config`] for a zero capacity.
    pub fn new(capacity: usize) -> Result<Self, TalusError> {
        if capacity == 0 {
            return Err(TalusError::Config("event bus capacity must be non-zero".to_string()));
        }
        let (telemetry, _) = broadcast::channel(capacity);
        let (safety_alerts, _) = broadcast::channel(capacity);
        let (mission_events, _) = broadcast::channel(capacity);
        Ok(Self {
            telemetry,
            safety_alerts,
            mission_events,
        })
    }

    /// Publish to one topic and return how many subscribers received it.
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, TalusError> {
        let sender = self.topic_sender(topic);
        if sender.receiver_count() == 0 {
            return Ok(0);
        }
        sender
            .send(event)
            .map_err(|e| TalusError::Channel(format!("{topic:?} send failed: {e}")))
    }

    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topic_sender(topic).receiver_count()
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Telemetry => &self.telemetry,
            Topic::SafetyAlerts => &self.safety_alerts,
            Topic::MissionEvents => &self.mission_events,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        let (telemetry, _) = broadcast::channel(DEFAULT_CAPACITY);
        let (safety_alerts, _) = broadcast::channel(DEFAULT_CAPACITY);
        let (mission_events, _) = broadcast::channel(DEFAULT_CAPACITY);
        Self {
            telemetry,
            safety_alerts,
            mission_events,
        }
    }
}

// ---------------------------------------------------------------------------
// Receiver
// ---------------------------------------------------------------------------

/// Async receiver bound to a single [`Topic`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Next event on this topic.
    ///
    /// `Err(RecvError::Lagged(n))` means `n` events were dropped because this
    /// receiver fell behind; `Err(RecvError::Closed)` means every sender is
    /// gone.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Next event whose `source` starts with `prefix`, skipping over lag.
    /// `None` once the bus is closed.
    pub async fn recv_from(&mut self, prefix: &str) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.source.starts_with(prefix) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "topic receiver lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use talus_types::{EventPayload, NavigationState, Pose, RobotMode, SafetyCondition, TelemetryData};

    fn telemetry(source: &str) -> Event {
        Event::new(
            source,
            EventPayload::Telemetry(TelemetryData {
                pose: Pose::new(1.0, 2.0, 0.12),
                battery_level: 90.0,
                mode: RobotMode::Walking,
                stability_margin: 0.5,
                navigation_state: NavigationState::Executing,
            }),
        )
    }

    #[test]
    fn publish_without_subscribers_is_not_an_error() {
        let bus = EventBus::default();
        assert_eq!(bus.publish_to(Topic::Telemetry, telemetry("test")).unwrap(), 0);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(EventBus::new(0), Err(TalusError::Config(_))));
    }

    #[tokio::test]
    async fn every_subscriber_receives_the_event() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut a = bus.subscribe_to(Topic::MissionEvents);
        let mut b = bus.subscribe_to(Topic::MissionEvents);
        assert_eq!(bus.subscriber_count(Topic::MissionEvents), 2);

        let event = telemetry("talus-mission::controller");
        assert_eq!(bus.publish_to(Topic::MissionEvents, event.clone())?, 2);

        assert_eq!(a.recv().await?.id, event.id);
        assert_eq!(b.recv().await?.id, event.id);
        Ok(())
    }

    #[tokio::test]
    async fn topics_are_isolated() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut alerts = bus.subscribe_to(Topic::SafetyAlerts);
        let _telemetry = bus.subscribe_to(Topic::Telemetry);

        bus.publish_to(Topic::Telemetry, telemetry("loop"))?;

        let result =
            tokio::time::timeout(std::time::Duration::from_millis(50), alerts.recv()).await;
        assert!(result.is_err(), "safety alerts must not see telemetry");
        assert_eq!(alerts.topic(), Topic::SafetyAlerts);
        Ok(())
    }

    #[tokio::test]
    async fn recv_from_filters_by_source() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut rx = bus.subscribe_to(Topic::SafetyAlerts);

        let fault = |src: &str| {
            Event::new(
                src,
                EventPayload::SafetyFault(SafetyCondition::StabilityLoss { margin: 0.05 }),
            )
        };
        bus.publish_to(Topic::SafetyAlerts, fault("sim::vision"))?;
        let wanted = fault("talus-mission::safety");
        bus.publish_to(Topic::SafetyAlerts, wanted.clone())?;

        let got = rx.recv_from("talus-mission").await.ok_or("bus closed")?;
        assert_eq!(got.id, wanted.id);
        Ok(())
    }

    #[tokio::test]
    async fn slow_subscriber_lags_instead_of_blocking() {
        let bus = EventBus::new(16).unwrap();
        let mut slow = bus.subscribe_to(Topic::Telemetry);
        for _ in 0..1_000 {
            let _ = bus.publish_to(Topic::Telemetry, telemetry("flood"));
        }
        let result = slow.recv().await;
        assert!(
            matches!(result, Err(broadcast::error::RecvError::Lagged(_))),
            "expected Lagged, got {result:?}"
        );
    }
}

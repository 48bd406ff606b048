//! Notification sink for expiration events.
//!
//! The engine emits an event after every successful expiry and once at the end
//! of each pass. Emission is fire-and-forget: nothing the sink does can fail
//! or slow down a pass beyond the call itself.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │ ExpirationEngine │────>│    EventSink    │────>│   Subscribers   │
//! │  (per record)    │     │ (EventBus, ...) │     │ (host handlers) │
//! └──────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! let bus = Arc::new(EventBus::new());
//! let mut rx = bus.subscribe();
//! let expirer = Expirer::builder(store, scheduler).event_sink(bus.clone()).build();
//!
//! while let Ok(event) = rx.recv().await {
//!     // Handle event
//! }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{
    expiration::ExpirationAction,
    store::{Record, RecordId},
};

/// Default channel capacity for the event bus.
/// This determines how many events can be buffered before slow receivers
/// start missing events (lagging).
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Events emitted by the expiration engine.
///
/// Uses `event_type` as the discriminator tag, producing JSON like:
/// ```json
/// { "event_type": "record_expired", "record_id": 42, "action": "draft", ... }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum ExpirationEvent {
    /// A record expired and its policy action was applied.
    RecordExpired {
        pass_id: Uuid,
        timestamp: DateTime<Utc>,
        record_id: RecordId,
        record_type: String,
        action: ExpirationAction,
        /// The record as it was fetched, before the action was applied.
        record: Option<Record>,
    },

    /// A scan pass finished (successfully or with swallowed failures).
    PassCompleted {
        pass_id: Uuid,
        timestamp: DateTime<Utc>,
        expired: u64,
        failed: u64,
        duration_ms: u64,
    },
}

impl ExpirationEvent {
    /// Get the event type name as a string.
    pub fn event_type(&self) -> &'static str {
        match self {
            ExpirationEvent::RecordExpired { .. } => "record_expired",
            ExpirationEvent::PassCompleted { .. } => "pass_completed",
        }
    }

    pub fn pass_id(&self) -> Uuid {
        match self {
            ExpirationEvent::RecordExpired { pass_id, .. }
            | ExpirationEvent::PassCompleted { pass_id, .. } => *pass_id,
        }
    }
}

/// Receiver of expiration notifications.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ExpirationEvent);
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: ExpirationEvent) {}
}

/// Sink that keeps every event in memory, in emission order.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<ExpirationEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ExpirationEvent> {
        self.events.lock().clone()
    }

    /// Record ids from every `RecordExpired` event so far.
    pub fn expired_ids(&self) -> Vec<RecordId> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                ExpirationEvent::RecordExpired { record_id, .. } => Some(*record_id),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: ExpirationEvent) {
        self.events.lock().push(event);
    }
}

/// Central event bus for broadcasting expiration events.
///
/// Uses a tokio broadcast channel to allow multiple subscribers to receive
/// the same events. Events are cloned for each subscriber.
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<ExpirationEvent>,
    /// Counter for total events published (for metrics)
    events_published: AtomicU64,
    /// Counter for events dropped due to no subscribers
    events_dropped: AtomicU64,
}

impl EventBus {
    /// Create a new event bus with the default channel capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new event bus with a custom channel capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            events_published: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
        }
    }

    /// Publish an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event.
    /// If there are no subscribers, the event is dropped and 0 is returned.
    pub fn publish(&self, event: ExpirationEvent) -> usize {
        self.events_published.fetch_add(1, Ordering::Relaxed);

        match self.sender.send(event) {
            Ok(count) => count,
            Err(_) => {
                self.events_dropped.fetch_add(1, Ordering::Relaxed);
                0
            }
        }
    }

    /// Subscribe to events from this bus.
    ///
    /// If the receiver falls behind, it will receive `RecvError::Lagged`
    /// indicating how many events were missed.
    pub fn subscribe(&self) -> broadcast::Receiver<ExpirationEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }

    pub fn events_dropped(&self) -> u64 {
        self.events_dropped.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for EventBus {
    fn emit(&self, event: ExpirationEvent) {
        self.publish(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expired_event(id: u64) -> ExpirationEvent {
        ExpirationEvent::RecordExpired {
            pass_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            record_id: RecordId(id),
            record_type: "post".to_string(),
            action: ExpirationAction::Draft,
            record: None,
        }
    }

    #[test]
    fn test_event_type_names() {
        assert_eq!(expired_event(1).event_type(), "record_expired");

        let completed = ExpirationEvent::PassCompleted {
            pass_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            expired: 3,
            failed: 0,
            duration_ms: 12,
        };
        assert_eq!(completed.event_type(), "pass_completed");
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_value(expired_event(42)).unwrap();
        assert_eq!(json["event_type"], "record_expired");
        assert_eq!(json["record_id"], 42);
        assert_eq!(json["action"], "draft");
        assert_eq!(json["record_type"], "post");

        let back: ExpirationEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.event_type(), "record_expired");
    }

    #[test]
    fn test_event_bus_publish_no_subscribers() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(expired_event(1)), 0);
        assert_eq!(bus.events_published(), 1);
        assert_eq!(bus.events_dropped(), 1);
    }

    #[tokio::test]
    async fn test_event_bus_subscribe_and_receive() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.emit(expired_event(7));
        assert_eq!(bus.events_published(), 1);
        assert_eq!(bus.events_dropped(), 0);

        for rx in [&mut rx1, &mut rx2] {
            match rx.recv().await.unwrap() {
                ExpirationEvent::RecordExpired { record_id, .. } => {
                    assert_eq!(record_id, RecordId(7))
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_event_bus_lagged_subscriber() {
        let bus = EventBus::with_capacity(2);
        let mut rx = bus.subscribe();

        for id in 0..5 {
            bus.publish(expired_event(id));
        }

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
    }

    #[test]
    fn test_memory_sink_collects_in_order() {
        let sink = MemorySink::new();
        sink.emit(expired_event(1));
        sink.emit(expired_event(2));
        sink.emit(ExpirationEvent::PassCompleted {
            pass_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            expired: 2,
            failed: 0,
            duration_ms: 1,
        });

        assert_eq!(sink.events().len(), 3);
        assert_eq!(sink.expired_ids(), vec![RecordId(1), RecordId(2)]);

        sink.clear();
        assert!(sink.events().is_empty());
    }
}

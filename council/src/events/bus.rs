//! Event bus for council runs
//!
//! Pub/sub over a Tokio broadcast channel. Publishing never blocks the
//! caller and having no subscribers is not an error.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use super::types::CouncilEvent;

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Shared reference to EventBus
pub type SharedEventBus = Arc<EventBus>;

/// Broadcast event bus
pub struct EventBus {
    sender: broadcast::Sender<CouncilEvent>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self::with_capacity(CHANNEL_CAPACITY)
    }

    /// Create an event bus that buffers up to `capacity` events per subscriber
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Create a shared reference to this event bus
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: CouncilEvent) {
        let event_type = event.event_type();
        match self.sender.send(event) {
            Ok(count) => debug!(event_type, receivers = count, "Event published"),
            Err(_) => debug!(event_type, "Event published (no receivers)"),
        }
    }

    /// Subscribe to receive events
    pub fn subscribe(&self) -> broadcast::Receiver<CouncilEvent> {
        self.sender.subscribe()
    }

    /// Get the number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Drain every event currently buffered on `receiver` without waiting.
pub fn drain(receiver: &mut broadcast::Receiver<CouncilEvent>) -> Vec<CouncilEvent> {
    let mut events = Vec::new();
    loop {
        match receiver.try_recv() {
            Ok(event) => events.push(event),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn stage_completed(stage_id: u32) -> CouncilEvent {
        CouncilEvent::StageCompleted {
            stage_id,
            role: "r".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(stage_completed(1));
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new().shared();
        let mut rx = bus.subscribe();

        bus.publish(stage_completed(4));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.stage_id(), Some(4));
    }

    #[test]
    fn test_drain_collects_buffered() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(stage_completed(1));
        bus.publish(stage_completed(2));

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(drain(&mut rx).is_empty());
    }
}

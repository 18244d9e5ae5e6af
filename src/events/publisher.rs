use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::state_machine::effects::Effect;

/// Broadcast publisher for committed lifecycle events
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<DomainEvent>,
}

/// Event that has been published
#[derive(Debug, Clone, Serialize)]
pub struct DomainEvent {
    /// Dotted action name, e.g. `service_order.status_changed`
    pub name: String,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub actor_id: Uuid,
    pub context: Value,
    pub published_at: DateTime<Utc>,
}

impl DomainEvent {
    pub fn from_effect(effect: &Effect, actor_id: Uuid) -> Self {
        Self {
            name: effect.action().to_string(),
            entity_type: effect.entity_type().to_string(),
            entity_id: effect.entity_id(),
            actor_id,
            context: effect.event_context(),
            published_at: Utc::now(),
        }
    }
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: DomainEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("No event subscribers; event dropped");
        }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1000)
    }
}

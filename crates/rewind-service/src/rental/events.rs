//! In-process rental event bus.

use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use rewind_core::events::{DomainEvent, RentalEvent};

/// Broadcast channel for rental events.
///
/// Publishing never fails: an event with no subscribers is dropped, and a
/// subscriber that falls more than `capacity` events behind sees a lag
/// error on its next receive.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish a rental event caused by `actor`.
    pub fn publish(&self, actor: Option<Uuid>, event: RentalEvent) {
        let rental_id = event.rental_id();
        if self.tx.send(DomainEvent::rental(actor, event)).is_err() {
            debug!(rental_id = %rental_id, "No event subscribers");
        }
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

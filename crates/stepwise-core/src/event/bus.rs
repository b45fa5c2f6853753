//! Broadcast event bus for distributing `WorkflowEvent` to multiple subscribers.
//!
//! Built on `tokio::sync::broadcast`. Publishing with no active subscribers
//! is a no-op, so the engine never waits on observers.

use stepwise_types::event::WorkflowEvent;
use tokio::sync::broadcast;

/// Multi-consumer bus for execution lifecycle events.
///
/// Cloning the bus clones the sender, so producers and consumers can be
/// spread across tasks.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<WorkflowEvent>,
}

impl EventBus {
    /// Create a bus with the given channel capacity. Slow subscribers lag
    /// rather than block publishers.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to current subscribers. Dropped if there are none.
    pub fn publish(&self, event: WorkflowEvent) {
        let _ = self.sender.send(event);
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receiver_count", &self.sender.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stepwise_types::execution::WorkflowExecutionStatus;
    use uuid::Uuid;

    fn status_event(status: WorkflowExecutionStatus) -> WorkflowEvent {
        WorkflowEvent::WorkflowStatusChanged {
            execution_id: Uuid::now_v7(),
            status,
            error_message: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn every_subscriber_receives_published_event() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(status_event(WorkflowExecutionStatus::Running));

        for rx in [&mut rx1, &mut rx2] {
            let received = rx.recv().await.unwrap();
            assert!(matches!(
                received,
                WorkflowEvent::WorkflowStatusChanged {
                    status: WorkflowExecutionStatus::Running,
                    ..
                }
            ));
        }
    }

    #[test]
    fn publish_without_subscribers_is_noop() {
        let bus = EventBus::new(4);
        bus.publish(status_event(WorkflowExecutionStatus::Completed));
        assert_eq!(bus.receiver_count(), 0);
    }

    #[test]
    fn slow_subscriber_lags_instead_of_blocking() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for _ in 0..5 {
            bus.publish(status_event(WorkflowExecutionStatus::Paused));
        }
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(_))
        ));
    }

    #[test]
    fn clones_share_the_channel() {
        let bus = EventBus::new(16);
        let clone = bus.clone();
        let mut rx = bus.subscribe();
        clone.publish(status_event(WorkflowExecutionStatus::Failed));
        assert!(rx.try_recv().is_ok());
        assert!(format!("{bus:?}").contains("receiver_count"));
    }
}

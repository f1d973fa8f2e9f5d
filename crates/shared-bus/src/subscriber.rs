//! # Event Subscriber
//!
//! Defines the subscription side of the event bus.

use crate::events::{EventFilter, ProtocolEvent};
use tokio::sync::broadcast;
use tracing::debug;

/// A subscription handle for receiving events.
///
/// Only events matching the filter are returned; the rest are skipped on
/// receive.
pub struct Subscription {
    receiver: broadcast::Receiver<ProtocolEvent>,
    filter: EventFilter,
}

impl Subscription {
    pub(crate) fn new(receiver: broadcast::Receiver<ProtocolEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// Receive the next event that matches the filter.
    ///
    /// Returns `None` once the bus is dropped.
    pub async fn recv(&mut self) -> Option<ProtocolEvent> {
        loop {
            let event = match self.receiver.recv().await {
                Ok(e) => e,
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    debug!(lagged = count, "Subscriber lagged, some events dropped");
                    continue;
                }
            };

            if self.filter.matches(&event) {
                return Some(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventTopic;
    use crate::publisher::InMemoryEventBus;
    use crate::EventPublisher;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_subscription_recv() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe(EventFilter::all());

        bus.publish(ProtocolEvent::NewEpoch { epoch: 7 }).await;

        let received = timeout(Duration::from_millis(100), sub.recv())
            .await
            .expect("timeout")
            .expect("event");
        assert_eq!(received, ProtocolEvent::NewEpoch { epoch: 7 });
    }

    #[tokio::test]
    async fn test_subscription_filter() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe(EventFilter::topics(vec![EventTopic::Epoch]));

        // Filtered out
        bus.publish(ProtocolEvent::PairingUpdated {
            epoch: 1,
            consumer: "c".into(),
            providers: vec![],
        })
        .await;
        bus.publish(ProtocolEvent::NewEpoch { epoch: 2 }).await;

        let received = timeout(Duration::from_millis(100), sub.recv())
            .await
            .expect("timeout")
            .expect("event");
        assert_eq!(received, ProtocolEvent::NewEpoch { epoch: 2 });
    }

    #[tokio::test]
    async fn test_lagged_subscriber_keeps_receiving() {
        let bus = InMemoryEventBus::with_capacity(2);
        let mut sub = bus.subscribe(EventFilter::all());

        for epoch in 1..=5 {
            bus.publish(ProtocolEvent::NewEpoch { epoch }).await;
        }

        // The oldest events were overwritten; the newest survive.
        let received = timeout(Duration::from_millis(100), sub.recv())
            .await
            .expect("timeout")
            .expect("event");
        assert_eq!(received, ProtocolEvent::NewEpoch { epoch: 4 });
    }

    #[tokio::test]
    async fn test_recv_returns_none_after_bus_dropped() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe(EventFilter::all());
        drop(bus);
        assert_eq!(sub.recv().await, None);
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Enforcement Events
//
// In-memory event streaming over a tokio broadcast channel. The CLI and any
// embedding host subscribe to follow sync, fail-secure and restriction
// changes as they happen. Events are not persisted.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::events::EnforcementEvent;

/// Event bus for publishing and subscribing to enforcement events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<EnforcementEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given channel capacity.
    /// Slow subscribers lose the oldest events once the buffer is full.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(256)
    }

    pub fn publish(&self, event: EnforcementEvent) {
        debug!("Publishing event: {:?}", event);

        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Receiver for all enforcement events
pub struct EventReceiver {
    receiver: broadcast::Receiver<EnforcementEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Result<EnforcementEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<EnforcementEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::CycleId;
    use chrono::Utc;

    fn synced(cycle_id: CycleId) -> EnforcementEvent {
        EnforcementEvent::PolicySynced {
            cycle_id,
            authorities_updated: 2,
            highest_timestamp_seen: 100,
            synced_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();
        let cycle_id = CycleId::new();

        event_bus.publish(synced(cycle_id));

        match receiver.recv().await.unwrap() {
            EnforcementEvent::PolicySynced {
                cycle_id: id,
                authorities_updated,
                ..
            } => {
                assert_eq!(id, cycle_id);
                assert_eq!(authorities_updated, 2);
            }
            other => panic!("Wrong event type received: {:?}", other),
        }
    }

    #[test]
    fn test_try_recv_empty_and_lagged() {
        let event_bus = EventBus::new(2);
        let mut receiver = event_bus.subscribe();
        assert!(matches!(receiver.try_recv(), Err(EventBusError::Empty)));

        for _ in 0..3 {
            event_bus.publish(synced(CycleId::new()));
        }
        assert!(matches!(receiver.try_recv(), Err(EventBusError::Lagged(1))));
        assert_eq!(event_bus.subscriber_count(), 1);
    }
}

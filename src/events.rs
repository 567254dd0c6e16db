use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tokio::sync::broadcast;

use crate::policy::ALL_BRANCHES;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    ProductCreated,
    ProductUpdated,
    ProductDeleted,
    TransactionCreated,
    PaymentCompleted,
}

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub event: EventKind,
    pub branch_id: i64,
    pub payload: serde_json::Value,
}

/// Branch-scoped fan-out over per-branch broadcast channels.
///
/// Every publish is mirrored into the branch-0 sentinel group so an
/// all-branches dashboard sees everything without per-branch subscriptions.
/// Delivery is best-effort and at-most-once: no subscriber, no delivery, and
/// nothing here can fail a committed sale.
#[derive(Clone)]
pub struct EventBus {
    channels: Arc<RwLock<HashMap<i64, broadcast::Sender<Event>>>>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            capacity,
        }
    }

    pub fn subscribe(&self, branch_id: i64) -> broadcast::Receiver<Event> {
        let mut channels = self.channels.write().unwrap_or_else(|e| e.into_inner());
        channels
            .entry(branch_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    pub fn publish(&self, kind: EventKind, branch_id: i64, payload: serde_json::Value) {
        let event = Event {
            event: kind,
            branch_id,
            payload,
        };
        self.send_to(branch_id, event.clone());
        if branch_id != ALL_BRANCHES {
            self.send_to(ALL_BRANCHES, event);
        }
    }

    fn send_to(&self, group: i64, event: Event) {
        let channels = self.channels.read().unwrap_or_else(|e| e.into_inner());
        if let Some(sender) = channels.get(&group) {
            // A send error only means nobody is listening right now.
            let _ = sender.send(event);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_to_branch_and_sentinel_groups() {
        let bus = EventBus::default();
        let mut branch_rx = bus.subscribe(2);
        let mut sentinel_rx = bus.subscribe(ALL_BRANCHES);

        bus.publish(
            EventKind::TransactionCreated,
            2,
            serde_json::json!({ "id": 7 }),
        );

        let got = branch_rx.recv().await.unwrap();
        assert_eq!(got.event, EventKind::TransactionCreated);
        assert_eq!(got.branch_id, 2);

        let mirrored = sentinel_rx.recv().await.unwrap();
        assert_eq!(mirrored.branch_id, 2);
        assert_eq!(mirrored.payload, serde_json::json!({ "id": 7 }));
    }

    #[tokio::test]
    async fn other_branches_do_not_receive() {
        let bus = EventBus::default();
        let mut other_rx = bus.subscribe(3);

        bus.publish(EventKind::ProductUpdated, 2, serde_json::json!({}));

        assert!(matches!(
            other_rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[test]
    fn publish_without_subscribers_is_a_noop() {
        let bus = EventBus::default();
        bus.publish(EventKind::ProductDeleted, 9, serde_json::json!({ "id": 1 }));
    }

    #[tokio::test]
    async fn late_subscriber_misses_earlier_events() {
        let bus = EventBus::default();
        bus.publish(EventKind::ProductCreated, 4, serde_json::json!({}));

        let mut rx = bus.subscribe(4);
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[test]
    fn event_serializes_with_kebab_case_kind() {
        let event = Event {
            event: EventKind::PaymentCompleted,
            branch_id: 1,
            payload: serde_json::json!({}),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "payment-completed");
    }
}

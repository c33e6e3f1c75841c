//! Write notifications for the bus collection
//!
//! Every bus write that goes through the store layer publishes a
//! [`BusWriteEvent`] carrying the post-write state of the record, or `None`
//! when the write was a deletion. Each subscriber owns a bounded
//! `tokio::sync::mpsc` queue. Publishing waits for room in every live
//! queue, so a slow subscriber slows writers down instead of missing events.

use crate::storage::BusRecord;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;

/// One write on a bus record
#[derive(Clone, Debug, PartialEq)]
pub struct BusWriteEvent {
    pub bus_id: String,
    /// Post-write state, `None` when the record was deleted
    pub after: Option<BusRecord>,
}

impl BusWriteEvent {
    pub fn written(bus_id: impl Into<String>, record: BusRecord) -> Self {
        Self {
            bus_id: bus_id.into(),
            after: Some(record),
        }
    }

    pub fn deleted(bus_id: impl Into<String>) -> Self {
        Self {
            bus_id: bus_id.into(),
            after: None,
        }
    }

    pub fn is_deletion(&self) -> bool {
        self.after.is_none()
    }
}

/// Fan-out feed of bus write events
#[derive(Clone)]
pub struct BusWriteFeed {
    capacity: usize,
    subscribers: Arc<Mutex<Vec<mpsc::Sender<BusWriteEvent>>>>,
}

impl BusWriteFeed {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Deliver an event to every subscriber, waiting while a queue is full.
    /// Having no subscribers is not an error.
    pub async fn publish(&self, event: BusWriteEvent) {
        let subscribers = self.live_subscribers();
        if subscribers.is_empty() {
            debug!("No subscribers for bus write event");
            return;
        }

        for sender in subscribers {
            if sender.send(event.clone()).await.is_err() {
                debug!("Subscriber left before bus write event was delivered");
            }
        }
    }

    /// Start receiving every event published from now on
    pub fn subscribe(&self) -> mpsc::Receiver<BusWriteEvent> {
        let (sender, receiver) = mpsc::channel(self.capacity);
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sender);
        receiver
    }

    pub fn subscriber_count(&self) -> usize {
        self.live_subscribers().len()
    }

    fn live_subscribers(&self) -> Vec<mpsc::Sender<BusWriteEvent>> {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|sender| !sender.is_closed());
        subscribers.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let feed = BusWriteFeed::new(8);
        let mut rx = feed.subscribe();
        assert_eq!(feed.subscriber_count(), 1);

        let record = BusRecord::new(serde_json::json!(1), "Running", 42);
        feed.publish(BusWriteEvent::written("bus-1", record.clone()))
            .await;
        feed.publish(BusWriteEvent::deleted("bus-2")).await;

        let first = rx.recv().await.unwrap();
        assert_eq!(first.bus_id, "bus-1");
        assert_eq!(first.after, Some(record));
        assert!(!first.is_deletion());

        let second = rx.recv().await.unwrap();
        assert_eq!(second.bus_id, "bus-2");
        assert!(second.is_deletion());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let feed = BusWriteFeed::new(0);
        feed.publish(BusWriteEvent::deleted("bus-1")).await;
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_forgotten() {
        let feed = BusWriteFeed::new(1);
        let rx = feed.subscribe();
        drop(rx);

        // A closed queue must not block the writer even when it was full
        feed.publish(BusWriteEvent::deleted("bus-1")).await;
        feed.publish(BusWriteEvent::deleted("bus-2")).await;
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_full_queue_holds_publisher_until_drained() {
        let feed = BusWriteFeed::new(2);
        let mut rx = feed.subscribe();

        let publisher = {
            let feed = feed.clone();
            tokio::spawn(async move {
                for i in 0..10 {
                    feed.publish(BusWriteEvent::deleted(format!("bus-{}", i)))
                        .await;
                }
            })
        };

        let mut received = Vec::new();
        while received.len() < 10 {
            let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap();
            received.push(event.bus_id);
        }
        publisher.await.unwrap();

        let expected: Vec<String> = (0..10).map(|i| format!("bus-{}", i)).collect();
        assert_eq!(received, expected);
    }
}

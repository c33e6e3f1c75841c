//! Document store wrapper that publishes bus write notifications
//!
//! Wraps any [`DocumentStore`] and, after each successful bus write or
//! delete, publishes a [`BusWriteEvent`] on the shared feed. Statistics
//! reads and merges pass straight through.

use super::{BusDocument, BusRecord, DailyStats, DayKey, DocumentStore, StatsIncrement, StorageResult};
use crate::events::{BusWriteEvent, BusWriteFeed};
use async_trait::async_trait;
use std::sync::Arc;

pub struct NotifyingDocumentStore {
    inner: Arc<dyn DocumentStore>,
    feed: BusWriteFeed,
}

impl NotifyingDocumentStore {
    pub fn new(inner: Arc<dyn DocumentStore>, feed: BusWriteFeed) -> Self {
        Self { inner, feed }
    }
}

#[async_trait]
impl DocumentStore for NotifyingDocumentStore {
    async fn put_bus(&self, bus_id: &str, record: &BusRecord) -> StorageResult<()> {
        self.inner.put_bus(bus_id, record).await?;
        self.feed
            .publish(BusWriteEvent::written(bus_id, record.clone()))
            .await;
        Ok(())
    }

    async fn get_bus(&self, bus_id: &str) -> StorageResult<Option<BusRecord>> {
        self.inner.get_bus(bus_id).await
    }

    async fn delete_bus(&self, bus_id: &str) -> StorageResult<bool> {
        let existed = self.inner.delete_bus(bus_id).await?;
        if existed {
            self.feed.publish(BusWriteEvent::deleted(bus_id)).await;
        }
        Ok(existed)
    }

    async fn list_buses(&self) -> StorageResult<Vec<BusDocument>> {
        self.inner.list_buses().await
    }

    async fn find_buses_older_than(&self, cutoff_ms: i64) -> StorageResult<Vec<String>> {
        self.inner.find_buses_older_than(cutoff_ms).await
    }

    async fn delete_buses(&self, bus_ids: &[String]) -> StorageResult<Vec<String>> {
        let removed = self.inner.delete_buses(bus_ids).await?;
        for bus_id in &removed {
            self.feed.publish(BusWriteEvent::deleted(bus_id.as_str())).await;
        }
        Ok(removed)
    }

    async fn merge_daily_stats(&self, increment: &StatsIncrement) -> StorageResult<()> {
        self.inner.merge_daily_stats(increment).await
    }

    async fn get_daily_stats(&self, day: DayKey) -> StorageResult<Option<DailyStats>> {
        self.inner.get_daily_stats(day).await
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.inner.health_check().await
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }
}

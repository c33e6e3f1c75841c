use super::{
    BusDocument, BusRecord, DailyStats, DayKey, DocumentStore, StatsIncrement, StorageResult,
};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory document store
///
/// Bus records sit behind a single lock so a batch delete is applied as one
/// unit. Daily statistics live in a `DashMap`; a merge mutates the entry while
/// holding its shard lock, which keeps concurrent increments from being lost.
#[derive(Default)]
pub struct MemoryDocumentStore {
    buses: RwLock<HashMap<String, BusRecord>>,
    daily: DashMap<String, DailyStats>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn put_bus(&self, bus_id: &str, record: &BusRecord) -> StorageResult<()> {
        self.buses
            .write()
            .await
            .insert(bus_id.to_string(), record.clone());
        Ok(())
    }

    async fn get_bus(&self, bus_id: &str) -> StorageResult<Option<BusRecord>> {
        Ok(self.buses.read().await.get(bus_id).cloned())
    }

    async fn delete_bus(&self, bus_id: &str) -> StorageResult<bool> {
        Ok(self.buses.write().await.remove(bus_id).is_some())
    }

    async fn list_buses(&self) -> StorageResult<Vec<BusDocument>> {
        let buses = self.buses.read().await;
        let mut documents: Vec<BusDocument> = buses
            .iter()
            .map(|(id, record)| BusDocument {
                id: id.clone(),
                record: record.clone(),
            })
            .collect();
        documents.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(documents)
    }

    async fn find_buses_older_than(&self, cutoff_ms: i64) -> StorageResult<Vec<String>> {
        let buses = self.buses.read().await;
        let mut ids: Vec<String> = buses
            .iter()
            .filter(|(_, record)| record.timestamp < cutoff_ms)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn delete_buses(&self, bus_ids: &[String]) -> StorageResult<Vec<String>> {
        let mut buses = self.buses.write().await;
        let mut removed = Vec::new();
        for bus_id in bus_ids {
            if buses.remove(bus_id).is_some() {
                removed.push(bus_id.clone());
            }
        }
        Ok(removed)
    }

    async fn merge_daily_stats(&self, increment: &StatsIncrement) -> StorageResult<()> {
        let mut entry = self
            .daily
            .entry(increment.day.document_id())
            .or_insert_with(|| DailyStats::for_day(increment.day));
        entry.apply(increment, Utc::now());
        Ok(())
    }

    async fn get_daily_stats(&self, day: DayKey) -> StorageResult<Option<DailyStats>> {
        Ok(self
            .daily
            .get(&day.document_id())
            .map(|entry| entry.value().clone()))
    }

    async fn health_check(&self) -> StorageResult<()> {
        // Memory storage is always healthy
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn record(timestamp: i64) -> BusRecord {
        BusRecord::new(serde_json::json!(1), "Running", timestamp)
    }

    fn increment(bus_id: &str, status: &str, hour: u32) -> StatsIncrement {
        StatsIncrement {
            day: DayKey::new(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()),
            bus_id: bus_id.to_string(),
            status_key: status.to_string(),
            hour,
        }
    }

    #[tokio::test]
    async fn test_bus_crud() {
        let store = MemoryDocumentStore::new();

        store.put_bus("bus-1", &record(100)).await.unwrap();
        assert_eq!(store.get_bus("bus-1").await.unwrap(), Some(record(100)));

        store.put_bus("bus-1", &record(200)).await.unwrap();
        assert_eq!(store.get_bus("bus-1").await.unwrap().unwrap().timestamp, 200);

        assert!(store.delete_bus("bus-1").await.unwrap());
        assert!(!store.delete_bus("bus-1").await.unwrap());
        assert!(store.get_bus("bus-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_older_than_is_strict() {
        let store = MemoryDocumentStore::new();
        store.put_bus("old", &record(99)).await.unwrap();
        store.put_bus("edge", &record(100)).await.unwrap();
        store.put_bus("new", &record(101)).await.unwrap();

        let ids = store.find_buses_older_than(100).await.unwrap();
        assert_eq!(ids, vec!["old".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_buses_batch() {
        let store = MemoryDocumentStore::new();
        store.put_bus("a", &record(1)).await.unwrap();
        store.put_bus("b", &record(2)).await.unwrap();
        store.put_bus("c", &record(3)).await.unwrap();

        let removed = store
            .delete_buses(&["a".to_string(), "missing".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, vec!["a".to_string(), "b".to_string()]);

        let remaining = store.list_buses().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "c");
    }

    #[tokio::test]
    async fn test_merge_creates_record_lazily() {
        let store = MemoryDocumentStore::new();
        let inc = increment("bus-1", "running", 8);

        assert!(store.get_daily_stats(inc.day).await.unwrap().is_none());
        store.merge_daily_stats(&inc).await.unwrap();

        let stats = store.get_daily_stats(inc.day).await.unwrap().unwrap();
        assert_eq!(stats.date, "2024-05-01");
        assert_eq!(stats.total_reports, 1);
        assert!(stats.last_updated.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_merges_keep_every_increment() {
        let store = Arc::new(MemoryDocumentStore::new());
        let mut handles = Vec::new();

        for i in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let bus = if i % 2 == 0 { "bus-even" } else { "bus-odd" };
                store
                    .merge_daily_stats(&increment(bus, "running", 9))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let day = increment("x", "x", 0).day;
        let stats = store.get_daily_stats(day).await.unwrap().unwrap();
        assert_eq!(stats.total_reports, 50);
        assert_eq!(stats.reports_by_bus.get("bus-even"), Some(&25));
        assert_eq!(stats.reports_by_bus.get("bus-odd"), Some(&25));
        assert_eq!(stats.reports_by_status.get("running"), Some(&50));
        assert_eq!(stats.reports_by_hour.get(&9), Some(&50));
    }
}

use super::{Job, JobResult};
use crate::{
    error::AppError,
    metrics,
    storage::{DocumentStore, StorageResult},
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::info;

/// Job for deleting bus records that have not reported within the retention window
pub struct BusCleanupJob {
    store: Arc<dyn DocumentStore>,
    retention: Duration,
}

impl BusCleanupJob {
    pub fn new(store: Arc<dyn DocumentStore>, retention_hours: u32) -> Self {
        Self {
            store,
            retention: Duration::hours(i64::from(retention_hours)),
        }
    }

    /// Cutoff in epoch milliseconds; records strictly older are stale
    pub fn cutoff_at(&self, now: DateTime<Utc>) -> i64 {
        (now - self.retention).timestamp_millis()
    }

    /// Ids of the records that a run at `now` would delete
    pub async fn stale_ids_at(&self, now: DateTime<Utc>) -> StorageResult<Vec<String>> {
        self.store.find_buses_older_than(self.cutoff_at(now)).await
    }

    /// Delete every stale record in one batch and return how many were removed
    pub async fn run_at(&self, now: DateTime<Utc>) -> StorageResult<u64> {
        let stale_ids = self.stale_ids_at(now).await?;

        if stale_ids.is_empty() {
            info!("No old reports to clean up");
            return Ok(0);
        }

        let deleted = self.store.delete_buses(&stale_ids).await?.len() as u64;
        info!("Cleaned up {} old reports", deleted);
        metrics::track_cleanup(deleted);

        Ok(deleted)
    }
}

#[async_trait]
impl Job for BusCleanupJob {
    fn name(&self) -> &str {
        "bus_cleanup"
    }

    async fn execute(&self) -> Result<JobResult, AppError> {
        match self.run_at(Utc::now()).await? {
            0 => Ok(JobResult::success()),
            deleted => Ok(JobResult::success_with_count(deleted)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        events::BusWriteFeed,
        storage::{BusRecord, MemoryDocumentStore, NotifyingDocumentStore},
        test_utils::FailingStore,
    };
    use tokio::sync::mpsc::error::TryRecvError;

    fn record_at(timestamp: DateTime<Utc>) -> BusRecord {
        BusRecord::new(serde_json::json!(1), "Running", timestamp.timestamp_millis())
    }

    #[tokio::test]
    async fn test_deletes_only_records_past_retention() {
        let store = Arc::new(MemoryDocumentStore::new());
        let now = Utc::now();
        store
            .put_bus("old", &record_at(now - Duration::hours(3)))
            .await
            .unwrap();
        store
            .put_bus("fresh", &record_at(now - Duration::hours(1)))
            .await
            .unwrap();

        let job = BusCleanupJob::new(store.clone(), 2);
        assert_eq!(job.run_at(now).await.unwrap(), 1);

        assert!(store.get_bus("old").await.unwrap().is_none());
        assert!(store.get_bus("fresh").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_record_exactly_at_cutoff_is_kept() {
        let store = Arc::new(MemoryDocumentStore::new());
        let now = Utc::now();
        store
            .put_bus("edge", &record_at(now - Duration::hours(2)))
            .await
            .unwrap();

        let job = BusCleanupJob::new(store.clone(), 2);
        assert_eq!(job.run_at(now).await.unwrap(), 0);
        assert!(store.get_bus("edge").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_nothing_stale_issues_no_deletes() {
        let feed = BusWriteFeed::new(16);
        let store = Arc::new(NotifyingDocumentStore::new(
            Arc::new(MemoryDocumentStore::new()),
            feed.clone(),
        ));
        let now = Utc::now();
        store
            .put_bus("fresh", &record_at(now - Duration::minutes(5)))
            .await
            .unwrap();

        let mut events = feed.subscribe();
        let job = BusCleanupJob::new(store, 2);
        let result = job.execute().await.unwrap();

        assert!(result.success);
        assert_eq!(result.items_processed, 0);
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_execute_reports_deleted_count() {
        let store = Arc::new(MemoryDocumentStore::new());
        let now = Utc::now();
        for i in 0..3 {
            store
                .put_bus(&format!("bus-{}", i), &record_at(now - Duration::hours(5)))
                .await
                .unwrap();
        }

        let job = BusCleanupJob::new(store.clone(), 2);
        let result = job.execute().await.unwrap();

        assert_eq!(result.items_processed, 3);
        assert!(store.list_buses().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_error_propagates() {
        let job = BusCleanupJob::new(Arc::new(FailingStore), 2);
        assert!(job.execute().await.is_err());
        assert!(job.run_at(Utc::now()).await.is_err());
    }

    #[test]
    fn test_cutoff_uses_retention() {
        let job = BusCleanupJob::new(Arc::new(MemoryDocumentStore::new()), 2);
        let now = Utc::now();
        assert_eq!(
            job.cutoff_at(now),
            now.timestamp_millis() - 2 * 60 * 60 * 1000
        );
    }
}

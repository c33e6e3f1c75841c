use crate::storage::{DayKey, DocumentStore, StorageResult};
use chrono::Utc;
use serde::Serialize;
use std::{collections::BTreeMap, sync::Arc};

/// Summary served by the statistics endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub total_reports: u64,
    pub active_buses: u64,
    /// Most recent report timestamp across all bus records
    pub last_update: Option<i64>,
    pub reports_by_status: BTreeMap<String, u64>,
}

/// Read side of the daily statistics
pub struct StatsQueryService {
    store: Arc<dyn DocumentStore>,
}

impl StatsQueryService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Snapshot for the current day
    pub async fn snapshot(&self) -> StorageResult<StatsSnapshot> {
        self.snapshot_for(DayKey::for_instant(Utc::now())).await
    }

    /// Snapshot for `day`.
    ///
    /// A day without a statistics record reads as zero reports. The bus count
    /// and latest timestamp come from a scan of the whole collection.
    pub async fn snapshot_for(&self, day: DayKey) -> StorageResult<StatsSnapshot> {
        let daily = self.store.get_daily_stats(day).await?.unwrap_or_default();
        let buses = self.store.list_buses().await?;

        let last_update = buses.iter().map(|doc| doc.record.timestamp).max();

        Ok(StatsSnapshot {
            total_reports: daily.total_reports,
            active_buses: buses.len() as u64,
            last_update,
            reports_by_status: daily.reports_by_status,
        })
    }
}

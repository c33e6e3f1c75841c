use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, sync::Arc};
use thiserror::Error;

use crate::health::{HealthCheckResult, HealthChecker};

pub mod config;
pub mod factory;
pub mod memory;
pub mod notifying;
pub mod redis;

pub use config::StoreConfig;
pub use factory::StoreFactory;
pub use memory::MemoryDocumentStore;
pub use notifying::NotifyingDocumentStore;
pub use redis::RedisDocumentStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Redis error: {0}")]
    Redis(String),
    #[error("Command timeout: {0}")]
    Timeout(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

pub type StorageResult<T> = Result<T, StoreError>;

/// Latest report of a tracked vehicle, keyed by bus id
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusRecord {
    /// Status code as sent by the reporting client
    #[serde(default)]
    pub status: serde_json::Value,
    /// Human-readable status label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    /// Milliseconds since epoch of the last report
    pub timestamp: i64,
}

impl BusRecord {
    pub fn new(status: serde_json::Value, status_text: impl Into<String>, timestamp: i64) -> Self {
        Self {
            status,
            status_text: Some(status_text.into()),
            timestamp,
        }
    }

    /// Case-folded status label used as the per-status counter key.
    /// `None` when the label is missing or blank.
    pub fn status_key(&self) -> Option<String> {
        self.status_text
            .as_deref()
            .filter(|text| !text.trim().is_empty())
            .map(str::to_lowercase)
    }
}

/// A bus record together with its document id
#[derive(Clone, Debug, PartialEq)]
pub struct BusDocument {
    pub id: String,
    pub record: BusRecord,
}

/// Calendar day identifying a daily statistics document
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DayKey(NaiveDate);

impl DayKey {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Day key of an instant, taken as its UTC calendar date
    pub fn for_instant(instant: DateTime<Utc>) -> Self {
        Self(instant.date_naive())
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// `YYYY-MM-DD`
    pub fn date_string(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }

    /// Document id of the day's statistics record, `daily-YYYY-MM-DD`
    pub fn document_id(&self) -> String {
        format!("daily-{}", self.date_string())
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.document_id())
    }
}

/// Merge payload for one bus report: each counter it names goes up by one
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatsIncrement {
    pub day: DayKey,
    pub bus_id: String,
    pub status_key: String,
    pub hour: u32,
}

/// Per-day aggregate counters
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStats {
    pub date: String,
    pub last_updated: Option<DateTime<Utc>>,
    pub total_reports: u64,
    pub reports_by_bus: BTreeMap<String, u64>,
    pub reports_by_status: BTreeMap<String, u64>,
    pub reports_by_hour: BTreeMap<u32, u64>,
}

impl DailyStats {
    pub fn for_day(day: DayKey) -> Self {
        Self {
            date: day.date_string(),
            ..Default::default()
        }
    }

    /// Apply one increment in place, stamping `last_updated`
    pub fn apply(&mut self, increment: &StatsIncrement, updated_at: DateTime<Utc>) {
        self.date = increment.day.date_string();
        self.last_updated = Some(updated_at);
        self.total_reports += 1;
        *self
            .reports_by_bus
            .entry(increment.bus_id.clone())
            .or_default() += 1;
        *self
            .reports_by_status
            .entry(increment.status_key.clone())
            .or_default() += 1;
        *self.reports_by_hour.entry(increment.hour).or_default() += 1;
    }
}

/// Document store holding bus records and daily statistics
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create or overwrite a bus record
    async fn put_bus(&self, bus_id: &str, record: &BusRecord) -> StorageResult<()>;

    /// Get a bus record by id
    async fn get_bus(&self, bus_id: &str) -> StorageResult<Option<BusRecord>>;

    /// Delete a bus record, returning whether it existed
    async fn delete_bus(&self, bus_id: &str) -> StorageResult<bool>;

    /// Read the whole bus collection
    async fn list_buses(&self) -> StorageResult<Vec<BusDocument>>;

    /// Ids of bus records whose timestamp is strictly less than `cutoff_ms`
    async fn find_buses_older_than(&self, cutoff_ms: i64) -> StorageResult<Vec<String>>;

    /// Delete the given bus records as one all-or-nothing batch and return
    /// the ids that actually existed
    async fn delete_buses(&self, bus_ids: &[String]) -> StorageResult<Vec<String>>;

    /// Merge one increment into the day's statistics, creating the record if absent
    async fn merge_daily_stats(&self, increment: &StatsIncrement) -> StorageResult<()>;

    /// Get the statistics record for a day
    async fn get_daily_stats(&self, day: DayKey) -> StorageResult<Option<DailyStats>>;

    /// Health check for the backend
    async fn health_check(&self) -> StorageResult<()>;

    /// Backend name for logging and health output
    fn backend_name(&self) -> &'static str;
}

/// Health checker implementation for the document store
pub struct StoreHealthChecker {
    store: Arc<dyn DocumentStore>,
}

impl StoreHealthChecker {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl HealthChecker for StoreHealthChecker {
    async fn check(&self) -> HealthCheckResult {
        match self.store.health_check().await {
            Ok(()) => HealthCheckResult::healthy_with_details(serde_json::json!({
                "backend": self.store.backend_name()
            })),
            Err(e) => HealthCheckResult::unhealthy(format!("Store health check failed: {}", e)),
        }
    }

    fn name(&self) -> &str {
        "store"
    }
}

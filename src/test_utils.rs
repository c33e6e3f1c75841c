use crate::{
    config::Config,
    server::Server,
    storage::{
        BusDocument, BusRecord, DailyStats, DayKey, DocumentStore, MemoryDocumentStore,
        StatsIncrement, StorageResult, StoreError,
    },
};
use async_trait::async_trait;
use std::sync::Arc;

/// Store whose every call fails as if the backend were unreachable
pub struct FailingStore;

impl FailingStore {
    fn error<T>() -> StorageResult<T> {
        Err(StoreError::Connection("store unreachable".to_string()))
    }
}

#[async_trait]
impl DocumentStore for FailingStore {
    async fn put_bus(&self, _bus_id: &str, _record: &BusRecord) -> StorageResult<()> {
        Self::error()
    }

    async fn get_bus(&self, _bus_id: &str) -> StorageResult<Option<BusRecord>> {
        Self::error()
    }

    async fn delete_bus(&self, _bus_id: &str) -> StorageResult<bool> {
        Self::error()
    }

    async fn list_buses(&self) -> StorageResult<Vec<BusDocument>> {
        Self::error()
    }

    async fn find_buses_older_than(&self, _cutoff_ms: i64) -> StorageResult<Vec<String>> {
        Self::error()
    }

    async fn delete_buses(&self, _bus_ids: &[String]) -> StorageResult<Vec<String>> {
        Self::error()
    }

    async fn merge_daily_stats(&self, _increment: &StatsIncrement) -> StorageResult<()> {
        Self::error()
    }

    async fn get_daily_stats(&self, _day: DayKey) -> StorageResult<Option<DailyStats>> {
        Self::error()
    }

    async fn health_check(&self) -> StorageResult<()> {
        Self::error()
    }

    fn backend_name(&self) -> &'static str {
        "failing"
    }
}

/// Test server builder with an in-memory store, metrics off and jobs off
pub struct TestServerBuilder {
    config: Config,
    store: Option<Arc<dyn DocumentStore>>,
}

impl TestServerBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            store: None,
        }
    }

    /// Set a custom configuration
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Use this backend instead of a fresh in-memory store
    pub fn with_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Serve through a backend that fails every call
    pub fn with_failing_store(self) -> Self {
        self.with_store(Arc::new(FailingStore))
    }

    pub async fn build(self) -> Server {
        let mut config = self.config;
        config.metrics.enabled = false;
        config.jobs.enabled = false;

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryDocumentStore::new()));

        Server::with_store(config, store)
            .await
            .expect("test server should build")
    }
}

impl Default for TestServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

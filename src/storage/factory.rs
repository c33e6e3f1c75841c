use super::{
    DocumentStore, MemoryDocumentStore, NotifyingDocumentStore, RedisDocumentStore,
    StorageResult, StoreConfig, StoreError,
};
use crate::events::BusWriteFeed;
use std::sync::Arc;
use tracing::info;

/// Store backend types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Redis,
}

impl StoreBackend {
    pub fn parse(name: &str) -> StorageResult<Self> {
        match name.to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "redis" => Ok(StoreBackend::Redis),
            other => Err(StoreError::InvalidData(format!(
                "Unknown store backend '{}'. Available: memory, redis",
                other
            ))),
        }
    }
}

/// Store factory for creating the configured backend
pub struct StoreFactory;

impl StoreFactory {
    /// Create the raw backend described by the configuration
    pub async fn create_backend(config: &StoreConfig) -> StorageResult<Arc<dyn DocumentStore>> {
        let backend = StoreBackend::parse(&config.backend)?;

        let store: Arc<dyn DocumentStore> = match backend {
            StoreBackend::Memory => Arc::new(MemoryDocumentStore::new()),
            StoreBackend::Redis => {
                let redis = RedisDocumentStore::new(
                    &config.redis_url,
                    &config.redis_key_prefix,
                    config.command_timeout_seconds,
                )
                .await?;
                // Fail early if Redis is not reachable
                redis.health_check().await?;
                Arc::new(redis)
            }
        };

        info!("Document store initialized with {} backend", store.backend_name());
        Ok(store)
    }

    /// Create the configured backend wrapped so bus writes are published on `feed`
    pub async fn create_notifying(
        config: &StoreConfig,
        feed: BusWriteFeed,
    ) -> StorageResult<Arc<dyn DocumentStore>> {
        let backend = Self::create_backend(config).await?;
        Ok(Arc::new(NotifyingDocumentStore::new(backend, feed)))
    }

    /// Memory-backed notifying store for tests
    pub fn create_test_store(feed: BusWriteFeed) -> Arc<dyn DocumentStore> {
        Arc::new(NotifyingDocumentStore::new(
            Arc::new(MemoryDocumentStore::new()),
            feed,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backend() {
        assert_eq!(StoreBackend::parse("memory").unwrap(), StoreBackend::Memory);
        assert_eq!(StoreBackend::parse("Redis").unwrap(), StoreBackend::Redis);
        assert!(StoreBackend::parse("postgres").is_err());
    }

    #[tokio::test]
    async fn test_create_memory_backend() {
        let store = StoreFactory::create_backend(&StoreConfig::default())
            .await
            .unwrap();
        assert_eq!(store.backend_name(), "memory");
        store.health_check().await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_backend_is_rejected() {
        let config = StoreConfig {
            backend: "sqlite".to_string(),
            ..Default::default()
        };
        let result = StoreFactory::create_backend(&config).await;
        assert!(matches!(result, Err(StoreError::InvalidData(_))));
    }
}

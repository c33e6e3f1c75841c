use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "memory" or "redis"
    #[serde(default = "default_store_backend")]
    pub backend: String,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_redis_key_prefix")]
    pub redis_key_prefix: String,
    #[serde(default = "default_command_timeout_seconds")]
    pub command_timeout_seconds: u64,
}

fn default_store_backend() -> String {
    "memory".to_string()
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_key_prefix() -> String {
    "bus_stats:".to_string()
}

fn default_command_timeout_seconds() -> u64 {
    5
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            redis_url: default_redis_url(),
            redis_key_prefix: default_redis_key_prefix(),
            command_timeout_seconds: default_command_timeout_seconds(),
        }
    }
}

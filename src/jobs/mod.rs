pub mod cleanup;
pub mod scheduler;

use crate::error::AppError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use cleanup::BusCleanupJob;
pub use scheduler::JobScheduler;

/// Configuration for the job system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Enable/disable internal job scheduler
    #[serde(default = "default_jobs_enabled")]
    pub enabled: bool,

    /// Stale bus record cleanup job configuration
    #[serde(default)]
    pub bus_cleanup: BusCleanupConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusCleanupConfig {
    /// Cron schedule expression, 5-field or 6-field (with seconds)
    #[serde(default = "default_cleanup_schedule")]
    pub schedule: String,
    /// Bus records older than this many hours are deleted
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u32,
}

fn default_jobs_enabled() -> bool {
    true
}

fn default_cleanup_schedule() -> String {
    "0 * * * *".to_string() // Every hour at minute 0
}

fn default_retention_hours() -> u32 {
    2
}

impl Default for BusCleanupConfig {
    fn default() -> Self {
        Self {
            schedule: default_cleanup_schedule(),
            retention_hours: default_retention_hours(),
        }
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            enabled: default_jobs_enabled(),
            bus_cleanup: BusCleanupConfig::default(),
        }
    }
}

/// Result of job execution
#[derive(Debug, Clone)]
pub struct JobResult {
    pub success: bool,
    pub message: String,
    pub items_processed: u64,
}

impl JobResult {
    pub fn success_with_count(count: u64) -> Self {
        Self {
            success: true,
            message: format!("Successfully processed {count} items"),
            items_processed: count,
        }
    }

    pub fn success() -> Self {
        Self {
            success: true,
            message: "Job completed successfully".to_string(),
            items_processed: 0,
        }
    }
}

/// Trait for executable jobs
#[async_trait]
pub trait Job: Send + Sync {
    /// Get the job name for logging and identification
    fn name(&self) -> &str;

    /// Execute the job and return the result
    async fn execute(&self) -> Result<JobResult, AppError>;
}

use async_trait::async_trait;
use serde::Serialize;
use std::{collections::BTreeMap, sync::Arc, time::Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl HealthCheckResult {
    pub fn healthy_with_details(details: serde_json::Value) -> Self {
        Self {
            status: HealthStatus::Healthy,
            message: None,
            details: Some(details),
            duration_ms: None,
        }
    }

    pub fn degraded(message: String) -> Self {
        Self {
            status: HealthStatus::Degraded,
            message: Some(message),
            details: None,
            duration_ms: None,
        }
    }

    pub fn unhealthy(message: String) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            message: Some(message),
            details: None,
            duration_ms: None,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

#[async_trait]
pub trait HealthChecker: Send + Sync {
    /// The name of this health check component, used by `?check=<name>`
    fn name(&self) -> &str;

    async fn check(&self) -> HealthCheckResult;
}

#[derive(Debug, Clone, Serialize)]
pub struct OverallHealthResponse {
    pub status: HealthStatus,
    pub service: String,
    pub version: String,
    pub timestamp: String,
    pub checks: BTreeMap<String, HealthCheckResult>,
}

/// Registry of component health checks
#[derive(Default)]
pub struct HealthService {
    checkers: RwLock<BTreeMap<String, Arc<dyn HealthChecker>>>,
}

impl HealthService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, checker: Arc<dyn HealthChecker>) {
        let name = checker.name().to_string();
        self.checkers.write().await.insert(name, checker);
    }

    pub async fn registered_checkers(&self) -> Vec<String> {
        self.checkers.read().await.keys().cloned().collect()
    }

    /// Run the checks selected by `filter`.
    ///
    /// `None` runs nothing and reports the process as healthy, `"all"` runs
    /// every registered check, any other value runs the check with that name.
    pub async fn check_health(&self, filter: Option<&str>) -> OverallHealthResponse {
        let checkers = self.checkers.read().await;

        let selected: Vec<_> = match filter {
            None => Vec::new(),
            Some("all") => checkers.iter().collect(),
            Some(name) => checkers.iter().filter(|(key, _)| *key == name).collect(),
        };

        let mut checks = BTreeMap::new();
        for (name, checker) in selected {
            let start = Instant::now();
            let result = checker.check().await;
            checks.insert(
                name.clone(),
                result.with_duration(start.elapsed().as_millis() as u64),
            );
        }

        // Worst status wins
        let status = checks
            .values()
            .map(|result| result.status)
            .fold(HealthStatus::Healthy, |worst, status| match (worst, status) {
                (HealthStatus::Unhealthy, _) | (_, HealthStatus::Unhealthy) => {
                    HealthStatus::Unhealthy
                }
                (HealthStatus::Degraded, _) | (_, HealthStatus::Degraded) => {
                    HealthStatus::Degraded
                }
                _ => HealthStatus::Healthy,
            });

        OverallHealthResponse {
            status,
            service: "bus-stats".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            checks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FixedChecker {
        name: &'static str,
        result: HealthCheckResult,
    }

    #[async_trait]
    impl HealthChecker for FixedChecker {
        fn name(&self) -> &str {
            self.name
        }

        async fn check(&self) -> HealthCheckResult {
            self.result.clone()
        }
    }

    fn checker(name: &'static str, result: HealthCheckResult) -> Arc<dyn HealthChecker> {
        Arc::new(FixedChecker { name, result })
    }

    #[tokio::test]
    async fn test_no_filter_runs_nothing() {
        let service = HealthService::new();
        service
            .register(checker("store", HealthCheckResult::unhealthy("down".into())))
            .await;

        let response = service.check_health(None).await;
        assert_eq!(response.status, HealthStatus::Healthy);
        assert!(response.checks.is_empty());
        assert_eq!(response.service, "bus-stats");
    }

    #[tokio::test]
    async fn test_worst_status_wins() {
        let service = HealthService::new();
        service
            .register(checker(
                "store",
                HealthCheckResult::healthy_with_details(json!({"backend": "memory"})),
            ))
            .await;
        service
            .register(checker("reactions", HealthCheckResult::degraded("stopped".into())))
            .await;

        let response = service.check_health(Some("all")).await;
        assert_eq!(response.status, HealthStatus::Degraded);
        assert_eq!(response.checks.len(), 2);

        service
            .register(checker("other", HealthCheckResult::unhealthy("down".into())))
            .await;
        let response = service.check_health(Some("all")).await;
        assert_eq!(response.status, HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_named_check_only() {
        let service = HealthService::new();
        service
            .register(checker(
                "store",
                HealthCheckResult::healthy_with_details(json!({})),
            ))
            .await;
        service
            .register(checker("reactions", HealthCheckResult::unhealthy("x".into())))
            .await;

        let response = service.check_health(Some("store")).await;
        assert_eq!(response.status, HealthStatus::Healthy);
        assert!(response.checks.contains_key("store"));
        assert!(!response.checks.contains_key("reactions"));
        assert!(response.checks["store"].duration_ms.is_some());

        assert_eq!(
            service.registered_checkers().await,
            vec!["reactions".to_string(), "store".to_string()]
        );
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_value(HealthCheckResult::degraded("slow".into())).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["message"], "slow");
        assert!(json.get("details").is_none());
    }
}

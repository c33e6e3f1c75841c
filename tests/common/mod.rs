use axum::{
    Router,
    body::{Body, to_bytes},
    http::{HeaderMap, Method, Request, StatusCode},
};
use bus_stats::{
    Config, Server,
    storage::{DayKey, DocumentStore},
    test_utils::TestServerBuilder,
};
use chrono::Utc;
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tower::ServiceExt;

/// Server plus router with the write-reaction listener running
pub struct TestHarness {
    pub server: Server,
    pub app: Router,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    #[allow(dead_code)]
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

impl TestHarness {
    pub async fn new() -> Self {
        Self::from_builder(TestServerBuilder::new()).await
    }

    #[allow(dead_code)]
    pub async fn with_failing_store() -> Self {
        Self::from_builder(TestServerBuilder::new().with_failing_store()).await
    }

    #[allow(dead_code)]
    pub async fn with_config(config: Config) -> Self {
        Self::from_builder(TestServerBuilder::new().with_config(config)).await
    }

    async fn from_builder(builder: TestServerBuilder) -> Self {
        let server = builder.build().await;
        server.start_background().await.unwrap();
        let app = server.create_app();
        Self { server, app }
    }

    #[allow(dead_code)]
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.server.store
    }

    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> TestResponse {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec();

        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// Report a bus status through the ingest API
    #[allow(dead_code)]
    pub async fn report(&self, bus_id: &str, status_text: &str, timestamp: i64) -> TestResponse {
        self.request(
            Method::PUT,
            &format!("/buses/{}", bus_id),
            Some(serde_json::json!({
                "status": 1,
                "statusText": status_text,
                "timestamp": timestamp
            })),
        )
        .await
    }

    /// Poll today's statistics until `expected` reports are counted
    #[allow(dead_code)]
    pub async fn wait_for_total_reports(&self, expected: u64) -> u64 {
        let day = DayKey::for_instant(Utc::now());
        let mut total = 0;
        for _ in 0..200 {
            total = self
                .store()
                .get_daily_stats(day)
                .await
                .unwrap()
                .map(|stats| stats.total_reports)
                .unwrap_or(0);
            if total >= expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        total
    }

    pub async fn shutdown(&self) {
        self.server.listener.stop().await;
    }
}

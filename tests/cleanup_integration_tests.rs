mod common;

use axum::http::{Method, StatusCode};
use bus_stats::jobs::{BusCleanupJob, Job};
use chrono::{Duration, Utc};
use common::TestHarness;

#[tokio::test]
async fn test_cleanup_removes_stale_buses_from_stats() {
    let harness = TestHarness::new().await;
    let now = Utc::now();

    harness
        .report("stale", "Running", (now - Duration::hours(3)).timestamp_millis())
        .await;
    harness
        .report("recent", "Running", (now - Duration::hours(1)).timestamp_millis())
        .await;
    assert_eq!(harness.wait_for_total_reports(2).await, 2);

    let job = BusCleanupJob::new(harness.store().clone(), 2);
    let result = job.execute().await.unwrap();
    assert!(result.success);
    assert_eq!(result.items_processed, 1);

    let response = harness.request(Method::GET, "/buses/stale", None).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let body = harness.request(Method::GET, "/stats", None).await.json();
    assert_eq!(body["activeBuses"], 1);
    // Deleting records never takes counts away
    assert_eq!(body["totalReports"], 2);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_cleanup_with_nothing_stale() {
    let harness = TestHarness::new().await;
    harness
        .report("fresh", "Running", Utc::now().timestamp_millis())
        .await;

    let job = BusCleanupJob::new(harness.store().clone(), 2);
    assert_eq!(job.run_at(Utc::now()).await.unwrap(), 0);

    let response = harness.request(Method::GET, "/buses/fresh", None).await;
    assert_eq!(response.status, StatusCode::OK);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_server_registers_configured_retention() {
    let harness = TestHarness::new().await;
    let now = Utc::now();
    harness
        .report("edge", "Running", (now - Duration::minutes(150)).timestamp_millis())
        .await;

    let jobs = harness.server.jobs();
    assert_eq!(jobs.len(), 1);
    let result = jobs[0].execute().await.unwrap();
    assert_eq!(result.items_processed, 1);

    harness.shutdown().await;
}

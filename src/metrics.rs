use axum::{body::Body, extract::MatchedPath, http::Request, middleware::Next, response::Response};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::time::Instant;
use tracing::info;

/// Install the Prometheus recorder and start its HTTP listener on `port`
pub fn init_metrics_with_port(
    port: u16,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .add_global_label("service", "bus_stats")
        .install()?;

    info!("Metrics server started on :{}/metrics", port);
    Ok(())
}

/// Middleware to collect HTTP request metrics
pub async fn metrics_middleware(req: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    gauge!("http_requests_active").increment(1.0);

    let response = next.run(req).await;

    let status = response.status();
    let labels = [
        ("method", method),
        ("path", path),
        ("status", status.as_str().to_string()),
    ];

    counter!("http_requests_total", &labels).increment(1);
    histogram!("http_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
    gauge!("http_requests_active").decrement(1.0);

    if status.is_server_error() {
        counter!("http_errors_total", &labels[..2]).increment(1);
    }

    response
}

/// Count one write reaction by outcome
pub fn track_reaction(outcome: &'static str) {
    counter!("bus_write_reactions_total", "outcome" => outcome).increment(1);
}

/// Count bus records removed by the cleanup job
pub fn track_cleanup(deleted: u64) {
    counter!("bus_cleanup_deleted_total").increment(deleted);
    counter!("bus_cleanup_runs_total").increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    // No recorder is installed in unit tests, so these only check the
    // macros accept the labels
    #[test]
    fn test_track_reaction() {
        track_reaction("recorded");
        track_reaction("dropped");
    }

    #[test]
    fn test_track_counts() {
        track_cleanup(0);
        track_cleanup(12);
    }
}

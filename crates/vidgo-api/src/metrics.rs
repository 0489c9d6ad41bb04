//! Prometheus metrics for the API server.

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Initialize the Prometheus metrics recorder.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "vidgo_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "vidgo_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "vidgo_http_requests_in_flight";

    // Dispatch metrics
    pub const DISPATCHES_TOTAL: &str = "vidgo_dispatches_total";
    pub const DISPATCH_DURATION_SECONDS: &str = "vidgo_dispatch_duration_seconds";
    pub const CREDITS_COMMITTED_TOTAL: &str = "vidgo_credits_committed_total";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "vidgo_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record one finished dispatch.
pub fn record_dispatch(tool: &str, outcome: &str, demo: bool, duration_secs: f64) {
    let labels = [
        ("tool", tool.to_string()),
        ("outcome", outcome.to_string()),
        ("demo", demo.to_string()),
    ];
    counter!(names::DISPATCHES_TOTAL, &labels).increment(1);
    histogram!(names::DISPATCH_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record committed credits.
pub fn record_credits_committed(tool: &str, credits: u32) {
    let labels = [("tool", tool.to_string())];
    counter!(names::CREDITS_COMMITTED_TOTAL, &labels).increment(credits as u64);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", endpoint.to_string())];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

/// Collapse record IDs in paths so metric cardinality stays bounded.
fn sanitize_path(path: &str) -> String {
    let mut out = Vec::new();
    let mut segments = path.split('/').peekable();
    while let Some(segment) = segments.next() {
        out.push(segment.to_string());
        if segment == "generations" || segment == "presets" {
            if let Some(next) = segments.peek() {
                if !next.is_empty() {
                    out.push(":id".to_string());
                    segments.next();
                }
            }
        }
    }
    out.join("/")
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    let response = next.run(request).await;
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/api/generations/550e8400-e29b-41d4-a716-446655440000"),
            "/api/generations/:id"
        );
        assert_eq!(sanitize_path("/demo/presets/effect"), "/demo/presets/:id");
        assert_eq!(sanitize_path("/tools/short_video"), "/tools/short_video");
    }
}

//! Prometheus metrics for the API server.

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use facegate_models::DetectionMode;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Install the Prometheus recorder and return a handle for rendering.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "facegate_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "facegate_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "facegate_http_requests_in_flight";

    // Detection metrics
    pub const DETECTIONS_TOTAL: &str = "facegate_detections_total";
    pub const FACES_RETURNED_TOTAL: &str = "facegate_faces_returned_total";
    pub const DETECTION_PERMITS_WAIT_SECONDS: &str = "facegate_detection_permit_wait_seconds";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "facegate_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path).to_string()),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a completed detection and how many faces it returned.
pub fn record_detection(mode: DetectionMode, faces: usize) {
    counter!(names::DETECTIONS_TOTAL, "mode" => mode.as_str()).increment(1);
    counter!(names::FACES_RETURNED_TOTAL, "mode" => mode.as_str()).increment(faces as u64);
}

/// Record time spent waiting for a detection permit.
pub fn record_permit_wait(duration_secs: f64) {
    histogram!(names::DETECTION_PERMITS_WAIT_SECONDS).record(duration_secs);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", sanitize_path(endpoint).to_string())];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

/// Collapse a request path into a bounded label set.
fn sanitize_path(path: &str) -> &'static str {
    let path = path.strip_prefix("/api").filter(|p| p.starts_with('/')).unwrap_or(path);
    match path {
        "/" => "/",
        "/health" => "/health",
        "/ready" => "/ready",
        "/metrics" => "/metrics",
        _ => DetectionMode::ALL
            .iter()
            .find(|mode| mode.path() == path)
            .map(|mode| mode.path())
            .unwrap_or("other"),
    }
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}

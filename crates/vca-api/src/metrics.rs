//! Prometheus metrics (SS4.8), trimmed to this system's own surface:
//! HTTP request counts/latency, tool dispatch outcomes, queue depth,
//! and cache hit ratio, recorded through an in-flight gauge middleware.

use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new().install_recorder().expect("failed to install prometheus recorder")
}

pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "vca_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "vca_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "vca_http_requests_in_flight";

    pub const TOOL_INVOCATIONS_TOTAL: &str = "vca_tool_invocations_total";
    pub const TOOL_DURATION_SECONDS: &str = "vca_tool_duration_seconds";
    pub const BREAKER_OPEN_TOTAL: &str = "vca_breaker_open_total";

    pub const QUEUE_DEPTH: &str = "vca_queue_depth";
    pub const QUEUE_JOBS_COMPLETED_TOTAL: &str = "vca_queue_jobs_completed_total";
    pub const QUEUE_JOBS_FAILED_TOTAL: &str = "vca_queue_jobs_failed_total";

    pub const CACHE_HITS_TOTAL: &str = "vca_cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "vca_cache_misses_total";

    pub const RATE_LIMIT_HITS_TOTAL: &str = "vca_rate_limit_hits_total";
}

pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [("method", method.to_string()), ("path", path.to_string()), ("status", status.to_string())];
    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_tool_invocation(tool_name: &str, outcome: &str, duration_secs: f64) {
    let labels = [("tool", tool_name.to_string()), ("outcome", outcome.to_string())];
    counter!(names::TOOL_INVOCATIONS_TOTAL, &labels).increment(1);
    histogram!(names::TOOL_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_breaker_open(tool_name: &str) {
    let labels = [("tool", tool_name.to_string())];
    counter!(names::BREAKER_OPEN_TOTAL, &labels).increment(1);
}

pub fn set_queue_depth(depth: u64) {
    gauge!(names::QUEUE_DEPTH).set(depth as f64);
}

pub fn record_queue_job_completed() {
    counter!(names::QUEUE_JOBS_COMPLETED_TOTAL).increment(1);
}

pub fn record_queue_job_failed() {
    counter!(names::QUEUE_JOBS_FAILED_TOTAL).increment(1);
}

pub fn record_cache_lookup(hit: bool) {
    if hit {
        counter!(names::CACHE_HITS_TOTAL).increment(1);
    } else {
        counter!(names::CACHE_MISSES_TOTAL).increment(1);
    }
}

pub fn record_rate_limit_hit(path: &str) {
    let labels = [("path", path.to_string())];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

/// Wraps every request with the in-flight gauge and records its
/// terminal status/duration (SS4.8 step 1).
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    let response = next.run(request).await;
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    record_http_request(&method, &path, response.status().as_u16(), start.elapsed().as_secs_f64());
    response
}

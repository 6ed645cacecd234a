//! Metrics collection and exposition.
//!
//! # Metrics
//! - `http_requests_total` (counter): requests by method, status, route pattern
//! - `http_request_duration_seconds` (histogram): handler latency by method, route
//! - `uploads_total` (counter): stored artifacts by outcome
//! - `stream_writes_total` (counter): streamed chunks by kind, outcome
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every update is a no-op
//! - Route label is the registered pattern, never the raw path
//! - Prometheus exporter only when enabled in configuration

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
pub const UPLOADS_TOTAL: &str = "uploads_total";
pub const STREAM_WRITES_TOTAL: &str = "stream_writes_total";

/// Route label for requests that matched no pattern.
pub const UNMATCHED_ROUTE: &str = "unmatched";

/// Install the Prometheus recorder and its scrape listener on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    describe_metrics();
    tracing::info!(metrics_address = %addr, "Prometheus exporter listening");
    Ok(())
}

fn describe_metrics() {
    describe_counter!(HTTP_REQUESTS_TOTAL, "Total HTTP requests");
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(UPLOADS_TOTAL, "Uploaded artifacts by outcome");
    describe_counter!(STREAM_WRITES_TOTAL, "Streamed chunks by kind and outcome");
}

pub fn record_request(method: &str, route: &str, status: u16, elapsed: Duration) {
    counter!(
        HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "status" => status.to_string(),
        "route" => route.to_string()
    )
    .increment(1);
    histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "route" => route.to_string()
    )
    .record(elapsed.as_secs_f64());
}

pub fn record_upload(outcome: &'static str) {
    counter!(UPLOADS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_stream_write(kind: &'static str, outcome: &'static str) {
    counter!(STREAM_WRITES_TOTAL, "kind" => kind, "outcome" => outcome).increment(1);
}

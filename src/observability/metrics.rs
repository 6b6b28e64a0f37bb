//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status
//! - `proxy_request_duration_seconds` (histogram): end-to-end latency
//! - `proxy_backend_retries_total` (counter): second attempts after connect failures
//! - `proxy_backend_errors_total` (counter): failures by error class
//! - `proxy_session_swaps_total` (counter): session installs and rotations
//! - `proxy_in_flight_requests` (gauge): requests currently being forwarded
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let status = status.to_string();
    metrics::counter!("proxy_requests_total", "method" => method.to_string(), "status" => status)
        .increment(1);
    metrics::histogram!("proxy_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_retry() {
    metrics::counter!("proxy_backend_retries_total").increment(1);
}

pub fn record_backend_error(class: &'static str) {
    metrics::counter!("proxy_backend_errors_total", "class" => class).increment(1);
}

pub fn record_session_swap() {
    metrics::counter!("proxy_session_swaps_total").increment(1);
}

pub fn set_in_flight(count: u64) {
    metrics::gauge!("proxy_in_flight_requests").set(count as f64);
}

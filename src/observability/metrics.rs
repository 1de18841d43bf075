//! Metrics collection and exposition.
//!
//! # Metrics
//! - `tailgate_requests_total` (counter): proxied requests by method, status
//! - `tailgate_request_duration_seconds` (histogram): proxy latency
//! - `tailgate_reloads_total` (counter): reload ticks by outcome
//! - `tailgate_injection_failures_total` (counter): failed token injections

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on its own listener.
pub fn init_metrics(address: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(address).install() {
        Ok(()) => tracing::info!(address = %address, "metrics exporter listening"),
        Err(error) => tracing::error!(error = %error, "failed to install metrics exporter"),
    }
}

/// Record one proxied request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];
    counter!("tailgate_requests_total", &labels).increment(1);
    histogram!("tailgate_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

/// Record one reload tick by outcome (`swapped`, `unchanged`, `failed`).
pub fn record_reload(outcome: &'static str) {
    counter!("tailgate_reloads_total", "outcome" => outcome).increment(1);
}

/// Record one failed auth token injection.
pub fn record_injection_failure() {
    counter!("tailgate_injection_failures_total").increment(1);
}

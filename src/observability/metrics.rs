//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): forwarded requests by method, status, outcome
//! - `proxy_request_duration_seconds` (histogram): forward latency by method
//! - `proxy_blocked_requests_total` (counter): requests refused by the block-list
//! - `proxy_rate_limited_total` (counter): requests refused by the rate limiter
//! - `proxy_relay_aborted_total` (counter): relays cut off after the upstream failed or stalled mid-body
//!
//! Recording is a no-op until a recorder is installed, so unit tests and runs
//! with metrics disabled pay nothing.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            describe_counter!("proxy_requests_total", "Requests handled by the forwarding endpoint");
            describe_histogram!("proxy_request_duration_seconds", "Forwarding latency in seconds");
            describe_counter!("proxy_blocked_requests_total", "Requests refused by the domain block-list");
            describe_counter!("proxy_rate_limited_total", "Requests refused by the rate limiter");
            describe_counter!("proxy_relay_aborted_total", "Relays aborted after the response head was sent");
            tracing::info!(address = %addr, "Prometheus metrics exporter listening");
        }
        Err(e) => tracing::error!(error = %e, "Failed to install Prometheus exporter"),
    }
}

/// Record one terminal outcome of `/proxy`.
pub fn record_request(method: &str, status: u16, outcome: &'static str, start: Instant) {
    counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "outcome" => outcome
    )
    .increment(1);

    histogram!("proxy_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_blocked() {
    counter!("proxy_blocked_requests_total").increment(1);
}

pub fn record_rate_limited() {
    counter!("proxy_rate_limited_total").increment(1);
}

pub fn record_relay_aborted() {
    counter!("proxy_relay_aborted_total").increment(1);
}

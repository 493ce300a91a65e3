//! Metrics collection and exposition.
//!
//! # Metrics
//! - `agent_config_requests_total` (counter): requests by route, status
//! - `agent_config_request_duration_seconds` (histogram): handler latency
//! - `agent_config_cache_lookups_total` (counter): hit / miss / stale
//! - `agent_config_store_fetches_total` (counter): fetches by outcome
//! - `agent_config_store_fetch_duration_seconds` (histogram)
//!
//! Recording is a no-op until `init_metrics` installs the exporter.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install Prometheus exporter"),
    }
}

pub fn record_request(route: &'static str, status: u16, start: Instant) {
    counter!("agent_config_requests_total", "route" => route, "status" => status.to_string())
        .increment(1);
    histogram!("agent_config_request_duration_seconds", "route" => route)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_cache_lookup(result: &'static str) {
    counter!("agent_config_cache_lookups_total", "result" => result).increment(1);
}

pub fn record_store_fetch(outcome: &'static str, start: Instant) {
    counter!("agent_config_store_fetches_total", "outcome" => outcome).increment(1);
    histogram!("agent_config_store_fetch_duration_seconds").record(start.elapsed().as_secs_f64());
}

//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status, source
//! - `proxy_request_duration_seconds` (histogram): latency distribution
//! - `proxy_cache_lookups_total` (counter): hit / miss / version_not_found / error
//! - `proxy_cache_stores_total` (counter): ok / error
//! - `proxy_tunnels_total` (counter): established / connect_failed / bad_request
//! - `proxy_tunnel_bytes_total` (counter): bytes relayed per direction
//! - `proxy_active_connections` (gauge)

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Origin,
    Proxy,
}

impl ResponseSource {
    fn as_str(self) -> &'static str {
        match self {
            ResponseSource::Cache => "cache",
            ResponseSource::Origin => "origin",
            ResponseSource::Proxy => "proxy",
        }
    }
}

pub fn record_request(method: &str, status: u16, source: ResponseSource, start: Instant) {
    metrics::counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "source" => source.as_str()
    )
    .increment(1);
    metrics::histogram!("proxy_request_duration_seconds", "source" => source.as_str())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_cache_lookup(outcome: &'static str) {
    metrics::counter!("proxy_cache_lookups_total", "outcome" => outcome).increment(1);
}

pub fn record_cache_store(ok: bool) {
    let result = if ok { "ok" } else { "error" };
    metrics::counter!("proxy_cache_stores_total", "result" => result).increment(1);
}

pub fn record_tunnel(result: &'static str) {
    metrics::counter!("proxy_tunnels_total", "result" => result).increment(1);
}

pub fn record_tunnel_bytes(direction: &'static str, bytes: u64) {
    metrics::counter!("proxy_tunnel_bytes_total", "direction" => direction).increment(bytes);
}

pub fn set_active_connections(count: u64) {
    metrics::gauge!("proxy_active_connections").set(count as f64);
}

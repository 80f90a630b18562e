//! Metrics collection and exposition.
//!
//! # Metrics
//! - `site_requests_total` (counter): requests by method, status, kind
//! - `site_request_duration_seconds` (histogram): latency by kind
//! - `dev_provisions_total` (counter): provisioning attempts by tenant, outcome
//! - `dev_instances` (gauge): ready dev instances
//! - `hmr_sessions_replaced_total` (counter): upstream sessions replaced by tenant
//!
//! Recording is a no-op until a recorder is installed.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// `kind` is the project kind that answered (`ssr`, `conventional`,
/// `static`) or the surface (`dev`, `api`, `mount`, `none`).
pub fn record_request(method: &str, status: u16, kind: &'static str, start: Instant) {
    counter!(
        "site_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "kind" => kind
    )
    .increment(1);
    histogram!("site_request_duration_seconds", "kind" => kind).record(start.elapsed().as_secs_f64());
}

pub fn record_dev_provision(tenant: &str, ok: bool) {
    let outcome = if ok { "ready" } else { "failed" };
    counter!("dev_provisions_total", "tenant" => tenant.to_string(), "outcome" => outcome).increment(1);
}

pub fn set_dev_instances(count: usize) {
    gauge!("dev_instances").set(count as f64);
}

pub fn record_hmr_replaced(tenant: &str) {
    counter!("hmr_sessions_replaced_total", "tenant" => tenant.to_string()).increment(1);
}

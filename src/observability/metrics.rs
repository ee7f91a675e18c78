//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gate metrics (rounds, probe checks, overall health)
//! - Expose Prometheus-compatible metrics endpoint when configured
//!
//! # Metrics
//! - `healthgate_rounds_total` (counter): rounds by result
//! - `healthgate_probe_checks_total` (counter): probe attempts by kind, result
//! - `healthgate_healthy` (gauge): 1=healthy, 0=unhealthy
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed
//! - Only the binary installs the exporter; the library just records

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

fn result_label(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}

pub fn record_round(healthy: bool) {
    ::metrics::counter!("healthgate_rounds_total", "result" => result_label(healthy)).increment(1);
}

pub fn record_probe_check(kind: &str, success: bool) {
    ::metrics::counter!(
        "healthgate_probe_checks_total",
        "kind" => kind.to_string(),
        "result" => result_label(success)
    )
    .increment(1);
}

pub fn record_healthy(healthy: bool) {
    ::metrics::gauge!("healthgate_healthy").set(if healthy { 1.0 } else { 0.0 });
}

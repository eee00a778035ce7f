//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gate_admitted_total` (counter): admitted uploads by mode
//! - `gate_rejected_total` (counter): rejections by reason
//! - `gate_rate_windows` (gauge): live rate windows after each sweep
//! - `gate_upstream_responses_total` (counter): forwarded responses by status

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to start metrics exporter"),
    }
}

/// Count one admitted upload request.
pub fn record_admitted(mode: &'static str) {
    counter!("gate_admitted_total", "mode" => mode).increment(1);
}

/// Count one rejected upload request.
pub fn record_rejected(reason: &'static str) {
    counter!("gate_rejected_total", "reason" => reason).increment(1);
}

/// Live rate windows after a sweep.
pub fn record_rate_windows(count: usize) {
    gauge!("gate_rate_windows").set(count as f64);
}

/// Count one forwarded upstream response.
pub fn record_upstream(status: u16) {
    counter!("gate_upstream_responses_total", "status" => status.to_string()).increment(1);
}

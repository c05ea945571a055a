/*!
 * # Metrics
 *
 * Prometheus counters for the warehouse workflows, exported in text format
 * at `/metrics`. Database transaction timings are recorded separately through
 * the `metrics` facade in [`crate::db::transaction`].
 */

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Failed to export metrics: {0}")]
    ExportError(String),
}

impl IntoResponse for MetricsError {
    fn into_response(self) -> Response {
        error!(error = %self, "metrics export failed");
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new_custom(Some("warehouse".into()), None)
        .expect("metric registry can be created");
    pub static ref ALLOCATIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("allocations_total", "Allocation attempts by mode and outcome"),
        &["mode", "outcome"]
    )
    .expect("metric can be created");
    pub static ref UNITS_RESERVED: IntCounter = IntCounter::new(
        "units_reserved_total",
        "Inventory units reserved for orders"
    )
    .expect("metric can be created");
    pub static ref CYCLE_COUNTS: IntCounterVec = IntCounterVec::new(
        Opts::new("cycle_counts_total", "Recorded cycle counts by resulting task status"),
        &["status"]
    )
    .expect("metric can be created");
    pub static ref PICKS: IntCounterVec = IntCounterVec::new(
        Opts::new("picks_total", "Completed pick and pack item scans by outcome"),
        &["kind", "outcome"]
    )
    .expect("metric can be created");
    pub static ref SCAN_MISMATCHES: IntCounter = IntCounter::new(
        "scan_mismatches_total",
        "Scans rejected because the code did not match the item"
    )
    .expect("metric can be created");
    pub static ref TRANSFERS: IntCounterVec = IntCounterVec::new(
        Opts::new("transfers_total", "Transfer decisions"),
        &["decision"]
    )
    .expect("metric can be created");
    pub static ref REFUNDS: IntCounter =
        IntCounter::new("refunds_total", "Return refunds processed").expect("metric can be created");
    pub static ref NOTIFICATION_FAILURES: IntCounter = IntCounter::new(
        "notification_failures_total",
        "Best-effort notifications that could not be delivered"
    )
    .expect("metric can be created");
    pub static ref FULFILLMENT_SYNC_FAILURES: IntCounter = IntCounter::new(
        "fulfillment_sync_failures_total",
        "Fulfillment platform pushes recorded as pending syncs"
    )
    .expect("metric can be created");
}

/// Registers every collector with [`REGISTRY`]. Safe to call more than once.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(ALLOCATIONS.clone()),
        Box::new(UNITS_RESERVED.clone()),
        Box::new(CYCLE_COUNTS.clone()),
        Box::new(PICKS.clone()),
        Box::new(SCAN_MISMATCHES.clone()),
        Box::new(TRANSFERS.clone()),
        Box::new(REFUNDS.clone()),
        Box::new(NOTIFICATION_FAILURES.clone()),
        Box::new(FULFILLMENT_SYNC_FAILURES.clone()),
    ];

    for collector in collectors {
        // AlreadyReg on repeated calls is expected
        let _ = REGISTRY.register(collector);
    }
}

/// Renders the registry in the Prometheus text exposition format.
pub fn export_metrics() -> Result<String, MetricsError> {
    register_metrics();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| MetricsError::ExportError(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| MetricsError::ExportError(e.to_string()))
}

// HTTP endpoint handler for metrics
pub async fn metrics_handler() -> Result<Response, MetricsError> {
    let body = export_metrics()?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exported_text_contains_workflow_counters() {
        ALLOCATIONS.with_label_values(&["strict", "success"]).inc();
        REFUNDS.inc();

        let text = export_metrics().unwrap();
        assert!(text.contains("warehouse_allocations_total"));
        assert!(text.contains("warehouse_refunds_total"));
    }
}

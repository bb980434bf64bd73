//! Prometheus metrics for COS operations.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`,
//! defines metric name constants, and records one counter increment and one
//! latency sample per remote operation.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

// -- Metric name constants ----------------------------------------------------

/// Total COS operations (counter). Labels: operation, outcome.
pub const OPERATIONS_TOTAL: &str = "qcloud_operations_total";

/// COS operation duration in seconds (histogram). Labels: operation.
pub const OPERATION_DURATION_SECONDS: &str = "qcloud_operation_duration_seconds";

/// Total bytes uploaded (counter).
pub const BYTES_UPLOADED_TOTAL: &str = "qcloud_bytes_uploaded_total";

// -- Global recorder installation ---------------------------------------------

/// Singleton handle to the Prometheus recorder.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus metrics recorder. Idempotent -- safe to call
/// multiple times (e.g. in tests). Returns a reference to the global handle.
pub fn init_metrics() -> anyhow::Result<&'static PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle);
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus recorder: {e}"))?;
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle))
}

/// Register metric descriptions with the global recorder. Call once after
/// `init_metrics()`.
pub fn describe_metrics() {
    describe_counter!(OPERATIONS_TOTAL, "Total COS operations by type and outcome");
    describe_histogram!(
        OPERATION_DURATION_SECONDS,
        "COS operation duration in seconds"
    );
    describe_counter!(BYTES_UPLOADED_TOTAL, "Total bytes uploaded to COS");
}

/// Render the current metrics in Prometheus text format, if installed.
pub fn render() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|handle| handle.render())
}

// -- Recording ----------------------------------------------------------------

/// Record one finished operation.
///
/// Without an installed recorder these calls are no-ops.
pub fn record_operation(operation: &'static str, outcome: &'static str, elapsed: Duration) {
    counter!(OPERATIONS_TOTAL, "operation" => operation, "outcome" => outcome).increment(1);
    histogram!(OPERATION_DURATION_SECONDS, "operation" => operation)
        .record(elapsed.as_secs_f64());
}

/// Record bytes accepted by a successful upload.
pub fn record_upload_bytes(bytes: usize) {
    counter!(BYTES_UPLOADED_TOTAL).increment(bytes as u64);
}

/// Outcome label for a status-bearing result.
pub fn outcome_label(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "rejected"
    }
}

// -- Tests --------------------------------------------------------------------

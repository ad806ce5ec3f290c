//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with latency histograms
//! and standardized naming conventions.

use crate::errors::Result;
use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all PUP STAR metrics
pub const METRICS_PREFIX: &str = "pupstar";

/// Histogram buckets for request and store-call latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s, the default store-call bound
    30.00,  // 30s, large uploads
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Record lifecycle metrics
    describe_counter!(
        format!("{}_record_operations_total", METRICS_PREFIX),
        Unit::Count,
        "Create, update and delete operations by outcome"
    );

    describe_histogram!(
        format!("{}_record_operation_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Record lifecycle operation latency in seconds"
    );

    // Blob hygiene
    describe_counter!(
        format!("{}_orphan_blobs_total", METRICS_PREFIX),
        Unit::Count,
        "Blobs left without an owning record"
    );

    describe_counter!(
        format!("{}_blobs_swept_total", METRICS_PREFIX),
        Unit::Count,
        "Unreferenced blobs removed by the reconciliation sweep"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Outcome label for a finished operation
pub fn outcome_label<T>(result: &Result<T>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(e) if e.is_client_error() => "rejected",
        Err(_) => "failed",
    }
}

/// Helper to record a lifecycle operation
pub fn record_operation(operation: &'static str, outcome: &'static str, duration_secs: f64) {
    counter!(
        format!("{}_record_operations_total", METRICS_PREFIX),
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);

    histogram!(
        format!("{}_record_operation_duration_seconds", METRICS_PREFIX),
        "operation" => operation
    )
    .record(duration_secs);
}

/// Helper to record a blob left behind
pub fn record_orphan_blob(reason: &'static str) {
    counter!(
        format!("{}_orphan_blobs_total", METRICS_PREFIX),
        "reason" => reason
    )
    .increment(1);
}

/// Helper to record sweep removals
pub fn record_blobs_swept(count: u64) {
    counter!(format!("{}_blobs_swept_total", METRICS_PREFIX)).increment(count);
}

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the adapters.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host process is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `dta_adapter_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `engine`: wide_column, graph, object
//! - `operation`: create, read, update, delete, batch_overwrite, ...
//! - `status`: success, or the [`crate::error::AdapterError::kind`] label

use metrics::{counter, histogram};
use std::time::{Duration, Instant};

/// Record a completed adapter operation
pub fn record_operation(engine: &str, operation: &str, status: &str) {
    counter!(
        "dta_adapter_operations_total",
        "engine" => engine.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(engine: &str, operation: &str, duration: Duration) {
    histogram!(
        "dta_adapter_operation_seconds",
        "engine" => engine.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record the number of store pages a bounded read needed
pub fn record_pages(engine: &str, pages: usize) {
    counter!(
        "dta_adapter_pages_total",
        "engine" => engine.to_string()
    )
    .increment(pages as u64);
}

/// Record an optimistic-concurrency rejection
pub fn record_version_conflict(engine: &str) {
    counter!(
        "dta_adapter_version_conflicts_total",
        "engine" => engine.to_string()
    )
    .increment(1);
}

/// Record the size of one store batch call
pub fn record_batch_size(engine: &str, operation: &str, count: usize) {
    histogram!(
        "dta_adapter_batch_size",
        "engine" => engine.to_string(),
        "operation" => operation.to_string()
    )
    .record(count as f64);
}

/// Record a notification publish attempt
pub fn record_notification(operation: &str, status: &str) {
    counter!(
        "dta_adapter_notifications_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record the outcome of `result` under `engine`/`operation`.
pub fn record_result<T>(engine: &str, operation: &str, result: &crate::error::Result<T>) {
    match result {
        Ok(_) => record_operation(engine, operation, "success"),
        Err(e) => record_operation(engine, operation, e.kind()),
    }
}

/// Guard that records operation latency when dropped
pub struct LatencyTimer {
    engine: &'static str,
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(engine: &'static str, operation: &'static str) -> Self {
        Self {
            engine,
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.engine, self.operation, self.start.elapsed());
    }
}

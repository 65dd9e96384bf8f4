// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for exposure-engine.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host process is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `exposure_engine_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `store`: index, source
//! - `operation`: search, upsert, find_by_ids, ...
//! - `status`: success, error, timeout, rejected

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record a store operation outcome
pub fn record_operation(store: &str, operation: &str, status: &str) {
    counter!(
        "exposure_engine_operations_total",
        "store" => store.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(store: &str, operation: &str, duration: Duration) {
    histogram!(
        "exposure_engine_operation_seconds",
        "store" => store.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a timeout
pub fn record_timeout(store: &str, operation: &str) {
    counter!(
        "exposure_engine_timeouts_total",
        "store" => store.to_string(),
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record circuit breaker call
pub fn record_circuit_call(circuit: &str, outcome: &str) {
    counter!(
        "exposure_engine_circuit_breaker_calls_total",
        "circuit" => circuit.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Set backend health (1 = healthy, 0 = unhealthy)
pub fn set_backend_healthy(backend: &str, healthy: bool) {
    gauge!(
        "exposure_engine_backend_healthy",
        "backend" => backend.to_string()
    )
    .set(if healthy { 1.0 } else { 0.0 });
}

// ═══════════════════════════════════════════════════════════════════════════
// RESOLUTION
// ═══════════════════════════════════════════════════════════════════════════

/// Which path answered a resolution: index, fallback, empty, invalid, unavailable
pub fn record_resolution(path: &str) {
    counter!(
        "exposure_engine_resolutions_total",
        "path" => path.to_string()
    )
    .increment(1);
}

/// Results returned to the caller
pub fn record_results(count: usize) {
    histogram!("exposure_engine_resolution_results").record(count as f64);
}

/// Index hits whose id is missing from the source store
pub fn record_orphans(count: usize) {
    counter!("exposure_engine_orphan_hits_total").increment(count as u64);
}

/// Password masking decision per result
pub fn record_masking(applied: bool) {
    counter!(
        "exposure_engine_masking_total",
        "applied" => if applied { "true" } else { "false" }
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// REPAIR
// ═══════════════════════════════════════════════════════════════════════════

/// Repair lifecycle: scheduled, retry, success, dropped, overflow
pub fn record_repair(outcome: &str) {
    counter!(
        "exposure_engine_repairs_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Current repair queue depth
pub fn set_repair_queue_depth(depth: usize) {
    gauge!("exposure_engine_repair_queue_depth").set(depth as f64);
}

/// Ingest outcome: stored, duplicate, error
pub fn record_ingest(outcome: &str) {
    counter!(
        "exposure_engine_ingest_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// A timing guard that records latency on drop
pub struct LatencyTimer {
    store: &'static str,
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(store: &'static str, operation: &'static str) -> Self {
        Self {
            store,
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.store, self.operation, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These verify the API doesn't panic without a recorder installed.
    // The resolution tests assert on values via metrics-util's DebuggingRecorder.

    #[test]
    fn test_store_metrics() {
        record_operation("index", "search", "success");
        record_operation("source", "find_by_ids", "error");
        record_latency("index", "search", Duration::from_millis(3));
        record_timeout("source", "search");
        set_backend_healthy("index", false);
    }

    #[test]
    fn test_resolution_metrics() {
        record_resolution("index");
        record_resolution("fallback");
        record_results(20);
        record_orphans(2);
        record_masking(true);
    }

    #[test]
    fn test_repair_metrics() {
        record_repair("scheduled");
        record_repair("overflow");
        set_repair_queue_depth(17);
        record_ingest("duplicate");
        record_circuit_call("index", "rejected");
    }

    #[test]
    fn test_latency_timer() {
        let _timer = LatencyTimer::new("index", "search");
        std::thread::sleep(Duration::from_millis(1));
    }
}

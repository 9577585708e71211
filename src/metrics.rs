//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Source fetches (calls, rows, latency)
//! - Target pushes (calls, records, rejections)
//! - Record-level exceptions per phase
//! - Phase and run outcomes
//! - Stale-data clearance
//! - Exception log retention
//!
//! The crate only records through the `metrics` facade; installing an
//! exporter is up to the embedding process.
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `cmdb_sync_` and follow Prometheus conventions:
//! - Counters end in `_total`
//! - Gauges represent current state
//! - Histograms track distributions (duration, size)
//!
//! # Usage
//!
//! ```rust,no_run
//! use cmdb_replicator::metrics;
//! use std::time::Duration;
//!
//! // After a source read
//! metrics::record_fetch("instance", "host", 100, Duration::from_millis(40));
//!
//! // After a run finishes
//! metrics::record_run_outcome("east", "success", Duration::from_secs(12));
//! ```

use metrics::{counter, gauge, histogram};
use std::time::Duration;

// =============================================================================
// Fetch / Push Metrics
// =============================================================================

/// Record one source read.
pub fn record_fetch(data_type: &str, classify: &str, rows: usize, duration: Duration) {
    let data_type = data_type.to_string();
    let classify = classify.to_string();

    counter!("cmdb_sync_fetch_calls_total", "data_type" => data_type.clone(), "classify" => classify.clone())
        .increment(1);
    counter!("cmdb_sync_fetch_rows_total", "data_type" => data_type.clone(), "classify" => classify.clone())
        .increment(rows as u64);
    histogram!("cmdb_sync_fetch_duration_seconds", "data_type" => data_type, "classify" => classify)
        .record(duration.as_secs_f64());
}

/// Record one target push.
pub fn record_push(
    data_type: &str,
    classify: &str,
    records: usize,
    accepted: bool,
    duration: Duration,
) {
    let data_type = data_type.to_string();
    let classify = classify.to_string();
    let status = if accepted { "accepted" } else { "rejected" };

    counter!(
        "cmdb_sync_push_calls_total",
        "data_type" => data_type.clone(),
        "classify" => classify.clone(),
        "status" => status
    )
    .increment(1);
    counter!("cmdb_sync_push_records_total", "data_type" => data_type.clone(), "classify" => classify.clone())
        .increment(records as u64);
    histogram!("cmdb_sync_push_duration_seconds", "data_type" => data_type, "classify" => classify)
        .record(duration.as_secs_f64());
}

/// Record a failed remote call (transport or cancellation).
pub fn record_remote_error(operation: &str, kind: &str) {
    counter!(
        "cmdb_sync_remote_errors_total",
        "operation" => operation.to_string(),
        "kind" => kind.to_string()
    )
    .increment(1);
}

// =============================================================================
// Exception Metrics
// =============================================================================

/// Record record-level exceptions collected for a phase.
pub fn record_exceptions(phase: &str, count: usize) {
    if count > 0 {
        counter!("cmdb_sync_record_exceptions_total", "phase" => phase.to_string())
            .increment(count as u64);
    }
}

/// Record an exception log that could not be created or written.
pub fn record_exception_sink_failure(operation: &str) {
    counter!("cmdb_sync_exception_sink_failures_total", "operation" => operation.to_string())
        .increment(1);
}

/// Record exception logs removed by retention.
pub fn record_retention_pruned(flag: &str, removed: usize) {
    counter!("cmdb_sync_retention_pruned_total", "flag" => flag.to_string())
        .increment(removed as u64);
}

// =============================================================================
// Phase / Run Metrics
// =============================================================================

/// Record a phase's wall time.
pub fn record_phase_duration(task: &str, phase: &str, duration: Duration) {
    histogram!(
        "cmdb_sync_phase_duration_seconds",
        "task" => task.to_string(),
        "phase" => phase.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record the final outcome of one run.
pub fn record_run_outcome(task: &str, outcome: &str, duration: Duration) {
    let task = task.to_string();
    counter!("cmdb_sync_runs_total", "task" => task.clone(), "outcome" => outcome.to_string())
        .increment(1);
    histogram!("cmdb_sync_run_duration_seconds", "task" => task).record(duration.as_secs_f64());
}

/// Record the business IDs discovered during a run.
pub fn set_discovered_businesses(task: &str, count: usize) {
    gauge!("cmdb_sync_discovered_businesses", "task" => task.to_string()).set(count as f64);
}

/// Record a stale-data clearance outcome ("accepted", "rejected", "transport_error").
pub fn record_clear_stale_data(flag: &str, outcome: &str) {
    counter!(
        "cmdb_sync_clear_stale_data_total",
        "flag" => flag.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

// =============================================================================
// Service Metrics
// =============================================================================

/// Gauge for service state.
pub fn set_service_state(state: &str) {
    // Numeric encoding for alerting
    let value = match state {
        "Created" => 0.0,
        "Running" => 1.0,
        "ShuttingDown" => 2.0,
        "Stopped" => 3.0,
        _ => -1.0,
    };
    gauge!("cmdb_sync_service_state").set(value);
}

/// Record a completed service cycle.
pub fn record_cycle(tasks: usize, failed: usize, duration: Duration) {
    counter!("cmdb_sync_cycles_total").increment(1);
    if failed > 0 {
        counter!("cmdb_sync_cycle_failed_tasks_total").increment(failed as u64);
    }
    gauge!("cmdb_sync_cycle_tasks").set(tasks as f64);
    histogram!("cmdb_sync_cycle_duration_seconds").record(duration.as_secs_f64());
}

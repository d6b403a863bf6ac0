//! Prometheus metrics for statistics history rolls and storage calls.

use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use tracing::debug;

// === Metric Name Constants ===

/// Completed rolls counter metric name.
pub const METRIC_ROLLS: &str = "history_rolls_total";
/// Failed rolls counter metric name.
pub const METRIC_ROLL_FAILURES: &str = "history_roll_failures_total";
/// Counter resets detected metric name.
pub const METRIC_COUNTER_RESETS: &str = "history_counter_resets_total";
/// Snapshots written metric name.
pub const METRIC_SNAPSHOTS_WRITTEN: &str = "history_snapshots_written_total";
/// Roll latency metric name.
pub const METRIC_ROLL_LATENCY: &str = "history_roll_latency_ms";
/// Storage request latency metric name.
pub const METRIC_STORAGE_LATENCY: &str = "storage_request_latency_ms";

/// Initialize all metric descriptions.
/// Call this once at startup to register metrics with descriptions.
pub fn init_metrics() {
    describe_histogram!(
        METRIC_ROLL_LATENCY,
        "Statistics history roll latency in milliseconds"
    );
    describe_histogram!(
        METRIC_STORAGE_LATENCY,
        "Storage service request latency in milliseconds"
    );

    describe_counter!(METRIC_ROLLS, "Total number of completed history rolls");
    describe_counter!(METRIC_ROLL_FAILURES, "Total number of failed history rolls");
    describe_counter!(
        METRIC_COUNTER_RESETS,
        "Total number of statistics counters found reset since the last roll"
    );
    describe_counter!(
        METRIC_SNAPSHOTS_WRITTEN,
        "Total number of statistics history rows written"
    );

    debug!("Metrics initialized");
}

/// Record storage request latency.
pub fn record_storage_latency(start: Instant, operation: &'static str) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_STORAGE_LATENCY, "operation" => operation).record(latency_ms);
}

/// Increment completed rolls counter.
pub fn inc_rolls() {
    counter!(METRIC_ROLLS).increment(1);
}

/// Increment failed rolls counter.
pub fn inc_roll_failures() {
    counter!(METRIC_ROLL_FAILURES).increment(1);
}

/// Add detected counter resets.
pub fn add_counter_resets(count: u64) {
    counter!(METRIC_COUNTER_RESETS).increment(count);
}

/// Add written snapshot rows.
pub fn add_snapshots_written(count: u64) {
    counter!(METRIC_SNAPSHOTS_WRITTEN).increment(count);
}

/// RAII guard for timing operations.
/// Automatically records latency when dropped.
pub struct LatencyTimer {
    start: Instant,
    metric_name: &'static str,
}

impl LatencyTimer {
    /// Create a new latency timer for the given metric.
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
        }
    }

    /// Get elapsed time in milliseconds (without recording).
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        let latency_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        histogram!(self.metric_name).record(latency_ms);
    }
}

/// Create a latency timer for a whole roll.
pub fn timer_roll() -> LatencyTimer {
    LatencyTimer::new(METRIC_ROLL_LATENCY)
}

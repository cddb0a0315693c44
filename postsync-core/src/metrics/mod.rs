//! Metrics collection for sync observability
//!
//! Metrics go through the `metrics` facade; without an installed recorder
//! every call is a no-op, so the core never depends on an exporter.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Instant;

pub const SYNC_PASSES_TOTAL: &str = "sync.passes.total";
pub const SYNC_PASSES_FAILED: &str = "sync.passes.failed";
pub const SYNC_PASSES_SKIPPED: &str = "sync.passes.skipped";
pub const SYNC_PASS_DURATION_MS: &str = "sync.pass.duration_ms";
pub const SYNC_RECORDS_DROPPED: &str = "sync.records.dropped";
pub const SYNC_COLLECTION_RECORDS: &str = "sync.collection.records";
pub const SYNC_TOMBSTONES_COUNT: &str = "sync.tombstones.count";
pub const STORE_MUTATIONS: &str = "store.mutations.total";

/// Initialize metrics with descriptions
pub fn init_metrics() {
    describe_counter!(SYNC_PASSES_TOTAL, "Number of sync passes that ran to completion");
    describe_counter!(SYNC_PASSES_FAILED, "Number of sync passes aborted by a storage error");
    describe_counter!(SYNC_PASSES_SKIPPED, "Number of sync passes skipped by configuration");
    describe_histogram!(SYNC_PASS_DURATION_MS, "Sync pass duration in milliseconds");
    describe_counter!(SYNC_RECORDS_DROPPED, "Records dropped during merge for lack of identity");
    describe_gauge!(SYNC_COLLECTION_RECORDS, "Records in a collection after the last pass");
    describe_gauge!(SYNC_TOMBSTONES_COUNT, "Tombstones after the last pass");
    describe_counter!(STORE_MUTATIONS, "Local record creations and deletions");
}

/// Record a counter metric
pub fn record_counter(name: &'static str, value: u64) {
    counter!(name).increment(value);
}

/// Record a gauge metric
pub fn record_gauge(name: &'static str, value: f64) {
    gauge!(name).set(value);
}

/// Record a per-collection gauge
pub fn record_collection_gauge(name: &'static str, collection: &'static str, value: f64) {
    gauge!(name, "collection" => collection).set(value);
}

/// Timer for measuring operation duration
pub struct Timer {
    name: &'static str,
    start: Instant,
}

impl Timer {
    /// Create a new timer
    pub fn new(name: &'static str) -> Self {
        Self { name, start: Instant::now() }
    }

    /// Milliseconds since the timer started
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Stop the timer, record the duration and return it in milliseconds
    pub fn stop(self) -> u64 {
        let duration = self.start.elapsed();
        histogram!(self.name).record(duration.as_secs_f64() * 1000.0);
        duration.as_millis() as u64
    }
}

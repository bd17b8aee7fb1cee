//! Prometheus metrics definitions.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec,
};

/// Documents enumerated, by kind.
pub static DOCUMENTS_SEEN: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "docindex_documents_seen_total",
        "Documents found by the scanner",
        &["kind"]
    )
    .unwrap()
});

/// Documents passed to the index as new or changed, by kind.
pub static DOCUMENTS_CHANGED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "docindex_documents_changed_total",
        "New or changed documents sent to the index",
        &["kind"]
    )
    .unwrap()
});

/// Documents that failed to decode or write, by kind.
pub static DOCUMENTS_FAILED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "docindex_documents_failed_total",
        "Documents that failed to decode or index",
        &["kind"]
    )
    .unwrap()
});

/// Index entries removed by reconciliation, by kind.
pub static ORPHANS_REMOVED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "docindex_orphans_removed_total",
        "Index entries removed because their file disappeared",
        &["kind"]
    )
    .unwrap()
});

/// Job runs by kind, role and outcome.
pub static JOB_RUNS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "docindex_job_runs_total",
        "Job runs by outcome",
        &["kind", "role", "outcome"]
    )
    .unwrap()
});

/// Job run duration.
pub static JOB_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "docindex_job_duration_seconds",
        "Job run duration in seconds",
        &["kind", "role"],
        vec![1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 3600.0]
    )
    .unwrap()
});

/// Initialize all metrics (call once at startup).
pub fn init_metrics() {
    // Access lazy statics to register them
    let _ = &*DOCUMENTS_SEEN;
    let _ = &*DOCUMENTS_CHANGED;
    let _ = &*DOCUMENTS_FAILED;
    let _ = &*ORPHANS_REMOVED;
    let _ = &*JOB_RUNS;
    let _ = &*JOB_DURATION;

    tracing::debug!("Prometheus metrics initialized");
}

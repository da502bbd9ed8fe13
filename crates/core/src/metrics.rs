//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Discovery (cycles, files found/enqueued)
//! - Download stage (attempts, retries, durations)
//! - Processing stage (outcomes, durations)
//! - Queue depths

use once_cell::sync::Lazy;
use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts,
};

// =============================================================================
// Discovery Metrics
// =============================================================================

/// Discovery cycles total by result.
pub static DISCOVERY_CYCLES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("helios_discovery_cycles_total", "Total discovery cycles"),
        &["result"], // "success", "failed"
    )
    .unwrap()
});

/// Files found per discovery cycle.
pub static FILES_FOUND: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "helios_discovery_files_found",
            "Number of files found per discovery cycle",
        )
        .buckets(vec![0.0, 1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0]),
        &[],
    )
    .unwrap()
});

/// New files enqueued for download.
pub static FILES_ENQUEUED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "helios_discovery_files_enqueued_total",
        "Total new files enqueued for download",
    )
    .unwrap()
});

// =============================================================================
// Download Stage Metrics
// =============================================================================

/// Download attempts started.
pub static DOWNLOADS_STARTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "helios_downloads_started_total",
        "Total download attempts started",
    )
    .unwrap()
});

/// Downloads completed successfully.
pub static DOWNLOADS_COMPLETED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "helios_downloads_completed_total",
        "Total downloads completed successfully",
    )
    .unwrap()
});

/// Downloads that reached terminal failure.
pub static DOWNLOADS_FAILED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "helios_downloads_failed_total",
        "Total downloads that failed permanently",
    )
    .unwrap()
});

/// Transient download failures scheduled for retry.
pub static DOWNLOAD_RETRIES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "helios_download_retries_total",
        "Total download retries scheduled",
    )
    .unwrap()
});

/// Download duration in seconds.
pub static DOWNLOAD_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("helios_download_duration_seconds", "Duration of downloads").buckets(
            vec![5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0],
        ),
        &["result"], // "success", "failed"
    )
    .unwrap()
});

// =============================================================================
// Processing Stage Metrics
// =============================================================================

/// Processing outcomes by result.
pub static PROCESSING_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("helios_processing_total", "Total processing outcomes"),
        &["result"], // "complete", "skipped", "failed"
    )
    .unwrap()
});

/// Processing duration in seconds.
pub static PROCESSING_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "helios_processing_duration_seconds",
            "Duration of the transform stage",
        )
        .buckets(vec![10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0]),
        &[],
    )
    .unwrap()
});

// =============================================================================
// Queue Metrics
// =============================================================================

/// Tasks currently waiting per stage queue.
pub static QUEUE_DEPTH: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("helios_queue_depth", "Tasks waiting per stage queue"),
        &["stage"], // "download", "process"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Discovery
        Box::new(DISCOVERY_CYCLES.clone()),
        Box::new(FILES_FOUND.clone()),
        Box::new(FILES_ENQUEUED.clone()),
        // Download
        Box::new(DOWNLOADS_STARTED.clone()),
        Box::new(DOWNLOADS_COMPLETED.clone()),
        Box::new(DOWNLOADS_FAILED.clone()),
        Box::new(DOWNLOAD_RETRIES.clone()),
        Box::new(DOWNLOAD_DURATION.clone()),
        // Processing
        Box::new(PROCESSING_OUTCOMES.clone()),
        Box::new(PROCESSING_DURATION.clone()),
        // Queue
        Box::new(QUEUE_DEPTH.clone()),
    ]
}

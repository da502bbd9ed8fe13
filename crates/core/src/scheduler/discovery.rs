//! Discovery scheduler implementation.
//!
//! Periodically queries the remote catalog over a time window, dedupes the
//! results against the manifest and enqueues download tasks for new files.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};

use crate::catalog::{CatalogClient, SearchWindow};
use crate::config::DiscoveryConfig;
use crate::manifest::{ManifestStore, NewFileRecord, QueryLogEntry, QueryOutcome};
use crate::metrics;
use crate::queue::{Task, TaskQueue};

use super::window::search_window;

/// Result of one discovery cycle, also exposed by the manual trigger.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryReport {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub files_found: u64,
    pub files_new: u64,
    pub duration_ms: u64,
    pub outcome: QueryOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Scheduler status for the operational surface.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cycle_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cycle: Option<DiscoveryReport>,
}

/// The discovery scheduler - finds new catalog products and feeds the
/// download queue.
pub struct DiscoveryScheduler {
    config: DiscoveryConfig,
    manifest: Arc<dyn ManifestStore>,
    queue: Arc<dyn TaskQueue>,
    catalog: Arc<dyn CatalogClient>,

    running: Arc<AtomicBool>,
    last_cycle: Arc<RwLock<Option<(DateTime<Utc>, DiscoveryReport)>>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl DiscoveryScheduler {
    pub fn new(
        config: DiscoveryConfig,
        manifest: Arc<dyn ManifestStore>,
        queue: Arc<dyn TaskQueue>,
        catalog: Arc<dyn CatalogClient>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            manifest,
            queue,
            catalog,
            running: Arc::new(AtomicBool::new(false)),
            last_cycle: Arc::new(RwLock::new(None)),
            shutdown_tx,
        }
    }

    /// Start the discovery loop (spawns a background task).
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Discovery scheduler already running");
            return;
        }

        info!(
            "Starting discovery scheduler (every {} min, window {} min ending {} h in the past)",
            self.config.interval_minutes, self.config.lookback_minutes, self.config.min_age_hours
        );

        let config = self.config.clone();
        let manifest = Arc::clone(&self.manifest);
        let queue = Arc::clone(&self.queue);
        let catalog = Arc::clone(&self.catalog);
        let running = Arc::clone(&self.running);
        let last_cycle = Arc::clone(&self.last_cycle);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            // Initial delay gives the rest of the service time to come up.
            tokio::select! {
                _ = shutdown_rx.recv() => return,
                _ = tokio::time::sleep(Duration::from_secs(config.initial_delay_secs)) => {}
            }

            loop {
                if !running.load(Ordering::Relaxed) {
                    break;
                }

                let report = Self::run_cycle(&config, &manifest, &queue, &catalog).await;
                *last_cycle.write().await = Some((Utc::now(), report));

                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = tokio::time::sleep(Duration::from_secs(config.interval_minutes * 60)) => {}
                }
            }
            info!("Discovery loop stopped");
        });
    }

    /// Stop the discovery loop.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("Stopping discovery scheduler");
        let _ = self.shutdown_tx.send(());
    }

    /// Current scheduler status.
    pub async fn status(&self) -> SchedulerStatus {
        let last = self.last_cycle.read().await.clone();
        SchedulerStatus {
            running: self.running.load(Ordering::Relaxed),
            last_cycle_at: last.as_ref().map(|(at, _)| *at),
            last_cycle: last.map(|(_, report)| report),
        }
    }

    /// The window the next cycle would query.
    pub fn current_window(&self) -> SearchWindow {
        Self::window_for(&self.config)
    }

    /// Execute one discovery cycle, recording it as the last cycle.
    pub async fn poll_once(&self) -> DiscoveryReport {
        let report =
            Self::run_cycle(&self.config, &self.manifest, &self.queue, &self.catalog).await;
        *self.last_cycle.write().await = Some((Utc::now(), report.clone()));
        report
    }

    fn window_for(config: &DiscoveryConfig) -> SearchWindow {
        search_window(
            Utc::now(),
            chrono::Duration::hours(config.min_age_hours),
            chrono::Duration::minutes(config.lookback_minutes),
        )
    }

    /// One full discovery cycle.
    ///
    /// A catalog failure is recorded to the query log and returned in the
    /// report; it never propagates, so the next scheduled cycle proceeds
    /// independently. Failed cycles are not retried before then.
    async fn run_cycle(
        config: &DiscoveryConfig,
        manifest: &Arc<dyn ManifestStore>,
        queue: &Arc<dyn TaskQueue>,
        catalog: &Arc<dyn CatalogClient>,
    ) -> DiscoveryReport {
        let window = Self::window_for(config);
        let started = Instant::now();

        info!(
            "Discovery cycle querying {} .. {} over {}",
            window.start, window.end, config.roi.name
        );

        match catalog.search(&window, &config.roi).await {
            Ok(descriptors) => {
                let files_found = descriptors.len() as u64;
                let mut files_new: u64 = 0;

                for descriptor in descriptors {
                    let record = NewFileRecord {
                        file_id: descriptor.file_id.clone(),
                        observed_at: descriptor.timestamp,
                        source_tag: descriptor.source_tag.clone(),
                        product_type: descriptor.product_type.clone(),
                        size_bytes: descriptor.size_bytes,
                    };

                    // Insert first, enqueue only on a successful insert: a
                    // crash between the two leaves a Queued record that a
                    // reconciliation sweep can re-enqueue, never a task
                    // without a record.
                    match manifest.insert_if_absent(record) {
                        Ok(true) => {
                            let file_id = descriptor.file_id.clone();
                            let task = Task::download(&file_id, descriptor);
                            match queue.enqueue(task) {
                                Ok(()) => {
                                    files_new += 1;
                                    metrics::FILES_ENQUEUED.inc();
                                    info!("New file queued for download: {}", file_id);
                                }
                                Err(e) => {
                                    error!(
                                        "Inserted {} but failed to enqueue download: {}",
                                        file_id, e
                                    );
                                }
                            }
                        }
                        Ok(false) => {
                            debug!("Already known, skipping: {}", descriptor.file_id);
                        }
                        Err(e) => {
                            error!("Failed to record {}: {}", descriptor.file_id, e);
                        }
                    }
                }

                let duration_ms = started.elapsed().as_millis() as u64;
                let report = DiscoveryReport {
                    window_start: window.start,
                    window_end: window.end,
                    files_found,
                    files_new,
                    duration_ms,
                    outcome: QueryOutcome::Success,
                    error: None,
                };

                Self::log_cycle(manifest, &report);
                metrics::DISCOVERY_CYCLES
                    .with_label_values(&["success"])
                    .inc();
                metrics::FILES_FOUND
                    .with_label_values(&[])
                    .observe(files_found as f64);

                info!(
                    "Discovery cycle complete: {} found, {} new, {} ms",
                    files_found, files_new, duration_ms
                );

                report
            }
            Err(e) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                error!("Discovery cycle failed: {}", e);

                let report = DiscoveryReport {
                    window_start: window.start,
                    window_end: window.end,
                    files_found: 0,
                    files_new: 0,
                    duration_ms,
                    outcome: QueryOutcome::Failed,
                    error: Some(e.to_string()),
                };

                Self::log_cycle(manifest, &report);
                metrics::DISCOVERY_CYCLES
                    .with_label_values(&["failed"])
                    .inc();

                report
            }
        }
    }

    fn log_cycle(manifest: &Arc<dyn ManifestStore>, report: &DiscoveryReport) {
        let entry = QueryLogEntry {
            window_start: report.window_start,
            window_end: report.window_end,
            files_found: report.files_found,
            files_new: report.files_new,
            duration_ms: report.duration_ms,
            outcome: report.outcome,
            error_message: report.error.clone(),
        };
        if let Err(e) = manifest.log_query(entry) {
            error!("Failed to write query log entry: {}", e);
        }
    }
}

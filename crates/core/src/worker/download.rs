//! Download stage worker.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::catalog::CatalogClient;
use crate::config::DownloadConfig;
use crate::manifest::{FileStatus, ManifestPatch, ManifestStore};
use crate::metrics;
use crate::queue::{DownloadTask, RetryPolicy, Stage, StageLimits, Task, TaskPayload, TaskQueue};

use super::paths;
use super::types::{StageOutcome, StageWorker};

/// Fetches raw artifacts from the catalog and hands them to the process
/// stage.
pub struct DownloadWorker {
    manifest: Arc<dyn ManifestStore>,
    queue: Arc<dyn TaskQueue>,
    catalog: Arc<dyn CatalogClient>,
    raw_dir: PathBuf,
    limits: StageLimits,
    retry_policy: RetryPolicy,
}

impl DownloadWorker {
    pub fn new(
        config: &DownloadConfig,
        raw_dir: impl Into<PathBuf>,
        manifest: Arc<dyn ManifestStore>,
        queue: Arc<dyn TaskQueue>,
        catalog: Arc<dyn CatalogClient>,
    ) -> Self {
        Self {
            manifest,
            queue,
            catalog,
            raw_dir: raw_dir.into(),
            limits: StageLimits::new(
                Some(std::time::Duration::from_secs(config.soft_time_limit_secs)),
                std::time::Duration::from_secs(config.hard_time_limit_secs),
            ),
            retry_policy: RetryPolicy::from_secs(config.max_attempts, &config.retry_delay_secs),
        }
    }

    fn payload<'a>(&self, task: &'a Task) -> Option<&'a DownloadTask> {
        match &task.payload {
            TaskPayload::Download(payload) => Some(payload),
            TaskPayload::Process(_) => None,
        }
    }

    fn product_dir(&self, payload: &DownloadTask) -> PathBuf {
        paths::raw_product_dir(
            &self.raw_dir,
            payload.descriptor.timestamp,
            &payload.descriptor.source_tag,
            &payload.descriptor.product_type,
        )
    }

    /// Delete a partially written product directory so a retry never
    /// resumes from a corrupt partial write.
    async fn cleanup_partial(&self, dir: &Path) {
        if tokio::fs::try_exists(dir).await.unwrap_or(false) {
            if let Err(e) = tokio::fs::remove_dir_all(dir).await {
                warn!("Failed to delete partial download {}: {}", dir.display(), e);
            } else {
                info!("Deleted partial download {}", dir.display());
            }
        }
    }
}

#[async_trait]
impl StageWorker for DownloadWorker {
    fn stage(&self) -> Stage {
        Stage::Download
    }

    fn limits(&self) -> StageLimits {
        self.limits
    }

    fn retry_policy(&self) -> Option<&RetryPolicy> {
        Some(&self.retry_policy)
    }

    async fn execute(&self, task: &Task) -> StageOutcome {
        let Some(payload) = self.payload(task) else {
            return StageOutcome::Fatal(format!(
                "download worker received {} payload",
                task.stage()
            ));
        };
        let file_id = &payload.file_id;

        info!(
            "Starting download for {} (attempt {}/{})",
            file_id, task.attempt, self.retry_policy.max_attempts
        );

        if let Err(e) = self.manifest.apply(
            file_id,
            ManifestPatch::status(FileStatus::Downloading).with_download_attempt(task.attempt),
        ) {
            // A record that cannot legally enter Downloading (already
            // terminal, already past this stage) makes the task moot.
            return StageOutcome::Fatal(format!("manifest rejected download start: {}", e));
        }
        metrics::DOWNLOADS_STARTED.inc();

        let product_dir = self.product_dir(payload);
        let started = Instant::now();

        let fetch = self.catalog.fetch(&payload.descriptor, &product_dir);
        let fetched = match self.limits.soft_time_limit {
            Some(soft_limit) => match timeout(soft_limit, fetch).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("Download of {} hit the soft time limit", file_id);
                    self.cleanup_partial(&product_dir).await;
                    return StageOutcome::Retryable("soft time limit exceeded".to_string());
                }
            },
            None => fetch.await,
        };

        let raw_file = match fetched {
            Ok(path) => path,
            Err(e) => {
                self.cleanup_partial(&product_dir).await;
                metrics::DOWNLOAD_DURATION
                    .with_label_values(&["failed"])
                    .observe(started.elapsed().as_secs_f64());
                return StageOutcome::Retryable(e.to_string());
            }
        };

        let duration = started.elapsed().as_secs_f64();

        if let Err(e) = self.manifest.apply(
            file_id,
            ManifestPatch::status(FileStatus::Downloaded)
                .with_raw_path(product_dir.to_string_lossy())
                .with_download_duration(duration),
        ) {
            // The artifact landed but the record cannot advance; remove the
            // orphan so disk usage stays bounded.
            error!("Manifest rejected download completion for {}: {}", file_id, e);
            self.cleanup_partial(&product_dir).await;
            return StageOutcome::Fatal(format!("manifest rejected download completion: {}", e));
        }

        metrics::DOWNLOADS_COMPLETED.inc();
        metrics::DOWNLOAD_DURATION
            .with_label_values(&["success"])
            .observe(duration);

        info!(
            "Downloaded {} to {} in {:.1}s",
            file_id,
            raw_file.display(),
            duration
        );

        // One task in flight per record: the process task exists only once
        // the download task has fully succeeded.
        let process_task = Task::process(
            file_id,
            raw_file.to_string_lossy(),
            payload.descriptor.timestamp,
            &payload.descriptor.source_tag,
        );
        if let Err(e) = self.queue.enqueue(process_task) {
            // The record stays Downloaded; a reconciliation sweep can
            // re-enqueue it from the manifest.
            error!("Failed to enqueue process task for {}: {}", file_id, e);
        }

        StageOutcome::Success
    }

    async fn abort_cleanup(&self, task: &Task) {
        if let Some(payload) = self.payload(task) {
            warn!(
                "Download of {} force-aborted at the hard time limit",
                payload.file_id
            );
            self.cleanup_partial(&self.product_dir(payload)).await;
        }
    }

    async fn record_retry(&self, task: &Task, error: &str) {
        metrics::DOWNLOAD_RETRIES.inc();
        if let Err(e) = self.manifest.apply(
            task.file_id(),
            ManifestPatch::status(FileStatus::Retry).with_error(error),
        ) {
            warn!("Failed to mark {} for retry: {}", task.file_id(), e);
        }
    }

    async fn record_failure(&self, task: &Task, error: &str) {
        metrics::DOWNLOADS_FAILED.inc();
        error!("Download of {} failed permanently: {}", task.file_id(), error);
        if let Err(e) = self.manifest.apply(
            task.file_id(),
            ManifestPatch::status(FileStatus::Failed).with_error(error),
        ) {
            warn!("Failed to mark {} as failed: {}", task.file_id(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogError, ProductDescriptor};
    use crate::manifest::SqliteManifestStore;
    use crate::queue::InMemoryBroker;
    use crate::testing::MockCatalog;
    use chrono::Utc;

    fn descriptor(file_id: &str) -> ProductDescriptor {
        ProductDescriptor {
            file_id: file_id.to_string(),
            timestamp: Utc::now(),
            source_tag: "MSG4".to_string(),
            product_type: "HRSEVIRI".to_string(),
            size_bytes: 1024,
        }
    }

    struct Fixture {
        manifest: Arc<SqliteManifestStore>,
        queue: Arc<InMemoryBroker>,
        catalog: Arc<MockCatalog>,
        worker: DownloadWorker,
        _raw_dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let manifest = Arc::new(SqliteManifestStore::in_memory().unwrap());
        let queue = Arc::new(InMemoryBroker::new());
        let catalog = Arc::new(MockCatalog::new());
        let raw_dir = tempfile::tempdir().unwrap();
        let worker = DownloadWorker::new(
            &DownloadConfig::default(),
            raw_dir.path(),
            Arc::clone(&manifest) as Arc<dyn ManifestStore>,
            Arc::clone(&queue) as Arc<dyn TaskQueue>,
            Arc::clone(&catalog) as Arc<dyn CatalogClient>,
        );
        Fixture {
            manifest,
            queue,
            catalog,
            worker,
            _raw_dir: raw_dir,
        }
    }

    fn queued_record(fx: &Fixture, file_id: &str) -> Task {
        let descriptor = descriptor(file_id);
        fx.manifest
            .insert_if_absent(crate::manifest::NewFileRecord {
                file_id: file_id.to_string(),
                observed_at: descriptor.timestamp,
                source_tag: descriptor.source_tag.clone(),
                product_type: descriptor.product_type.clone(),
                size_bytes: descriptor.size_bytes,
            })
            .unwrap();
        Task::download(file_id, descriptor)
    }

    #[tokio::test]
    async fn test_successful_download_advances_record_and_enqueues_process() {
        let fx = fixture();
        let task = queued_record(&fx, "f-1");

        let outcome = fx.worker.execute(&task).await;
        assert_eq!(outcome, StageOutcome::Success);

        let record = fx.manifest.get("f-1").unwrap().unwrap();
        assert_eq!(record.status, FileStatus::Downloaded);
        assert_eq!(record.download_attempt, 1);
        assert!(record.raw_path.is_some());
        assert!(record.download_duration_secs.is_some());

        // The fetched artifact is on disk where the record points.
        let raw_dir = PathBuf::from(record.raw_path.unwrap());
        assert!(raw_dir.join("product.nat").exists());

        assert_eq!(fx.queue.depth(Stage::Process), 1);
        let lease = fx.queue.dequeue(Stage::Process).await.unwrap();
        assert_eq!(lease.task().file_id(), "f-1");
        lease.ack();
    }

    #[tokio::test]
    async fn test_transient_failure_is_retryable_and_cleans_partials() {
        let fx = fixture();
        let task = queued_record(&fx, "f-1");
        fx.catalog
            .fail_next_fetches(vec![CatalogError::ConnectionFailed("reset".to_string())])
            .await;

        let outcome = fx.worker.execute(&task).await;
        assert!(matches!(outcome, StageOutcome::Retryable(_)));

        let record = fx.manifest.get("f-1").unwrap().unwrap();
        assert_eq!(record.status, FileStatus::Downloading);
        assert!(record.raw_path.is_none());

        // No process task for a failed download.
        assert_eq!(fx.queue.depth(Stage::Process), 0);
    }

    #[tokio::test]
    async fn test_record_retry_marks_retry_status() {
        let fx = fixture();
        let task = queued_record(&fx, "f-1");
        fx.manifest
            .apply(
                "f-1",
                ManifestPatch::status(FileStatus::Downloading).with_download_attempt(1),
            )
            .unwrap();

        fx.worker.record_retry(&task, "connection reset").await;

        let record = fx.manifest.get("f-1").unwrap().unwrap();
        assert_eq!(record.status, FileStatus::Retry);
        assert_eq!(record.error_message.as_deref(), Some("connection reset"));
    }

    #[tokio::test]
    async fn test_record_failure_goes_terminal() {
        let fx = fixture();
        let task = queued_record(&fx, "f-1");
        fx.manifest
            .apply(
                "f-1",
                ManifestPatch::status(FileStatus::Downloading).with_download_attempt(3),
            )
            .unwrap();

        fx.worker
            .record_failure(&task, "Max retries reached: timeout")
            .await;

        let record = fx.manifest.get("f-1").unwrap().unwrap();
        assert_eq!(record.status, FileStatus::Failed);
        assert!(record
            .error_message
            .as_deref()
            .unwrap()
            .contains("Max retries reached"));
    }

    #[tokio::test]
    async fn test_download_for_terminal_record_is_fatal() {
        let fx = fixture();
        let task = queued_record(&fx, "f-1");
        fx.manifest
            .apply("f-1", ManifestPatch::status(FileStatus::Downloading))
            .unwrap();
        fx.manifest
            .apply(
                "f-1",
                ManifestPatch::status(FileStatus::Failed).with_error("gone"),
            )
            .unwrap();

        let outcome = fx.worker.execute(&task).await;
        assert!(matches!(outcome, StageOutcome::Fatal(_)));
    }

    #[tokio::test]
    async fn test_wrong_payload_is_fatal() {
        let fx = fixture();
        let task = Task::process("f-1", "/raw/p", Utc::now(), "MSG4");
        let outcome = fx.worker.execute(&task).await;
        assert!(matches!(outcome, StageOutcome::Fatal(_)));
    }
}

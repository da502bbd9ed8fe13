//! Process stage worker.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::config::ProcessingConfig;
use crate::manifest::{FileStatus, ManifestPatch, ManifestStore, QualityFields};
use crate::metrics;
use crate::queue::{ProcessTask, RetryPolicy, Stage, StageLimits, Task, TaskPayload};
use crate::transform::{QualityReport, Transformer};

use super::paths;
use super::types::{StageOutcome, StageWorker};

/// Runs the transform collaborator over downloaded raw artifacts.
///
/// Processing failures are terminal: the raw artifact is deleted on every
/// terminal outcome to bound disk usage, so there is nothing left for an
/// automatic retry to read. Re-processing requires external intervention.
pub struct ProcessWorker {
    manifest: Arc<dyn ManifestStore>,
    transformer: Arc<dyn Transformer>,
    output_dir: PathBuf,
    limits: StageLimits,
}

impl ProcessWorker {
    pub fn new(
        config: &ProcessingConfig,
        output_dir: impl Into<PathBuf>,
        manifest: Arc<dyn ManifestStore>,
        transformer: Arc<dyn Transformer>,
    ) -> Self {
        Self {
            manifest,
            transformer,
            output_dir: output_dir.into(),
            limits: StageLimits::new(
                None,
                std::time::Duration::from_secs(config.hard_time_limit_secs),
            ),
        }
    }

    fn payload<'a>(&self, task: &'a Task) -> Option<&'a ProcessTask> {
        match &task.payload {
            TaskPayload::Process(payload) => Some(payload),
            TaskPayload::Download(_) => None,
        }
    }

    fn output_path(&self, payload: &ProcessTask) -> PathBuf {
        paths::derived_output_path(&self.output_dir, payload.observed_at, &payload.source_tag)
    }

    /// Delete the raw product directory once a terminal outcome is reached.
    async fn cleanup_raw(&self, raw_path: &str) {
        let raw_file = Path::new(raw_path);
        // The raw artifact lives in its own per-product directory; remove
        // the whole directory, not just the main file.
        let target = raw_file.parent().unwrap_or(raw_file);
        if tokio::fs::try_exists(target).await.unwrap_or(false) {
            if let Err(e) = tokio::fs::remove_dir_all(target).await {
                warn!("Failed to delete raw artifact {}: {}", target.display(), e);
            } else {
                info!("Deleted raw artifact {}", target.display());
            }
        }
    }

    fn quality_fields(report: &QualityReport) -> QualityFields {
        QualityFields {
            quality_score: report.quality_score,
            missing_data_pct: report.missing_data_pct,
            saturation_pct: report.saturation_pct,
        }
    }
}

#[async_trait]
impl StageWorker for ProcessWorker {
    fn stage(&self) -> Stage {
        Stage::Process
    }

    fn limits(&self) -> StageLimits {
        self.limits
    }

    fn retry_policy(&self) -> Option<&RetryPolicy> {
        // Processing failures are terminal; see the struct docs.
        None
    }

    async fn execute(&self, task: &Task) -> StageOutcome {
        let Some(payload) = self.payload(task) else {
            return StageOutcome::Fatal(format!(
                "process worker received {} payload",
                task.stage()
            ));
        };
        let file_id = &payload.file_id;

        info!("Starting processing for {}", file_id);

        if let Err(e) = self.manifest.apply(
            file_id,
            ManifestPatch::status(FileStatus::Processing).with_processing_attempt(task.attempt),
        ) {
            return StageOutcome::Fatal(format!("manifest rejected processing start: {}", e));
        }

        let output_path = self.output_path(payload);
        let started = Instant::now();

        let result = self
            .transformer
            .transform(Path::new(&payload.raw_path), &output_path)
            .await;
        let duration = started.elapsed().as_secs_f64();

        match result {
            Ok(report) if report.skip => {
                // A quality-gate skip is a designed terminal outcome, not an
                // error, and is never retried.
                let reason = report
                    .skip_reason
                    .clone()
                    .unwrap_or_else(|| "UNSPECIFIED".to_string());
                warn!("Skipping {}: {}", file_id, reason);

                if let Err(e) = self.manifest.apply(
                    file_id,
                    ManifestPatch::status(FileStatus::Skipped)
                        .with_skip_reason(reason)
                        .with_quality(Self::quality_fields(&report))
                        .with_processing_duration(duration)
                        .clearing_raw_path(),
                ) {
                    error!("Manifest rejected skip for {}: {}", file_id, e);
                }

                self.cleanup_raw(&payload.raw_path).await;
                metrics::PROCESSING_OUTCOMES
                    .with_label_values(&["skipped"])
                    .inc();
                StageOutcome::Success
            }
            Ok(report) => {
                info!(
                    "Processing complete for {} in {:.1}s: {}",
                    file_id,
                    duration,
                    output_path.display()
                );

                if let Err(e) = self.manifest.apply(
                    file_id,
                    ManifestPatch::status(FileStatus::Complete)
                        .with_output_path(output_path.to_string_lossy())
                        .with_quality(Self::quality_fields(&report))
                        .with_processing_duration(duration)
                        .clearing_raw_path(),
                ) {
                    error!("Manifest rejected completion for {}: {}", file_id, e);
                }

                self.cleanup_raw(&payload.raw_path).await;
                metrics::PROCESSING_OUTCOMES
                    .with_label_values(&["complete"])
                    .inc();
                metrics::PROCESSING_DURATION
                    .with_label_values(&[])
                    .observe(duration);
                StageOutcome::Success
            }
            Err(e) => StageOutcome::Fatal(e.to_string()),
        }
    }

    async fn abort_cleanup(&self, task: &Task) {
        if let Some(payload) = self.payload(task) {
            warn!(
                "Processing of {} force-aborted at the hard time limit",
                payload.file_id
            );
            let output_path = self.output_path(payload);
            if tokio::fs::try_exists(&output_path).await.unwrap_or(false) {
                let _ = tokio::fs::remove_file(&output_path).await;
            }
        }
    }

    async fn record_retry(&self, task: &Task, error: &str) {
        // No retry policy for this stage; nothing should route here.
        warn!(
            "Unexpected retry request for process task {}: {}",
            task.file_id(),
            error
        );
        self.record_failure(task, error).await;
    }

    async fn record_failure(&self, task: &Task, error: &str) {
        metrics::PROCESSING_OUTCOMES
            .with_label_values(&["failed"])
            .inc();
        error!("Processing of {} failed: {}", task.file_id(), error);

        if let Err(e) = self.manifest.apply(
            task.file_id(),
            ManifestPatch::status(FileStatus::ProcessingFailed)
                .with_error(error)
                .clearing_raw_path(),
        ) {
            warn!("Failed to mark {} as processing-failed: {}", task.file_id(), e);
        }

        // The raw artifact is discarded on every terminal outcome.
        if let Some(payload) = self.payload(task) {
            self.cleanup_raw(&payload.raw_path).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{NewFileRecord, SqliteManifestStore};
    use crate::testing::MockTransformer;
    use crate::transform::TransformError;
    use chrono::Utc;

    struct Fixture {
        manifest: Arc<SqliteManifestStore>,
        transformer: Arc<MockTransformer>,
        worker: ProcessWorker,
        raw_dir: tempfile::TempDir,
        _output_dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let manifest = Arc::new(SqliteManifestStore::in_memory().unwrap());
        let transformer = Arc::new(MockTransformer::new());
        let output_dir = tempfile::tempdir().unwrap();
        let worker = ProcessWorker::new(
            &ProcessingConfig::default(),
            output_dir.path(),
            Arc::clone(&manifest) as Arc<dyn ManifestStore>,
            Arc::clone(&transformer) as Arc<dyn Transformer>,
        );
        Fixture {
            manifest,
            transformer,
            worker,
            raw_dir: tempfile::tempdir().unwrap(),
            _output_dir: output_dir,
        }
    }

    /// Set up a Downloaded record with a raw artifact on disk and return
    /// the matching process task.
    fn downloaded_record(fx: &Fixture, file_id: &str) -> Task {
        let observed_at = Utc::now();
        let product_dir = fx.raw_dir.path().join(file_id);
        std::fs::create_dir_all(&product_dir).unwrap();
        let raw_file = product_dir.join("product.nat");
        std::fs::write(&raw_file, b"raw artifact bytes").unwrap();

        fx.manifest
            .insert_if_absent(NewFileRecord {
                file_id: file_id.to_string(),
                observed_at,
                source_tag: "MSG4".to_string(),
                product_type: "HRSEVIRI".to_string(),
                size_bytes: 18,
            })
            .unwrap();
        fx.manifest
            .apply(
                file_id,
                ManifestPatch::status(FileStatus::Downloading).with_download_attempt(1),
            )
            .unwrap();
        fx.manifest
            .apply(
                file_id,
                ManifestPatch::status(FileStatus::Downloaded)
                    .with_raw_path(product_dir.to_string_lossy()),
            )
            .unwrap();

        Task::process(file_id, raw_file.to_string_lossy(), observed_at, "MSG4")
    }

    #[tokio::test]
    async fn test_successful_transform_completes_record() {
        let fx = fixture();
        let task = downloaded_record(&fx, "f-1");
        fx.transformer
            .push_outcome(Ok(QualityReport::passing(96.0, 4.0, 1.2)))
            .await;

        let outcome = fx.worker.execute(&task).await;
        assert_eq!(outcome, StageOutcome::Success);

        let record = fx.manifest.get("f-1").unwrap().unwrap();
        assert_eq!(record.status, FileStatus::Complete);
        assert!(record.output_path.is_some());
        assert_eq!(record.quality_score, Some(96.0));
        assert_eq!(record.missing_data_pct, Some(4.0));
        assert!(record.processing_duration_secs.is_some());

        // Cleanup invariant: the raw artifact is gone and the record no
        // longer points at it.
        assert!(record.raw_path.is_none());
        let payload = match &task.payload {
            TaskPayload::Process(p) => p,
            _ => unreachable!(),
        };
        assert!(!Path::new(&payload.raw_path).exists());
    }

    #[tokio::test]
    async fn test_skip_report_is_terminal_skipped_not_failed() {
        let fx = fixture();
        let task = downloaded_record(&fx, "f-1");
        fx.transformer
            .push_outcome(Ok(QualityReport::skipped("NIGHTTIME_IMAGE (SZA=92.1)", 1.0)))
            .await;

        let outcome = fx.worker.execute(&task).await;
        assert_eq!(outcome, StageOutcome::Success);

        let record = fx.manifest.get("f-1").unwrap().unwrap();
        assert_eq!(record.status, FileStatus::Skipped);
        assert!(record
            .skip_reason
            .as_deref()
            .unwrap()
            .contains("NIGHTTIME_IMAGE"));
        assert!(record.error_message.is_none());
        assert!(record.output_path.is_none());
        assert!(record.raw_path.is_none());

        let payload = match &task.payload {
            TaskPayload::Process(p) => p,
            _ => unreachable!(),
        };
        assert!(!Path::new(&payload.raw_path).exists());
    }

    #[tokio::test]
    async fn test_decode_error_is_fatal() {
        let fx = fixture();
        let task = downloaded_record(&fx, "f-1");
        fx.transformer
            .push_outcome(Err(TransformError::Decode {
                path: PathBuf::from("/raw/p/product.nat"),
                reason: "unrecognized header".to_string(),
            }))
            .await;

        let outcome = fx.worker.execute(&task).await;
        assert!(matches!(outcome, StageOutcome::Fatal(_)));

        // The failure transition happens in record_failure, driven by the
        // pool; simulate it.
        if let StageOutcome::Fatal(error) = outcome {
            fx.worker.record_failure(&task, &error).await;
        }

        let record = fx.manifest.get("f-1").unwrap().unwrap();
        assert_eq!(record.status, FileStatus::ProcessingFailed);
        assert!(record.error_message.as_deref().unwrap().contains("decode"));
        assert!(record.raw_path.is_none());

        let payload = match &task.payload {
            TaskPayload::Process(p) => p,
            _ => unreachable!(),
        };
        assert!(!Path::new(&payload.raw_path).exists());
    }

    #[tokio::test]
    async fn test_no_retry_policy_for_processing() {
        let fx = fixture();
        assert!(fx.worker.retry_policy().is_none());
    }

    #[tokio::test]
    async fn test_wrong_payload_is_fatal() {
        let fx = fixture();
        let task = Task::download(
            "f-1",
            crate::catalog::ProductDescriptor {
                file_id: "f-1".to_string(),
                timestamp: Utc::now(),
                source_tag: "MSG4".to_string(),
                product_type: "HRSEVIRI".to_string(),
                size_bytes: 0,
            },
        );
        let outcome = fx.worker.execute(&task).await;
        assert!(matches!(outcome, StageOutcome::Fatal(_)));
    }
}

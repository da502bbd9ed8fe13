//! Core manifest data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current status of a file in the pipeline.
///
/// State machine flow:
/// ```text
/// Queued -> Downloading -> Downloaded -> Processing -> Complete
///               |  ^                         |      \-> Skipped
///               v  |                         v
///             Retry                   ProcessingFailed
///               |
///               v (attempts exhausted)
///             Failed
/// ```
///
/// `Complete`, `Skipped`, `Failed` and `ProcessingFailed` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileStatus {
    /// Discovered and recorded, waiting for a download worker.
    Queued,
    /// A download worker is fetching the raw artifact.
    Downloading,
    /// Download failed transiently, waiting for delayed re-delivery.
    Retry,
    /// Raw artifact is on disk, waiting for a process worker.
    Downloaded,
    /// A process worker is running the transform.
    Processing,
    /// Derived artifact produced (terminal).
    Complete,
    /// Quality gate decided the artifact is not worth keeping (terminal).
    Skipped,
    /// Download attempts exhausted (terminal).
    Failed,
    /// Transform failed or timed out (terminal).
    ProcessingFailed,
}

impl FileStatus {
    /// Returns the status as the string stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Queued => "QUEUED",
            FileStatus::Downloading => "DOWNLOADING",
            FileStatus::Retry => "RETRY",
            FileStatus::Downloaded => "DOWNLOADED",
            FileStatus::Processing => "PROCESSING",
            FileStatus::Complete => "COMPLETE",
            FileStatus::Skipped => "SKIPPED",
            FileStatus::Failed => "FAILED",
            FileStatus::ProcessingFailed => "PROCESSING_FAILED",
        }
    }

    /// Parses the database representation back into a status.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "QUEUED" => Some(FileStatus::Queued),
            "DOWNLOADING" => Some(FileStatus::Downloading),
            "RETRY" => Some(FileStatus::Retry),
            "DOWNLOADED" => Some(FileStatus::Downloaded),
            "PROCESSING" => Some(FileStatus::Processing),
            "COMPLETE" => Some(FileStatus::Complete),
            "SKIPPED" => Some(FileStatus::Skipped),
            "FAILED" => Some(FileStatus::Failed),
            "PROCESSING_FAILED" => Some(FileStatus::ProcessingFailed),
            _ => None,
        }
    }

    /// Returns true if no further transition is possible from this status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FileStatus::Complete
                | FileStatus::Skipped
                | FileStatus::Failed
                | FileStatus::ProcessingFailed
        )
    }

    /// Returns true if a transition from `self` to `next` is legal.
    ///
    /// Statuses only move forward along the graph. The in-progress states
    /// allow re-entry (`Downloading -> Downloading`, `Processing ->
    /// Processing`) because the queue is at-least-once: a re-delivered task
    /// may find its record already marked in-progress by a crashed worker.
    pub fn can_transition_to(&self, next: FileStatus) -> bool {
        use FileStatus::*;
        match self {
            Queued => matches!(next, Downloading),
            Downloading => matches!(next, Downloading | Downloaded | Retry | Failed),
            Retry => matches!(next, Downloading | Failed),
            Downloaded => matches!(next, Processing),
            Processing => matches!(next, Processing | Complete | Skipped | ProcessingFailed),
            Complete | Skipped | Failed | ProcessingFailed => false,
        }
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the manifest: the full lifecycle record of a discovered
/// artifact. Never deleted, it is the permanent audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileRecord {
    /// Catalog-assigned globally unique identifier.
    pub file_id: String,
    /// Nominal sensing timestamp.
    pub observed_at: DateTime<Utc>,
    /// Satellite / origin identifier.
    pub source_tag: String,
    /// Catalog product type.
    pub product_type: String,
    /// Size reported by the catalog at discovery time, in bytes.
    pub size_bytes: u64,
    pub status: FileStatus,
    pub download_attempt: u32,
    pub processing_attempt: u32,
    pub error_message: Option<String>,
    pub skip_reason: Option<String>,
    /// Set once downloaded, cleared when the raw artifact is deleted after a
    /// terminal processing outcome.
    pub raw_path: Option<String>,
    pub output_path: Option<String>,
    pub quality_score: Option<f64>,
    pub missing_data_pct: Option<f64>,
    pub saturation_pct: Option<f64>,
    pub download_duration_secs: Option<f64>,
    pub processing_duration_secs: Option<f64>,
    pub queued_at: DateTime<Utc>,
    pub download_started_at: Option<DateTime<Utc>>,
    pub downloaded_at: Option<DateTime<Utc>>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for the idempotent insert performed by the discovery scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFileRecord {
    pub file_id: String,
    pub observed_at: DateTime<Utc>,
    pub source_tag: String,
    pub product_type: String,
    pub size_bytes: u64,
}

/// Quality fields reported by the transform collaborator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct QualityFields {
    pub quality_score: f64,
    pub missing_data_pct: f64,
    pub saturation_pct: f64,
}

/// A typed partial update applied to a single manifest row.
///
/// Every transition in the pipeline is one of these: the target status plus
/// whichever columns the caller supplies. Fields left `None` keep their
/// stored values; the store applies the whole patch through a single
/// parameterized UPDATE, so there is no read-modify-write cycle and
/// concurrent workers touching different rows never contend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManifestPatch {
    pub status: Option<FileStatus>,
    pub download_attempt: Option<u32>,
    pub processing_attempt: Option<u32>,
    pub error_message: Option<String>,
    pub skip_reason: Option<String>,
    pub raw_path: Option<String>,
    /// Clears `raw_path` (wins over `raw_path` if both are set). Used when
    /// the raw artifact is deleted after a terminal processing outcome.
    pub clear_raw_path: bool,
    pub output_path: Option<String>,
    pub quality: Option<QualityFields>,
    pub download_duration_secs: Option<f64>,
    pub processing_duration_secs: Option<f64>,
}

impl ManifestPatch {
    /// Start a patch transitioning to `status`.
    pub fn status(status: FileStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_download_attempt(mut self, attempt: u32) -> Self {
        self.download_attempt = Some(attempt);
        self
    }

    pub fn with_processing_attempt(mut self, attempt: u32) -> Self {
        self.processing_attempt = Some(attempt);
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_skip_reason(mut self, reason: impl Into<String>) -> Self {
        self.skip_reason = Some(reason.into());
        self
    }

    pub fn with_raw_path(mut self, path: impl Into<String>) -> Self {
        self.raw_path = Some(path.into());
        self
    }

    pub fn clearing_raw_path(mut self) -> Self {
        self.clear_raw_path = true;
        self
    }

    pub fn with_output_path(mut self, path: impl Into<String>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn with_quality(mut self, quality: QualityFields) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn with_download_duration(mut self, secs: f64) -> Self {
        self.download_duration_secs = Some(secs);
        self
    }

    pub fn with_processing_duration(mut self, secs: f64) -> Self {
        self.processing_duration_secs = Some(secs);
        self
    }
}

/// Outcome of one discovery cycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryOutcome {
    Success,
    Failed,
}

impl QueryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryOutcome::Success => "SUCCESS",
            QueryOutcome::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SUCCESS" => Some(QueryOutcome::Success),
            "FAILED" => Some(QueryOutcome::Failed),
            _ => None,
        }
    }
}

/// One entry of the append-only discovery audit log. Written by the
/// scheduler after every cycle, successful or not. Never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryLogEntry {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub files_found: u64,
    pub files_new: u64,
    pub duration_ms: u64,
    pub outcome: QueryOutcome,
    pub error_message: Option<String>,
}

/// A stored query log entry.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QueryLogRecord {
    pub id: i64,
    pub logged_at: DateTime<Utc>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub files_found: u64,
    pub files_new: u64,
    pub duration_ms: u64,
    pub outcome: QueryOutcome,
    pub error_message: Option<String>,
}

/// Count of manifest rows in one status, for the operational status surface.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusCount {
    pub status: FileStatus,
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queued_is_initial_not_terminal() {
        assert!(!FileStatus::Queued.is_terminal());
        assert!(FileStatus::Queued.can_transition_to(FileStatus::Downloading));
        assert!(!FileStatus::Queued.can_transition_to(FileStatus::Downloaded));
        assert!(!FileStatus::Queued.can_transition_to(FileStatus::Processing));
    }

    #[test]
    fn test_download_retry_loop() {
        assert!(FileStatus::Downloading.can_transition_to(FileStatus::Retry));
        assert!(FileStatus::Retry.can_transition_to(FileStatus::Downloading));
        assert!(FileStatus::Retry.can_transition_to(FileStatus::Failed));
        assert!(!FileStatus::Retry.can_transition_to(FileStatus::Downloaded));
    }

    #[test]
    fn test_cannot_skip_downloaded_before_processing() {
        assert!(!FileStatus::Downloading.can_transition_to(FileStatus::Processing));
        assert!(FileStatus::Downloading.can_transition_to(FileStatus::Downloaded));
        assert!(FileStatus::Downloaded.can_transition_to(FileStatus::Processing));
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for terminal in [
            FileStatus::Complete,
            FileStatus::Skipped,
            FileStatus::Failed,
            FileStatus::ProcessingFailed,
        ] {
            assert!(terminal.is_terminal());
            for next in [
                FileStatus::Queued,
                FileStatus::Downloading,
                FileStatus::Retry,
                FileStatus::Downloaded,
                FileStatus::Processing,
                FileStatus::Complete,
                FileStatus::Skipped,
                FileStatus::Failed,
                FileStatus::ProcessingFailed,
            ] {
                assert!(
                    !terminal.can_transition_to(next),
                    "{} -> {} should be rejected",
                    terminal,
                    next
                );
            }
        }
    }

    #[test]
    fn test_in_progress_states_allow_reentry() {
        assert!(FileStatus::Downloading.can_transition_to(FileStatus::Downloading));
        assert!(FileStatus::Processing.can_transition_to(FileStatus::Processing));
        assert!(!FileStatus::Queued.can_transition_to(FileStatus::Queued));
    }

    #[test]
    fn test_processing_outcomes() {
        assert!(FileStatus::Processing.can_transition_to(FileStatus::Complete));
        assert!(FileStatus::Processing.can_transition_to(FileStatus::Skipped));
        assert!(FileStatus::Processing.can_transition_to(FileStatus::ProcessingFailed));
        assert!(!FileStatus::Processing.can_transition_to(FileStatus::Failed));
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            FileStatus::Queued,
            FileStatus::Downloading,
            FileStatus::Retry,
            FileStatus::Downloaded,
            FileStatus::Processing,
            FileStatus::Complete,
            FileStatus::Skipped,
            FileStatus::Failed,
            FileStatus::ProcessingFailed,
        ] {
            assert_eq!(FileStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(FileStatus::parse("NOT_A_STATUS"), None);
    }

    #[test]
    fn test_status_serde_matches_db_representation() {
        let json = serde_json::to_string(&FileStatus::ProcessingFailed).unwrap();
        assert_eq!(json, "\"PROCESSING_FAILED\"");
        let parsed: FileStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, FileStatus::ProcessingFailed);
    }

    #[test]
    fn test_patch_builder() {
        let patch = ManifestPatch::status(FileStatus::Downloaded)
            .with_raw_path("/raw/2026/02/14/prod")
            .with_download_duration(12.5);

        assert_eq!(patch.status, Some(FileStatus::Downloaded));
        assert_eq!(patch.raw_path.as_deref(), Some("/raw/2026/02/14/prod"));
        assert_eq!(patch.download_duration_secs, Some(12.5));
        assert!(!patch.clear_raw_path);
        assert!(patch.error_message.is_none());
    }

    #[test]
    fn test_patch_clear_raw_path() {
        let patch = ManifestPatch::status(FileStatus::Complete)
            .with_output_path("/processed/out.nc")
            .clearing_raw_path();
        assert!(patch.clear_raw_path);
        assert!(patch.raw_path.is_none());
    }

    #[test]
    fn test_query_outcome_round_trip() {
        assert_eq!(QueryOutcome::parse("SUCCESS"), Some(QueryOutcome::Success));
        assert_eq!(QueryOutcome::parse("FAILED"), Some(QueryOutcome::Failed));
        assert_eq!(QueryOutcome::parse("nope"), None);
    }
}

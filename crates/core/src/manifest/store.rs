//! Manifest storage trait and filter types.

use std::fmt;

use crate::manifest::{
    FileRecord, FileStatus, ManifestPatch, NewFileRecord, QueryLogEntry, QueryLogRecord,
    StatusCount,
};

/// Error type for manifest operations.
#[derive(Debug)]
pub enum ManifestError {
    /// No record with the given file id.
    NotFound(String),
    /// The requested status change is not a legal forward transition.
    InvalidTransition {
        file_id: String,
        from: FileStatus,
        to: FileStatus,
    },
    /// Database error.
    Database(String),
}

impl fmt::Display for ManifestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestError::NotFound(id) => write!(f, "File not found in manifest: {}", id),
            ManifestError::InvalidTransition { file_id, from, to } => write!(
                f,
                "Illegal status transition for {}: {} -> {}",
                file_id, from, to
            ),
            ManifestError::Database(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl std::error::Error for ManifestError {}

/// Filter for listing manifest records.
#[derive(Debug, Clone)]
pub struct ManifestFilter {
    /// Filter by status.
    pub status: Option<FileStatus>,
    /// Filter by source tag.
    pub source_tag: Option<String>,
    /// Maximum number of results.
    pub limit: i64,
    /// Offset for pagination.
    pub offset: i64,
}

impl Default for ManifestFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl ManifestFilter {
    pub fn new() -> Self {
        Self {
            status: None,
            source_tag: None,
            limit: 100,
            offset: 0,
        }
    }

    pub fn with_status(mut self, status: FileStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_source_tag(mut self, source_tag: impl Into<String>) -> Self {
        self.source_tag = Some(source_tag.into());
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Trait for manifest storage backends.
///
/// The manifest is the single source of truth for per-artifact pipeline
/// state; all components read and write it instead of sharing state
/// directly. Implementations must make `insert_if_absent` idempotent and
/// `apply` a single atomic per-row update.
pub trait ManifestStore: Send + Sync {
    /// Insert a newly discovered file at `Queued` if no record with that
    /// file id exists. Returns true if a row was inserted, false if the id
    /// was already known (dedup hit).
    fn insert_if_absent(&self, record: NewFileRecord) -> Result<bool, ManifestError>;

    /// Get a record by file id.
    fn get(&self, file_id: &str) -> Result<Option<FileRecord>, ManifestError>;

    /// List records matching the filter, most recently observed first.
    fn list(&self, filter: &ManifestFilter) -> Result<Vec<FileRecord>, ManifestError>;

    /// Count records matching the filter.
    fn count(&self, filter: &ManifestFilter) -> Result<i64, ManifestError>;

    /// Apply a patch to a single record, validating the status transition.
    /// Returns the updated record.
    fn apply(&self, file_id: &str, patch: ManifestPatch) -> Result<FileRecord, ManifestError>;

    /// Counts of records by status over a trailing observation window.
    /// Operational surface only, not part of the pipeline logic.
    fn counts_by_status(&self, trailing_hours: i64) -> Result<Vec<StatusCount>, ManifestError>;

    /// Append one discovery cycle outcome to the query log.
    fn log_query(&self, entry: QueryLogEntry) -> Result<i64, ManifestError>;

    /// Most recent query log entries, newest first.
    fn recent_queries(&self, limit: i64) -> Result<Vec<QueryLogRecord>, ManifestError>;
}

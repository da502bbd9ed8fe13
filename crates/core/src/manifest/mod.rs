//! Durable per-artifact state: the file manifest and the discovery query log.
//!
//! The manifest is the single source of truth for the pipeline. Records are
//! created by the discovery scheduler at `Queued`, mutated exclusively by
//! the worker pool owning the current stage, and never deleted.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteManifestStore;
pub use store::{ManifestError, ManifestFilter, ManifestStore};
pub use types::{
    FileRecord, FileStatus, ManifestPatch, NewFileRecord, QualityFields, QueryLogEntry,
    QueryLogRecord, QueryOutcome, StatusCount,
};

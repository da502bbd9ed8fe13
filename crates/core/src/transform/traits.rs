//! Trait definition and errors for the transform collaborator.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use super::types::QualityReport;

/// Errors from the transform collaborator.
#[derive(Debug, Error)]
pub enum TransformError {
    /// The raw format could not be parsed. Terminal for the artifact.
    #[error("Failed to decode raw artifact {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    /// Transform tool binary not found.
    #[error("Transform tool not found at path: {path}")]
    ToolNotFound { path: PathBuf },

    /// The tool ran but exited unsuccessfully.
    #[error("Transform failed: {reason}")]
    TransformFailed {
        reason: String,
        stderr: Option<String>,
    },

    /// The tool produced an unreadable quality report.
    #[error("Malformed quality report: {reason}")]
    MalformedReport { reason: String },

    /// I/O error while running the transform.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A transform that decodes, calibrates, reprojects and quality-scores a
/// raw artifact into a derived product.
///
/// On success the derived artifact is written to `output_path` unless the
/// returned report says `skip`, in which case nothing is produced.
#[async_trait]
pub trait Transformer: Send + Sync {
    /// Returns the name of this transformer implementation.
    fn name(&self) -> &str;

    /// Run the transform chain on `input_path`, writing the derived
    /// artifact to `output_path` and returning the quality report.
    async fn transform(
        &self,
        input_path: &Path,
        output_path: &Path,
    ) -> Result<QualityReport, TransformError>;
}

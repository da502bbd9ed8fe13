//! Mock transformer for testing.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::transform::{QualityReport, TransformError, Transformer};

/// Mock implementation of the [`Transformer`] trait.
///
/// Outcomes are scripted as a queue: each `transform` call consumes the
/// next one. With no scripted outcome, transforms succeed with a default
/// passing report. Non-skip successes write a small derived artifact to the
/// requested output path so cleanup assertions have something real to check.
pub struct MockTransformer {
    outcomes: Arc<RwLock<VecDeque<Result<QualityReport, TransformError>>>>,
    calls: Arc<RwLock<Vec<(PathBuf, PathBuf)>>>,
}

impl Default for MockTransformer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransformer {
    pub fn new() -> Self {
        Self {
            outcomes: Arc::new(RwLock::new(VecDeque::new())),
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Queue the outcome of the next transform call.
    pub async fn push_outcome(&self, outcome: Result<QualityReport, TransformError>) {
        self.outcomes.write().await.push_back(outcome);
    }

    /// All (input, output) path pairs transformed so far.
    pub async fn recorded_calls(&self) -> Vec<(PathBuf, PathBuf)> {
        self.calls.read().await.clone()
    }
}

#[async_trait]
impl Transformer for MockTransformer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn transform(
        &self,
        input_path: &Path,
        output_path: &Path,
    ) -> Result<QualityReport, TransformError> {
        self.calls
            .write()
            .await
            .push((input_path.to_path_buf(), output_path.to_path_buf()));

        let outcome = self
            .outcomes
            .write()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(QualityReport::passing(100.0, 0.0, 0.0)));

        match outcome {
            Ok(report) => {
                if !report.skip {
                    if let Some(parent) = output_path.parent() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                    tokio::fs::write(output_path, b"mock derived artifact").await?;
                }
                Ok(report)
            }
            Err(e) => Err(e),
        }
    }
}

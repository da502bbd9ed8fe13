//! Stage worker trait and outcome types.

use async_trait::async_trait;

use crate::queue::{RetryPolicy, Stage, StageLimits, Task};

/// Result of one stage execution, interpreted by the worker pool loop.
///
/// Retry-vs-terminal is an explicit tag, not control flow: the stage
/// operation reports what happened and the pool decides what to do with it
/// based on the stage's retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// The stage side effect happened and the manifest was advanced.
    Success,
    /// Transient failure; eligible for delayed re-delivery if the stage's
    /// retry policy allows another attempt.
    Retryable(String),
    /// Failure that no retry can fix; goes terminal immediately.
    Fatal(String),
}

/// One stage's worker logic, driven by a [`super::WorkerPool`].
///
/// `execute` performs the stage's side effect and its success-path manifest
/// transitions. Failure-path transitions live in `record_retry` /
/// `record_failure` so the pool can apply the retry policy between the two.
#[async_trait]
pub trait StageWorker: Send + Sync {
    /// The stage whose queue this worker pulls from.
    fn stage(&self) -> Stage;

    /// Execution time limits for this stage.
    fn limits(&self) -> StageLimits;

    /// Retry policy for transient failures. `None` means every failure is
    /// terminal for this stage.
    fn retry_policy(&self) -> Option<&RetryPolicy>;

    /// Run the stage for one task.
    async fn execute(&self, task: &Task) -> StageOutcome;

    /// Clean up partial side effects after the hard time limit forcibly
    /// aborted `execute` (the aborted future cannot clean up after itself).
    async fn abort_cleanup(&self, task: &Task);

    /// Record a transient failure that will be re-delivered.
    async fn record_retry(&self, task: &Task, error: &str);

    /// Record a terminal failure.
    async fn record_failure(&self, task: &Task, error: &str);
}

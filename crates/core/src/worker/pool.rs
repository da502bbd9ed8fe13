//! Stage worker pool.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::metrics;
use crate::queue::{Task, TaskQueue};

use super::types::{StageOutcome, StageWorker};

/// A pool of identical members pulling tasks for one stage.
///
/// Each member holds at most one task at a time (no prefetch), so per-task
/// resource accounting stays accurate and memory stays bounded for large
/// payloads. A task failure never takes a member down: failures are
/// outcomes, and a panic only kills the one task whose dropped lease
/// re-delivers it.
pub struct WorkerPool {
    queue: Arc<dyn TaskQueue>,
    worker: Arc<dyn StageWorker>,
    members: usize,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl WorkerPool {
    pub fn new(queue: Arc<dyn TaskQueue>, worker: Arc<dyn StageWorker>, members: usize) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            queue,
            worker,
            members,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    /// Start the pool members (spawns background tasks).
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("{} worker pool already running", self.worker.stage());
            return;
        }

        info!(
            "Starting {} worker pool with {} members",
            self.worker.stage(),
            self.members
        );

        for member in 0..self.members {
            let queue = Arc::clone(&self.queue);
            let worker = Arc::clone(&self.worker);
            let running = Arc::clone(&self.running);
            let mut shutdown_rx = self.shutdown_tx.subscribe();

            tokio::spawn(async move {
                let stage = worker.stage();
                debug!("{} worker {} started", stage, member);
                loop {
                    tokio::select! {
                        _ = shutdown_rx.recv() => break,
                        lease = queue.dequeue(stage) => {
                            let lease = match lease {
                                Ok(lease) => lease,
                                Err(_) => break,
                            };
                            if !running.load(Ordering::Relaxed) {
                                // Shutting down; the dropped lease re-delivers.
                                break;
                            }
                            let task = lease.task().clone();
                            Self::handle(&worker, &queue, task).await;
                            lease.ack();

                            metrics::QUEUE_DEPTH
                                .with_label_values(&[stage.as_str()])
                                .set(queue.depth(stage) as i64);
                        }
                    }
                }
                debug!("{} worker {} stopped", stage, member);
            });
        }
    }

    /// Stop the pool. Members finish their current task; unacked tasks
    /// re-deliver on the next start.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("Stopping {} worker pool", self.worker.stage());
        let _ = self.shutdown_tx.send(());
    }

    /// Run one task to its outcome and apply the stage's retry discipline.
    async fn handle(worker: &Arc<dyn StageWorker>, queue: &Arc<dyn TaskQueue>, task: Task) {
        let limits = worker.limits();

        let outcome = match timeout(limits.hard_time_limit, worker.execute(&task)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                // Forced abort: the execute future is gone, so it cannot
                // clean up after itself.
                warn!(
                    "{} task for {} hit the hard time limit, aborted",
                    task.stage(),
                    task.file_id()
                );
                worker.abort_cleanup(&task).await;
                StageOutcome::Retryable("hard time limit exceeded".to_string())
            }
        };

        match outcome {
            StageOutcome::Success => {
                debug!("{} task for {} succeeded", task.stage(), task.file_id());
            }
            StageOutcome::Retryable(cause) => match worker.retry_policy() {
                Some(policy) if !policy.exhausted(task.attempt) => {
                    let delay = policy.delay_for(task.attempt);
                    info!(
                        "Retrying {} for {} in {:?} (attempt {} of {} failed: {})",
                        task.stage(),
                        task.file_id(),
                        delay,
                        task.attempt,
                        policy.max_attempts,
                        cause
                    );
                    worker.record_retry(&task, &cause).await;
                    if let Err(e) = queue.retry(task.clone(), delay) {
                        error!("Failed to schedule retry for {}: {}", task.file_id(), e);
                    }
                }
                Some(_) => {
                    worker
                        .record_failure(&task, &format!("Max retries reached: {}", cause))
                        .await;
                }
                None => {
                    worker.record_failure(&task, &cause).await;
                }
            },
            StageOutcome::Fatal(cause) => {
                worker.record_failure(&task, &cause).await;
            }
        }
    }
}

//! Async dispatch of executions onto a worker.
//!
//! The engine hands execution ids to a [`Dispatcher`] and returns
//! immediately. The in-process [`TaskQueue`] drives the step executor with
//! bounded retries and exponential backoff for orchestration errors. Step
//! failures never reach this layer; they end the run with a `failed`
//! execution that only an explicit resume restarts.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::executor::StepExecutor;
use crate::repository::WorkflowRepository;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("task queue is closed")]
    QueueClosed,
}

/// Port the engine enqueues freshly created executions on.
pub trait Dispatcher: Send + Sync {
    fn enqueue(
        &self,
        execution_id: Uuid,
    ) -> impl std::future::Future<Output = Result<(), DispatchError>> + Send;
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Retry contract for orchestration failures: bounded attempts with
/// exponential backoff. Tasks whose execution no longer exists are
/// discarded without retry.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// `attempt` counts completed attempts, starting at 1.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay before the attempt following `attempt`: base * 2^(attempt-1),
    /// capped at `max_delay`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_delay)
    }
}

// ---------------------------------------------------------------------------
// Task queue
// ---------------------------------------------------------------------------

/// In-process dispatcher backed by an unbounded tokio channel. Each
/// received execution runs on its own spawned task, so slow runs never
/// block the queue.
pub struct TaskQueue {
    tx: mpsc::UnboundedSender<Uuid>,
}

impl TaskQueue {
    /// Start the worker loop. The returned handle completes once the
    /// shutdown token fires or every sender is dropped.
    pub fn start<R>(
        executor: Arc<StepExecutor<R>>,
        policy: RetryPolicy,
        shutdown: CancellationToken,
    ) -> (Self, JoinHandle<()>)
    where
        R: WorkflowRepository + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<Uuid>();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::info!("task queue shutting down");
                        break;
                    }
                    message = rx.recv() => match message {
                        Some(execution_id) => {
                            let executor = Arc::clone(&executor);
                            let policy = policy.clone();
                            tokio::spawn(async move {
                                run_with_retry(executor, policy, execution_id).await;
                            });
                        }
                        None => break,
                    }
                }
            }
        });
        (Self { tx }, handle)
    }
}

impl Dispatcher for TaskQueue {
    async fn enqueue(&self, execution_id: Uuid) -> Result<(), DispatchError> {
        self.tx
            .send(execution_id)
            .map_err(|_| DispatchError::QueueClosed)
    }
}

async fn run_with_retry<R: WorkflowRepository>(
    executor: Arc<StepExecutor<R>>,
    policy: RetryPolicy,
    execution_id: Uuid,
) {
    let mut attempt = 1u32;
    loop {
        match executor.run(execution_id).await {
            Ok(execution) => {
                tracing::debug!(
                    execution_id = %execution_id,
                    status = execution.status.as_str(),
                    "execution task finished"
                );
                return;
            }
            Err(err) if err.is_discardable() => {
                tracing::warn!(
                    execution_id = %execution_id,
                    error = %err,
                    "discarding task for missing execution"
                );
                return;
            }
            Err(err) => {
                if policy.should_retry(attempt) {
                    let delay = policy.backoff_delay(attempt);
                    tracing::warn!(
                        execution_id = %execution_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "execution task failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                } else {
                    tracing::error!(
                        execution_id = %execution_id,
                        attempts = attempt,
                        error = %err,
                        "execution task failed, giving up"
                    );
                    return;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

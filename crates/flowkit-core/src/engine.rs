//! Engine facade: execute, resume, and cancel workflow runs.
//!
//! Precondition violations (`NotExecutable`, `NotResumable`,
//! `NotCancellable`) are reported synchronously and change no state; all
//! actual step work happens in the executor, reached either through the
//! dispatcher (`execute`) or inline (`execute_sync`).

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use flowkit_types::error::RepositoryError;
use flowkit_types::workflow::{
    ExecutionStatus, StepLogStatus, TriggerType, Workflow, WorkflowExecution,
};

use crate::dispatch::{DispatchError, Dispatcher};
use crate::executor::{ExecutorError, StepExecutor};
use crate::repository::WorkflowRepository;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("workflow is not executable: {0}")]
    NotExecutable(String),

    #[error("execution is not resumable: {0}")]
    NotResumable(String),

    #[error("execution is not cancellable: {0}")]
    NotCancellable(String),

    #[error("workflow not found: {0}")]
    WorkflowNotFound(Uuid),

    #[error("execution not found: {0}")]
    ExecutionNotFound(Uuid),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

pub struct WorkflowEngine<R, D> {
    repo: Arc<R>,
    dispatcher: Arc<D>,
    executor: Arc<StepExecutor<R>>,
}

impl<R, D> WorkflowEngine<R, D>
where
    R: WorkflowRepository,
    D: Dispatcher,
{
    pub fn new(repo: Arc<R>, dispatcher: Arc<D>, executor: Arc<StepExecutor<R>>) -> Self {
        Self {
            repo,
            dispatcher,
            executor,
        }
    }

    /// Start a run asynchronously: create a pending execution and enqueue
    /// it. Returns the pending execution immediately.
    pub async fn execute(
        &self,
        workflow_id: Uuid,
        trigger_source: TriggerType,
        trigger_data: Value,
    ) -> Result<WorkflowExecution, EngineError> {
        let workflow = self.load_executable(workflow_id).await?;
        let execution = WorkflowExecution::new(&workflow, trigger_source, trigger_data);
        self.repo.create_execution(&execution).await?;
        self.dispatcher.enqueue(execution.id).await?;
        tracing::info!(
            workflow_id = %workflow_id,
            execution_id = %execution.id,
            trigger = trigger_source.as_str(),
            "execution enqueued"
        );
        Ok(execution)
    }

    /// Start a run and drive it to a terminal status inline.
    pub async fn execute_sync(
        &self,
        workflow_id: Uuid,
        trigger_source: TriggerType,
        trigger_data: Value,
    ) -> Result<WorkflowExecution, EngineError> {
        let workflow = self.load_executable(workflow_id).await?;
        let execution = WorkflowExecution::new(&workflow, trigger_source, trigger_data);
        self.repo.create_execution(&execution).await?;
        Ok(self.executor.run(execution.id).await?)
    }

    /// Restart a failed execution: failed step logs go back to pending and
    /// the execution is re-enqueued. Completed steps will be skipped by the
    /// executor; `retry_count` on the reset logs is preserved.
    pub async fn resume(&self, execution_id: Uuid) -> Result<WorkflowExecution, EngineError> {
        let mut execution = self
            .repo
            .get_execution(execution_id)
            .await?
            .ok_or(EngineError::ExecutionNotFound(execution_id))?;

        if execution.status != ExecutionStatus::Failed {
            return Err(EngineError::NotResumable(format!(
                "status is {}, expected failed",
                execution.status.as_str()
            )));
        }
        let logs = self.repo.list_step_logs(execution_id).await?;
        if !logs.iter().any(|l| l.status == StepLogStatus::Failed) {
            return Err(EngineError::NotResumable(
                "no failed step logs to reset".to_string(),
            ));
        }

        let reset = self.repo.reset_failed_step_logs(execution_id).await?;
        execution.status = ExecutionStatus::Running;
        execution.error_message = None;
        execution.completed_at = None;
        execution.duration_ms = None;
        self.repo.update_execution(&execution).await?;
        self.dispatcher.enqueue(execution.id).await?;
        tracing::info!(
            execution_id = %execution_id,
            reset_steps = reset,
            "execution resumed"
        );
        Ok(execution)
    }

    /// Mark a pending or running execution cancelled. A running executor
    /// observes the new status at its next step boundary.
    pub async fn cancel(&self, execution_id: Uuid) -> Result<WorkflowExecution, EngineError> {
        let mut execution = self
            .repo
            .get_execution(execution_id)
            .await?
            .ok_or(EngineError::ExecutionNotFound(execution_id))?;

        match execution.status {
            ExecutionStatus::Pending | ExecutionStatus::Running => {
                execution.status = ExecutionStatus::Cancelled;
                execution.completed_at = Some(chrono::Utc::now());
                self.repo.update_execution(&execution).await?;
                tracing::info!(execution_id = %execution_id, "execution cancelled");
                Ok(execution)
            }
            other => Err(EngineError::NotCancellable(format!(
                "status is {}",
                other.as_str()
            ))),
        }
    }

    async fn load_executable(&self, workflow_id: Uuid) -> Result<Workflow, EngineError> {
        let workflow = self
            .repo
            .get_workflow(workflow_id)
            .await?
            .ok_or(EngineError::WorkflowNotFound(workflow_id))?;
        if !workflow.is_executable() {
            return Err(EngineError::NotExecutable(format!(
                "workflow {} is {} with {} enabled steps",
                workflow_id,
                workflow.status.as_str(),
                workflow.steps.iter().filter(|s| s.enabled).count()
            )));
        }
        Ok(workflow)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

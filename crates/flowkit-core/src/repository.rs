//! Persistence port for the workflow engine.
//!
//! The engine, executor, and scheduler only ever talk to this trait;
//! flowkit-infra provides the SQLite adapter. Native async-fn-in-trait
//! (RPITIT) with an explicit `Send` bound so implementations stay usable
//! across spawned tasks.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use flowkit_types::error::RepositoryError;
use flowkit_types::workflow::{Workflow, WorkflowExecution, WorkflowStepLog};

pub trait WorkflowRepository: Send + Sync {
    /// Persist a workflow and its steps (insert or full update).
    fn save_workflow(
        &self,
        workflow: &Workflow,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Fetch a workflow with its steps. `None` when unknown.
    fn get_workflow(
        &self,
        id: Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Workflow>, RepositoryError>> + Send;

    /// All active workflows with a schedule trigger, steps included.
    fn list_scheduled_workflows(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Workflow>, RepositoryError>> + Send;

    /// Bump `executions_count` and set `last_executed_at` after a completed
    /// run. Best-effort statistics, not transactional with the execution.
    fn record_workflow_executed(
        &self,
        workflow_id: Uuid,
        executed_at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn create_execution(
        &self,
        execution: &WorkflowExecution,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get_execution(
        &self,
        id: Uuid,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowExecution>, RepositoryError>> + Send;

    /// Overwrite an execution's mutable fields (status, context, counters,
    /// error, timestamps).
    fn update_execution(
        &self,
        execution: &WorkflowExecution,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn create_step_log(
        &self,
        log: &WorkflowStepLog,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn update_step_log(
        &self,
        log: &WorkflowStepLog,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// The log for one step within one execution, if any.
    fn get_step_log(
        &self,
        execution_id: Uuid,
        step_id: Uuid,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowStepLog>, RepositoryError>> + Send;

    /// All step logs of an execution, ascending by position.
    fn list_step_logs(
        &self,
        execution_id: Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowStepLog>, RepositoryError>> + Send;

    /// Reset every failed step log of an execution back to pending for a
    /// resume: clears error fields and timestamps, keeps `retry_count`.
    /// Returns how many logs were reset.
    fn reset_failed_step_logs(
        &self,
        execution_id: Uuid,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;
}

//! Step executor: drives one execution through its steps.
//!
//! The executor owns the per-run state machine. Steps run strictly
//! sequentially in position order; every attempt is recorded as a step log
//! before and after the handler runs, so a crash mid-run leaves enough
//! state for an idempotent resume (completed steps are skipped, everything
//! else re-runs). Cancellation is cooperative: the execution row is
//! reloaded at each step boundary and a `cancelled` status stops the run
//! before the next handler starts.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use flowkit_types::error::RepositoryError;
use flowkit_types::workflow::{
    ExecutionStatus, StepLogStatus, Workflow, WorkflowExecution, WorkflowStep, WorkflowStepLog,
};

use crate::condition;
use crate::registry::{StepExecutionError, StepInvocation, StepRegistry, StepServices};
use crate::repository::WorkflowRepository;
use crate::sanitize::sanitize_output;

/// Lines of backtrace kept on a failed step log.
const MAX_BACKTRACE_LINES: usize = 10;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Orchestration failures. Step-level failures never surface here; they are
/// recorded on the step log and reflected in the execution status instead.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("execution not found: {0}")]
    ExecutionNotFound(Uuid),

    #[error("workflow not found: {0}")]
    WorkflowNotFound(Uuid),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl ExecutorError {
    /// True when retrying the run can never succeed and the dispatch layer
    /// should drop the task instead.
    pub fn is_discardable(&self) -> bool {
        matches!(self, ExecutorError::ExecutionNotFound(_))
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub struct StepExecutor<R> {
    repo: Arc<R>,
    registry: Arc<StepRegistry>,
    services: StepServices,
}

impl<R: WorkflowRepository> StepExecutor<R> {
    pub fn new(repo: Arc<R>, registry: Arc<StepRegistry>, services: StepServices) -> Self {
        Self {
            repo,
            registry,
            services,
        }
    }

    /// Run an execution to a terminal status and return its final state.
    ///
    /// An execution that is already terminal is returned unchanged, which
    /// makes redelivered queue tasks harmless.
    pub async fn run(&self, execution_id: Uuid) -> Result<WorkflowExecution, ExecutorError> {
        let mut execution = self
            .repo
            .get_execution(execution_id)
            .await?
            .ok_or(ExecutorError::ExecutionNotFound(execution_id))?;

        if execution.status.is_terminal() {
            tracing::debug!(
                execution_id = %execution_id,
                status = execution.status.as_str(),
                "execution already terminal, nothing to run"
            );
            return Ok(execution);
        }

        let workflow = self
            .repo
            .get_workflow(execution.workflow_id)
            .await?
            .ok_or(ExecutorError::WorkflowNotFound(execution.workflow_id))?;

        match self.drive(&mut execution, &workflow).await {
            Ok(()) => Ok(execution),
            Err(err) => {
                // Orchestration failure: mark the execution failed so it is
                // not stuck in `running`, then let the retry layer decide.
                tracing::error!(
                    execution_id = %execution_id,
                    error = %err,
                    "execution aborted by orchestration error"
                );
                execution.status = ExecutionStatus::Failed;
                execution.error_message = Some(err.to_string());
                finish_timestamps(&mut execution);
                if let Err(update_err) = self.repo.update_execution(&execution).await {
                    tracing::error!(
                        execution_id = %execution_id,
                        error = %update_err,
                        "failed to persist aborted execution"
                    );
                }
                Err(err)
            }
        }
    }

    async fn drive(
        &self,
        execution: &mut WorkflowExecution,
        workflow: &Workflow,
    ) -> Result<(), ExecutorError> {
        execution.status = ExecutionStatus::Running;
        if execution.started_at.is_none() {
            execution.started_at = Some(Utc::now());
        }
        self.repo.update_execution(execution).await?;
        tracing::info!(
            execution_id = %execution.id,
            workflow_id = %workflow.id,
            "execution started"
        );

        for step in workflow.enabled_steps() {
            // Cancellation is observed at step boundaries only.
            let current = self
                .repo
                .get_execution(execution.id)
                .await?
                .ok_or(ExecutorError::ExecutionNotFound(execution.id))?;
            if current.status == ExecutionStatus::Cancelled {
                tracing::info!(execution_id = %execution.id, "execution cancelled, stopping");
                execution.status = ExecutionStatus::Cancelled;
                finish_timestamps(execution);
                self.repo.update_execution(execution).await?;
                return Ok(());
            }

            // Idempotent resume: completed steps are never re-run.
            let existing = self.repo.get_step_log(execution.id, step.id).await?;
            if let Some(log) = &existing {
                if log.status == StepLogStatus::Completed {
                    tracing::debug!(
                        execution_id = %execution.id,
                        position = step.position,
                        "step already completed, skipping"
                    );
                    continue;
                }
            }

            let mut log = match existing {
                Some(log) => log,
                None => {
                    let log =
                        WorkflowStepLog::pending(execution.id, step, input_snapshot(step, execution));
                    self.repo.create_step_log(&log).await?;
                    log
                }
            };

            let step_started = Utc::now();
            log.status = StepLogStatus::Running;
            log.started_at = Some(step_started);
            self.repo.update_step_log(&log).await?;

            if !condition::evaluate(step.conditions.as_ref(), &execution.context) {
                tracing::debug!(
                    execution_id = %execution.id,
                    position = step.position,
                    "step conditions not met, skipping"
                );
                log.status = StepLogStatus::Skipped;
                close_log(&mut log, step_started);
                self.repo.update_step_log(&log).await?;
                continue;
            }

            let outcome = match self.registry.resolve(&step.step_type) {
                Some(handler) => {
                    let invocation = StepInvocation {
                        execution: &*execution,
                        step,
                        context: &execution.context,
                        services: &self.services,
                    };
                    handler.execute(&invocation).await
                }
                None => Err(StepExecutionError::UnknownStepType(step.step_type.clone())),
            };

            match outcome {
                Ok(result) => {
                    if !result.success {
                        tracing::warn!(
                            execution_id = %execution.id,
                            position = step.position,
                            "step reported an unsuccessful result"
                        );
                    }
                    for (key, value) in result.context_updates {
                        execution.context.insert(key, value);
                    }
                    log.status = StepLogStatus::Completed;
                    log.output_data = Some(sanitize_output(result.output));
                    close_log(&mut log, step_started);
                    self.repo.update_step_log(&log).await?;

                    execution.completed_steps_count += 1;
                    execution.current_step_position = Some(step.position);
                    self.repo.update_execution(execution).await?;
                }
                Err(err) => {
                    tracing::warn!(
                        execution_id = %execution.id,
                        position = step.position,
                        error = %err,
                        "step failed"
                    );
                    log.status = StepLogStatus::Failed;
                    log.error_message = Some(err.to_string());
                    log.error_backtrace = Some(capture_backtrace());
                    log.retry_count += 1;
                    close_log(&mut log, step_started);
                    self.repo.update_step_log(&log).await?;

                    execution.failed_steps_count += 1;
                    execution.error_message =
                        Some(format!("step at position {} failed: {err}", step.position));

                    if step.continue_on_failure {
                        self.repo.update_execution(execution).await?;
                        continue;
                    }
                    execution.status = ExecutionStatus::Failed;
                    finish_timestamps(execution);
                    self.repo.update_execution(execution).await?;
                    return Ok(());
                }
            }
        }

        execution.status = ExecutionStatus::Completed;
        finish_timestamps(execution);
        self.repo.update_execution(execution).await?;
        self.repo
            .record_workflow_executed(workflow.id, Utc::now())
            .await?;
        tracing::info!(
            execution_id = %execution.id,
            completed_steps = execution.completed_steps_count,
            failed_steps = execution.failed_steps_count,
            "execution completed"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Config plus the context keys visible when the step started. Values are
/// deliberately left out of the snapshot; the context can carry large step
/// outputs.
fn input_snapshot(step: &WorkflowStep, execution: &WorkflowExecution) -> Value {
    json!({
        "config": Value::Object(step.config.clone()),
        "context_keys": execution.context.keys().collect::<Vec<_>>(),
    })
}

fn close_log(log: &mut WorkflowStepLog, started: DateTime<Utc>) {
    let now = Utc::now();
    log.completed_at = Some(now);
    log.duration_ms = Some((now - started).num_milliseconds().max(0) as u64);
}

fn finish_timestamps(execution: &mut WorkflowExecution) {
    let now = Utc::now();
    execution.completed_at = Some(now);
    if let Some(started) = execution.started_at {
        execution.duration_ms = Some((now - started).num_milliseconds().max(0) as u64);
    }
}

fn capture_backtrace() -> String {
    let backtrace = std::backtrace::Backtrace::force_capture().to_string();
    backtrace
        .lines()
        .take(MAX_BACKTRACE_LINES)
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StepResult;
    use crate::testing::{
        failing_handler, recording_handler, step, workflow, MemoryRepository, SwitchHandler,
    };
    use flowkit_types::condition::ConditionSpec;
    use flowkit_types::workflow::TriggerType;
    use serde_json::Map;
    use std::sync::atomic::Ordering;

    async fn seed(
        repo: &MemoryRepository,
        workflow: &Workflow,
    ) -> WorkflowExecution {
        repo.save_workflow(workflow).await.unwrap();
        let execution = WorkflowExecution::new(workflow, TriggerType::Manual, Value::Null);
        repo.create_execution(&execution).await.unwrap();
        execution
    }

    fn executor(repo: Arc<MemoryRepository>, registry: StepRegistry) -> StepExecutor<MemoryRepository> {
        StepExecutor::new(repo, Arc::new(registry), StepServices::default())
    }

    #[tokio::test]
    async fn test_all_steps_complete_in_order() {
        let repo = Arc::new(MemoryRepository::new());
        let mut registry = StepRegistry::new();
        let (handler_a, calls_a) = recording_handler(StepResult::ok(json!({"step": "a"})));
        let (handler_b, calls_b) = recording_handler(StepResult::ok(json!({"step": "b"})));
        registry.register("a", move || Box::new(handler_a.clone()));
        registry.register("b", move || Box::new(handler_b.clone()));

        let wf = workflow(vec![step("a", 1), step("b", 2)]);
        let execution = seed(&repo, &wf).await;

        let result = executor(Arc::clone(&repo), registry)
            .run(execution.id)
            .await
            .unwrap();

        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.completed_steps_count, 2);
        assert_eq!(result.failed_steps_count, 0);
        assert_eq!(result.current_step_position, Some(2));
        assert!(result.duration_ms.is_some());
        assert_eq!(calls_a.load(Ordering::SeqCst), 1);
        assert_eq!(calls_b.load(Ordering::SeqCst), 1);

        let logs = repo.list_step_logs(execution.id).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().all(|l| l.status == StepLogStatus::Completed));
        assert_eq!(logs[0].position, 1);
        assert_eq!(logs[1].position, 2);

        // Completed run bumps the workflow statistics.
        let stored = repo.get_workflow(wf.id).await.unwrap().unwrap();
        assert_eq!(stored.executions_count, 1);
        assert!(stored.last_executed_at.is_some());
    }

    #[tokio::test]
    async fn test_failure_halts_unless_continue_on_failure() {
        let repo = Arc::new(MemoryRepository::new());
        let mut registry = StepRegistry::new();
        let (ok_handler, ok_calls) = recording_handler(StepResult::ok(Value::Null));
        registry.register("boom", || Box::new(failing_handler("disk full")));
        registry.register("ok", move || Box::new(ok_handler.clone()));

        let wf = workflow(vec![step("boom", 1), step("ok", 2)]);
        let execution = seed(&repo, &wf).await;

        let result = executor(Arc::clone(&repo), registry)
            .run(execution.id)
            .await
            .unwrap();

        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.failed_steps_count, 1);
        assert_eq!(result.completed_steps_count, 0);
        assert!(result.error_message.as_deref().unwrap().contains("disk full"));
        // The second step never ran.
        assert_eq!(ok_calls.load(Ordering::SeqCst), 0);

        let logs = repo.list_step_logs(execution.id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, StepLogStatus::Failed);
        assert_eq!(logs[0].retry_count, 1);
        assert!(logs[0].error_backtrace.is_some());
    }

    #[tokio::test]
    async fn test_continue_on_failure_completes_execution() {
        let repo = Arc::new(MemoryRepository::new());
        let mut registry = StepRegistry::new();
        let (ok_handler, ok_calls) = recording_handler(StepResult::ok(Value::Null));
        registry.register("boom", || Box::new(failing_handler("transient")));
        registry.register("ok", move || Box::new(ok_handler.clone()));

        let mut failing = step("boom", 1);
        failing.continue_on_failure = true;
        let wf = workflow(vec![failing, step("ok", 2)]);
        let execution = seed(&repo, &wf).await;

        let result = executor(Arc::clone(&repo), registry)
            .run(execution.id)
            .await
            .unwrap();

        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.failed_steps_count, 1);
        assert_eq!(result.completed_steps_count, 1);
        assert_eq!(ok_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_step_type_fails_the_step() {
        let repo = Arc::new(MemoryRepository::new());
        let registry = StepRegistry::new();

        let wf = workflow(vec![step("no_such_type", 1)]);
        let execution = seed(&repo, &wf).await;

        let result = executor(Arc::clone(&repo), registry)
            .run(execution.id)
            .await
            .unwrap();

        assert_eq!(result.status, ExecutionStatus::Failed);
        let logs = repo.list_step_logs(execution.id).await.unwrap();
        assert!(logs[0]
            .error_message
            .as_deref()
            .unwrap()
            .contains("unknown step type"));
    }

    #[tokio::test]
    async fn test_conditions_skip_step_without_failing() {
        let repo = Arc::new(MemoryRepository::new());
        let mut registry = StepRegistry::new();
        let (handler, calls) = recording_handler(StepResult::ok(Value::Null));
        registry.register("guarded", move || Box::new(handler.clone()));

        let mut guarded = step("guarded", 1);
        guarded.conditions = Some(ConditionSpec::Rule {
            field: "missing_key".to_string(),
            operator: "is_not_empty".to_string(),
            value: Value::Null,
        });
        let wf = workflow(vec![guarded]);
        let execution = seed(&repo, &wf).await;

        let result = executor(Arc::clone(&repo), registry)
            .run(execution.id)
            .await
            .unwrap();

        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.completed_steps_count, 0);
        assert_eq!(result.failed_steps_count, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let logs = repo.list_step_logs(execution.id).await.unwrap();
        assert_eq!(logs[0].status, StepLogStatus::Skipped);
    }

    #[tokio::test]
    async fn test_context_updates_flow_to_later_steps() {
        let repo = Arc::new(MemoryRepository::new());
        let mut registry = StepRegistry::new();
        let mut updates = Map::new();
        updates.insert("document_id".to_string(), json!(42));
        let (producer, _) =
            recording_handler(StepResult::ok(Value::Null).with_context_updates(updates));
        registry.register("produce", move || Box::new(producer.clone()));
        let (consumer, consumer_calls) = recording_handler(StepResult::ok(Value::Null));
        registry.register("consume", move || Box::new(consumer.clone()));

        let mut gated = step("consume", 2);
        gated.conditions = Some(ConditionSpec::Rule {
            field: "document_id".to_string(),
            operator: "equals".to_string(),
            value: json!(42),
        });
        let wf = workflow(vec![step("produce", 1), gated]);
        let execution = seed(&repo, &wf).await;

        let result = executor(Arc::clone(&repo), registry)
            .run(execution.id)
            .await
            .unwrap();

        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.completed_steps_count, 2);
        assert_eq!(result.context.get("document_id"), Some(&json!(42)));
        assert_eq!(consumer_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resume_skips_completed_steps() {
        let repo = Arc::new(MemoryRepository::new());

        let switch = SwitchHandler::new(true);
        let flag = switch.fail_flag();
        let switch_calls = switch.calls();
        let (first, first_calls) = recording_handler(StepResult::ok(Value::Null));

        let mut registry = StepRegistry::new();
        registry.register("first", move || Box::new(first.clone()));
        registry.register("flaky", move || Box::new(switch.clone()));

        let wf = workflow(vec![step("first", 1), step("flaky", 2)]);
        let execution = seed(&repo, &wf).await;

        let exec = executor(Arc::clone(&repo), registry);
        let failed = exec.run(execution.id).await.unwrap();
        assert_eq!(failed.status, ExecutionStatus::Failed);
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);

        // Reset the failed log the way resume does, then run again.
        let reset = repo.reset_failed_step_logs(execution.id).await.unwrap();
        assert_eq!(reset, 1);
        let mut resumed = repo.get_execution(execution.id).await.unwrap().unwrap();
        resumed.status = ExecutionStatus::Running;
        resumed.error_message = None;
        resumed.completed_at = None;
        resumed.duration_ms = None;
        repo.update_execution(&resumed).await.unwrap();
        flag.store(false, Ordering::SeqCst);

        let finished = exec.run(execution.id).await.unwrap();
        assert_eq!(finished.status, ExecutionStatus::Completed);
        // Step one ran exactly once across both runs; the flaky step ran twice.
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(switch_calls.load(Ordering::SeqCst), 2);

        let logs = repo.list_step_logs(execution.id).await.unwrap();
        assert!(logs.iter().all(|l| l.status == StepLogStatus::Completed));
        // Failure count survives the reset as an informational counter.
        assert_eq!(logs[1].retry_count, 1);
    }

    #[tokio::test]
    async fn test_cancellation_observed_at_step_boundary() {
        let repo = Arc::new(MemoryRepository::new());
        let mut registry = StepRegistry::new();

        // The first step cancels the execution out-of-band; the boundary
        // check before step two must stop the run.
        let cancel_repo = Arc::clone(&repo);
        struct CancellingHandler {
            repo: Arc<MemoryRepository>,
        }
        #[async_trait::async_trait]
        impl crate::registry::StepHandler for CancellingHandler {
            async fn execute(
                &self,
                invocation: &StepInvocation<'_>,
            ) -> Result<StepResult, StepExecutionError> {
                let mut current = self
                    .repo
                    .get_execution(invocation.execution.id)
                    .await
                    .map_err(|e| StepExecutionError::Failed(e.to_string()))?
                    .ok_or_else(|| StepExecutionError::Failed("gone".to_string()))?;
                current.status = ExecutionStatus::Cancelled;
                self.repo
                    .update_execution(&current)
                    .await
                    .map_err(|e| StepExecutionError::Failed(e.to_string()))?;
                Ok(StepResult::ok(Value::Null))
            }
        }
        registry.register("cancel_self", move || {
            Box::new(CancellingHandler {
                repo: Arc::clone(&cancel_repo),
            })
        });
        let (never, never_calls) = recording_handler(StepResult::ok(Value::Null));
        registry.register("never", move || Box::new(never.clone()));

        let wf = workflow(vec![step("cancel_self", 1), step("never", 2)]);
        let execution = seed(&repo, &wf).await;

        let result = executor(Arc::clone(&repo), registry)
            .run(execution.id)
            .await
            .unwrap();

        assert_eq!(result.status, ExecutionStatus::Cancelled);
        assert!(result.completed_at.is_some());
        assert_eq!(never_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_oversized_output_is_capped_in_log() {
        let repo = Arc::new(MemoryRepository::new());
        let mut registry = StepRegistry::new();
        let (big, _) = recording_handler(StepResult::ok(json!({
            "text": "z".repeat(50_000),
            "items": (0..1000).collect::<Vec<u32>>(),
        })));
        registry.register("big", move || Box::new(big.clone()));

        let wf = workflow(vec![step("big", 1)]);
        let execution = seed(&repo, &wf).await;

        executor(Arc::clone(&repo), registry)
            .run(execution.id)
            .await
            .unwrap();

        let logs = repo.list_step_logs(execution.id).await.unwrap();
        let output = logs[0].output_data.as_ref().unwrap();
        assert_eq!(output["text"].as_str().unwrap().chars().count(), 10_000);
        assert_eq!(output["items"].as_array().unwrap().len(), 100);
    }

    #[tokio::test]
    async fn test_missing_execution_is_discardable() {
        let repo = Arc::new(MemoryRepository::new());
        let err = executor(repo, StepRegistry::new())
            .run(Uuid::now_v7())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::ExecutionNotFound(_)));
        assert!(err.is_discardable());
    }

    #[tokio::test]
    async fn test_disabled_steps_are_not_run() {
        let repo = Arc::new(MemoryRepository::new());
        let mut registry = StepRegistry::new();
        let (handler, calls) = recording_handler(StepResult::ok(Value::Null));
        registry.register("off", move || Box::new(handler.clone()));

        let mut disabled = step("off", 1);
        disabled.enabled = false;
        let wf = workflow(vec![disabled]);
        let execution = seed(&repo, &wf).await;

        let result = executor(Arc::clone(&repo), registry)
            .run(execution.id)
            .await
            .unwrap();

        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(repo.list_step_logs(execution.id).await.unwrap().is_empty());
    }
}

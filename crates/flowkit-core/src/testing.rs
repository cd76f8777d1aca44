//! Shared test doubles: an in-memory repository, stub step handlers, and a
//! recording dispatcher.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use flowkit_types::error::RepositoryError;
use flowkit_types::workflow::{
    StepLogStatus, TriggerType, Workflow, WorkflowExecution, WorkflowStatus, WorkflowStep,
    WorkflowStepLog,
};

use crate::dispatch::{DispatchError, Dispatcher};
use crate::registry::{StepExecutionError, StepHandler, StepInvocation, StepResult};
use crate::repository::WorkflowRepository;

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn step(step_type: &str, position: u32) -> WorkflowStep {
    WorkflowStep {
        id: Uuid::now_v7(),
        workflow_id: Uuid::nil(),
        step_type: step_type.to_string(),
        position,
        config: Map::new(),
        conditions: None,
        enabled: true,
        continue_on_failure: false,
    }
}

pub fn workflow(mut steps: Vec<WorkflowStep>) -> Workflow {
    let id = Uuid::now_v7();
    for step in &mut steps {
        step.workflow_id = id;
    }
    Workflow {
        id,
        tenant_id: Uuid::now_v7(),
        name: "test-workflow".to_string(),
        trigger_type: TriggerType::Manual,
        trigger_config: Value::Null,
        status: WorkflowStatus::Active,
        steps,
        executions_count: 0,
        last_executed_at: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

// ---------------------------------------------------------------------------
// Step handler doubles
// ---------------------------------------------------------------------------

/// Returns a fixed result and counts invocations.
#[derive(Clone)]
pub struct RecordingHandler {
    result: StepResult,
    calls: Arc<AtomicU32>,
}

pub fn recording_handler(result: StepResult) -> (RecordingHandler, Arc<AtomicU32>) {
    let calls = Arc::new(AtomicU32::new(0));
    (
        RecordingHandler {
            result,
            calls: Arc::clone(&calls),
        },
        calls,
    )
}

#[async_trait]
impl StepHandler for RecordingHandler {
    async fn execute(
        &self,
        _invocation: &StepInvocation<'_>,
    ) -> Result<StepResult, StepExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.result.clone())
    }
}

/// Always fails with the given message.
pub struct FailingHandler {
    message: String,
}

pub fn failing_handler(message: &str) -> FailingHandler {
    FailingHandler {
        message: message.to_string(),
    }
}

#[async_trait]
impl StepHandler for FailingHandler {
    async fn execute(
        &self,
        _invocation: &StepInvocation<'_>,
    ) -> Result<StepResult, StepExecutionError> {
        Err(StepExecutionError::Failed(self.message.clone()))
    }
}

/// Fails while its flag is set; used to exercise failure-then-resume paths.
#[derive(Clone)]
pub struct SwitchHandler {
    fail: Arc<AtomicBool>,
    calls: Arc<AtomicU32>,
}

impl SwitchHandler {
    pub fn new(fail_initially: bool) -> Self {
        Self {
            fail: Arc::new(AtomicBool::new(fail_initially)),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn fail_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.fail)
    }

    pub fn calls(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl StepHandler for SwitchHandler {
    async fn execute(
        &self,
        _invocation: &StepInvocation<'_>,
    ) -> Result<StepResult, StepExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            Err(StepExecutionError::Failed("switch is failing".to_string()))
        } else {
            Ok(StepResult::ok(Value::Null))
        }
    }
}

// ---------------------------------------------------------------------------
// Recording dispatcher
// ---------------------------------------------------------------------------

/// Records enqueued execution ids without running anything.
#[derive(Default)]
pub struct RecordingDispatcher {
    enqueued: Mutex<Vec<Uuid>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueued(&self) -> Vec<Uuid> {
        self.enqueued.lock().unwrap().clone()
    }
}

impl Dispatcher for RecordingDispatcher {
    async fn enqueue(&self, execution_id: Uuid) -> Result<(), DispatchError> {
        self.enqueued.lock().unwrap().push(execution_id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory repository
// ---------------------------------------------------------------------------

/// HashMap-backed repository. Locks are never held across awaits.
#[derive(Default)]
pub struct MemoryRepository {
    workflows: Mutex<HashMap<Uuid, Workflow>>,
    executions: Mutex<HashMap<Uuid, WorkflowExecution>>,
    step_logs: Mutex<HashMap<Uuid, WorkflowStepLog>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WorkflowRepository for MemoryRepository {
    async fn save_workflow(&self, workflow: &Workflow) -> Result<(), RepositoryError> {
        self.workflows
            .lock()
            .unwrap()
            .insert(workflow.id, workflow.clone());
        Ok(())
    }

    async fn get_workflow(&self, id: Uuid) -> Result<Option<Workflow>, RepositoryError> {
        Ok(self.workflows.lock().unwrap().get(&id).cloned())
    }

    async fn list_scheduled_workflows(&self) -> Result<Vec<Workflow>, RepositoryError> {
        let mut workflows: Vec<Workflow> = self
            .workflows
            .lock()
            .unwrap()
            .values()
            .filter(|w| {
                w.trigger_type == TriggerType::Schedule && w.status == WorkflowStatus::Active
            })
            .cloned()
            .collect();
        workflows.sort_by_key(|w| w.id);
        Ok(workflows)
    }

    async fn record_workflow_executed(
        &self,
        workflow_id: Uuid,
        executed_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut workflows = self.workflows.lock().unwrap();
        let workflow = workflows
            .get_mut(&workflow_id)
            .ok_or(RepositoryError::NotFound)?;
        workflow.executions_count += 1;
        workflow.last_executed_at = Some(executed_at);
        Ok(())
    }

    async fn create_execution(
        &self,
        execution: &WorkflowExecution,
    ) -> Result<(), RepositoryError> {
        let mut executions = self.executions.lock().unwrap();
        if executions.contains_key(&execution.id) {
            return Err(RepositoryError::Conflict(format!(
                "execution {} already exists",
                execution.id
            )));
        }
        executions.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn get_execution(
        &self,
        id: Uuid,
    ) -> Result<Option<WorkflowExecution>, RepositoryError> {
        Ok(self.executions.lock().unwrap().get(&id).cloned())
    }

    async fn update_execution(
        &self,
        execution: &WorkflowExecution,
    ) -> Result<(), RepositoryError> {
        let mut executions = self.executions.lock().unwrap();
        if !executions.contains_key(&execution.id) {
            return Err(RepositoryError::NotFound);
        }
        executions.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn create_step_log(&self, log: &WorkflowStepLog) -> Result<(), RepositoryError> {
        self.step_logs.lock().unwrap().insert(log.id, log.clone());
        Ok(())
    }

    async fn update_step_log(&self, log: &WorkflowStepLog) -> Result<(), RepositoryError> {
        let mut logs = self.step_logs.lock().unwrap();
        if !logs.contains_key(&log.id) {
            return Err(RepositoryError::NotFound);
        }
        logs.insert(log.id, log.clone());
        Ok(())
    }

    async fn get_step_log(
        &self,
        execution_id: Uuid,
        step_id: Uuid,
    ) -> Result<Option<WorkflowStepLog>, RepositoryError> {
        Ok(self
            .step_logs
            .lock()
            .unwrap()
            .values()
            .find(|l| l.execution_id == execution_id && l.step_id == step_id)
            .cloned())
    }

    async fn list_step_logs(
        &self,
        execution_id: Uuid,
    ) -> Result<Vec<WorkflowStepLog>, RepositoryError> {
        let mut logs: Vec<WorkflowStepLog> = self
            .step_logs
            .lock()
            .unwrap()
            .values()
            .filter(|l| l.execution_id == execution_id)
            .cloned()
            .collect();
        logs.sort_by_key(|l| l.position);
        Ok(logs)
    }

    async fn reset_failed_step_logs(&self, execution_id: Uuid) -> Result<u64, RepositoryError> {
        let mut logs = self.step_logs.lock().unwrap();
        let mut reset = 0u64;
        for log in logs.values_mut() {
            if log.execution_id == execution_id && log.status == StepLogStatus::Failed {
                log.status = StepLogStatus::Pending;
                log.error_message = None;
                log.error_backtrace = None;
                log.started_at = None;
                log.completed_at = None;
                log.duration_ms = None;
                reset += 1;
            }
        }
        Ok(reset)
    }
}

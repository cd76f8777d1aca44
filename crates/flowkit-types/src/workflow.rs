//! Workflow domain types for Flowkit.
//!
//! A `Workflow` is a tenant-defined automation: a trigger plus an ordered
//! sequence of configurable, conditionally-guarded steps. Each run of a
//! workflow is a `WorkflowExecution`, and every step attempt within a run is
//! recorded as a `WorkflowStepLog`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::condition::ConditionSpec;

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

/// How a workflow is triggered. Doubles as the trigger source recorded on an
/// execution (manual UI action, the cron scheduler, or an external event).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Manual,
    Schedule,
    Event,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::Manual => "manual",
            TriggerType::Schedule => "schedule",
            TriggerType::Event => "event",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(TriggerType::Manual),
            "schedule" => Some(TriggerType::Schedule),
            "event" => Some(TriggerType::Event),
            _ => None,
        }
    }
}

/// Lifecycle status of a workflow definition. Only `Active` workflows are
/// executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Draft,
    Active,
    Paused,
    Archived,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Draft => "draft",
            WorkflowStatus::Active => "active",
            WorkflowStatus::Paused => "paused",
            WorkflowStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(WorkflowStatus::Draft),
            "active" => Some(WorkflowStatus::Active),
            "paused" => Some(WorkflowStatus::Paused),
            "archived" => Some(WorkflowStatus::Archived),
            _ => None,
        }
    }
}

/// Overall status of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    /// Terminal statuses never change again, except `Failed` through an
    /// explicit resume.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ExecutionStatus::Pending),
            "running" => Some(ExecutionStatus::Running),
            "completed" => Some(ExecutionStatus::Completed),
            "failed" => Some(ExecutionStatus::Failed),
            "cancelled" => Some(ExecutionStatus::Cancelled),
            _ => None,
        }
    }
}

/// Status of an individual step attempt within an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepLogStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StepLogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepLogStatus::Pending => "pending",
            StepLogStatus::Running => "running",
            StepLogStatus::Completed => "completed",
            StepLogStatus::Failed => "failed",
            StepLogStatus::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(StepLogStatus::Pending),
            "running" => Some(StepLogStatus::Running),
            "completed" => Some(StepLogStatus::Completed),
            "failed" => Some(StepLogStatus::Failed),
            "skipped" => Some(StepLogStatus::Skipped),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Workflow & steps
// ---------------------------------------------------------------------------

/// Trigger configuration for schedule-triggered workflows.
///
/// `timezone` is a fixed UTC offset string such as `"+02:00"`; absent or
/// `"UTC"` means UTC.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleConfig {
    /// Standard 5-field cron expression (a 6-field form with seconds is
    /// accepted as-is).
    pub cron: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl ScheduleConfig {
    /// Parse a schedule config out of a workflow's opaque `trigger_config`.
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value.clone())
    }
}

/// A tenant-defined automated process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// UUIDv7 assigned on creation.
    pub id: Uuid,
    /// Owning tenant.
    pub tenant_id: Uuid,
    pub name: String,
    pub trigger_type: TriggerType,
    /// Trigger-specific configuration; for `schedule` this carries a
    /// `ScheduleConfig`.
    #[serde(default)]
    pub trigger_config: Value,
    pub status: WorkflowStatus,
    /// Steps ordered by `position`.
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
    /// Total completed executions (best-effort statistic).
    pub executions_count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_executed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// Enabled steps in ascending `position` order -- the execution order.
    pub fn enabled_steps(&self) -> Vec<&WorkflowStep> {
        let mut steps: Vec<&WorkflowStep> = self.steps.iter().filter(|s| s.enabled).collect();
        steps.sort_by_key(|s| s.position);
        steps
    }

    /// A workflow is executable when it is active and has at least one
    /// enabled step.
    pub fn is_executable(&self) -> bool {
        self.status == WorkflowStatus::Active && self.steps.iter().any(|s| s.enabled)
    }
}

/// One ordered, configured unit of work inside a workflow.
///
/// Immutable for the duration of an execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: Uuid,
    pub workflow_id: Uuid,
    /// Registry key resolving to a step handler.
    pub step_type: String,
    /// Unique within a workflow; defines execution order.
    pub position: u32,
    /// Opaque configuration consumed by the handler.
    #[serde(default)]
    pub config: Map<String, Value>,
    /// Optional guard; absent means the step always runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<ConditionSpec>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// When true, a failure of this step does not halt the execution.
    #[serde(default)]
    pub continue_on_failure: bool,
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Execution & step logs
// ---------------------------------------------------------------------------

/// One run instance of a workflow, started by a trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    /// UUIDv7 execution ID.
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub status: ExecutionStatus,
    pub trigger_source: TriggerType,
    /// JSON payload from the trigger (webhook body, cron metadata, ...).
    #[serde(default)]
    pub trigger_data: Value,
    /// Accumulating key-value state shared across steps. Keys are only ever
    /// added or overridden, never removed.
    #[serde(default)]
    pub context: Map<String, Value>,
    /// Position of the most recently completed step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step_position: Option<u32>,
    pub completed_steps_count: u32,
    pub failed_steps_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl WorkflowExecution {
    /// Create a pending execution for a workflow, seeding the context with
    /// the standard keys every step can rely on.
    pub fn new(workflow: &Workflow, trigger_source: TriggerType, trigger_data: Value) -> Self {
        let now = Utc::now();
        let mut context = Map::new();
        context.insert("tenant_id".to_string(), Value::String(workflow.tenant_id.to_string()));
        context.insert("workflow_id".to_string(), Value::String(workflow.id.to_string()));
        context.insert("workflow_name".to_string(), Value::String(workflow.name.clone()));
        context.insert("started_at".to_string(), Value::String(now.to_rfc3339()));
        context.insert("trigger_data".to_string(), trigger_data.clone());

        Self {
            id: Uuid::now_v7(),
            workflow_id: workflow.id,
            status: ExecutionStatus::Pending,
            trigger_source,
            trigger_data,
            context,
            current_step_position: None,
            completed_steps_count: 0,
            failed_steps_count: 0,
            error_message: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            duration_ms: None,
        }
    }
}

/// Durable record of one step's attempt within one execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStepLog {
    /// UUIDv7 log ID.
    pub id: Uuid,
    pub execution_id: Uuid,
    pub step_id: Uuid,
    pub position: u32,
    pub status: StepLogStatus,
    /// Snapshot of the step config plus the context keys visible at start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_data: Option<Value>,
    /// Sanitized, size-capped handler output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Truncated backtrace captured at the failure site.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_backtrace: Option<String>,
    /// Informational failure counter; not an automatic-retry budget.
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl WorkflowStepLog {
    /// Create a pending log for a step within an execution.
    pub fn pending(execution_id: Uuid, step: &WorkflowStep, input_data: Value) -> Self {
        Self {
            id: Uuid::now_v7(),
            execution_id,
            step_id: step.id,
            position: step.position,
            status: StepLogStatus::Pending,
            input_data: Some(input_data),
            output_data: None,
            error_message: None,
            error_backtrace: None,
            retry_count: 0,
            started_at: None,
            completed_at: None,
            duration_ms: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! SQLite workflow repository implementation.
//!
//! Implements `WorkflowRepository` from `flowkit-core` using sqlx with
//! split read/write pools. UUIDs are TEXT, timestamps are RFC 3339
//! strings, and JSON columns (trigger config, step config, conditions,
//! context, step input/output) are serialized TEXT.

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use flowkit_core::repository::WorkflowRepository;
use flowkit_types::condition::ConditionSpec;
use flowkit_types::error::RepositoryError;
use flowkit_types::workflow::{
    ExecutionStatus, StepLogStatus, TriggerType, Workflow, WorkflowExecution, WorkflowStatus,
    WorkflowStep, WorkflowStepLog,
};

use super::pool::DatabasePool;

/// SQLite-backed implementation of `WorkflowRepository`.
pub struct SqliteWorkflowRepository {
    pool: DatabasePool,
}

impl SqliteWorkflowRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn load_steps(&self, workflow_id: Uuid) -> Result<Vec<WorkflowStep>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, workflow_id, step_type, position, config, conditions, enabled, continue_on_failure
             FROM workflow_steps WHERE workflow_id = ? ORDER BY position ASC",
        )
        .bind(workflow_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut steps = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = StepRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            steps.push(r.into_step()?);
        }
        Ok(steps)
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct WorkflowRow {
    id: String,
    tenant_id: String,
    name: String,
    trigger_type: String,
    trigger_config: String,
    status: String,
    executions_count: i64,
    last_executed_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl WorkflowRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            name: row.try_get("name")?,
            trigger_type: row.try_get("trigger_type")?,
            trigger_config: row.try_get("trigger_config")?,
            status: row.try_get("status")?,
            executions_count: row.try_get("executions_count")?,
            last_executed_at: row.try_get("last_executed_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_workflow(self, steps: Vec<WorkflowStep>) -> Result<Workflow, RepositoryError> {
        let trigger_type = TriggerType::parse(&self.trigger_type).ok_or_else(|| {
            RepositoryError::Query(format!("invalid trigger type: {}", self.trigger_type))
        })?;
        let status = WorkflowStatus::parse(&self.status).ok_or_else(|| {
            RepositoryError::Query(format!("invalid workflow status: {}", self.status))
        })?;
        let trigger_config = serde_json::from_str(&self.trigger_config)
            .map_err(|e| RepositoryError::Query(format!("invalid trigger config JSON: {e}")))?;

        Ok(Workflow {
            id: parse_uuid(&self.id)?,
            tenant_id: parse_uuid(&self.tenant_id)?,
            name: self.name,
            trigger_type,
            trigger_config,
            status,
            steps,
            executions_count: self.executions_count,
            last_executed_at: self
                .last_executed_at
                .as_deref()
                .map(parse_datetime)
                .transpose()?,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

struct StepRow {
    id: String,
    workflow_id: String,
    step_type: String,
    position: i64,
    config: String,
    conditions: Option<String>,
    enabled: bool,
    continue_on_failure: bool,
}

impl StepRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            workflow_id: row.try_get("workflow_id")?,
            step_type: row.try_get("step_type")?,
            position: row.try_get("position")?,
            config: row.try_get("config")?,
            conditions: row.try_get("conditions")?,
            enabled: row.try_get("enabled")?,
            continue_on_failure: row.try_get("continue_on_failure")?,
        })
    }

    fn into_step(self) -> Result<WorkflowStep, RepositoryError> {
        let config = serde_json::from_str(&self.config)
            .map_err(|e| RepositoryError::Query(format!("invalid step config JSON: {e}")))?;
        let conditions: Option<ConditionSpec> = self
            .conditions
            .as_deref()
            .map(|s| {
                serde_json::from_str(s)
                    .map_err(|e| RepositoryError::Query(format!("invalid step conditions: {e}")))
            })
            .transpose()?;

        Ok(WorkflowStep {
            id: parse_uuid(&self.id)?,
            workflow_id: parse_uuid(&self.workflow_id)?,
            step_type: self.step_type,
            position: self.position as u32,
            config,
            conditions,
            enabled: self.enabled,
            continue_on_failure: self.continue_on_failure,
        })
    }
}

struct ExecutionRow {
    id: String,
    workflow_id: String,
    status: String,
    trigger_source: String,
    trigger_data: String,
    context: String,
    current_step_position: Option<i64>,
    completed_steps_count: i64,
    failed_steps_count: i64,
    error_message: Option<String>,
    created_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
    duration_ms: Option<i64>,
}

impl ExecutionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            workflow_id: row.try_get("workflow_id")?,
            status: row.try_get("status")?,
            trigger_source: row.try_get("trigger_source")?,
            trigger_data: row.try_get("trigger_data")?,
            context: row.try_get("context")?,
            current_step_position: row.try_get("current_step_position")?,
            completed_steps_count: row.try_get("completed_steps_count")?,
            failed_steps_count: row.try_get("failed_steps_count")?,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            duration_ms: row.try_get("duration_ms")?,
        })
    }

    fn into_execution(self) -> Result<WorkflowExecution, RepositoryError> {
        let status = ExecutionStatus::parse(&self.status).ok_or_else(|| {
            RepositoryError::Query(format!("invalid execution status: {}", self.status))
        })?;
        let trigger_source = TriggerType::parse(&self.trigger_source).ok_or_else(|| {
            RepositoryError::Query(format!("invalid trigger source: {}", self.trigger_source))
        })?;
        let trigger_data = serde_json::from_str(&self.trigger_data)
            .map_err(|e| RepositoryError::Query(format!("invalid trigger data JSON: {e}")))?;
        let context = serde_json::from_str(&self.context)
            .map_err(|e| RepositoryError::Query(format!("invalid context JSON: {e}")))?;

        Ok(WorkflowExecution {
            id: parse_uuid(&self.id)?,
            workflow_id: parse_uuid(&self.workflow_id)?,
            status,
            trigger_source,
            trigger_data,
            context,
            current_step_position: self.current_step_position.map(|p| p as u32),
            completed_steps_count: self.completed_steps_count as u32,
            failed_steps_count: self.failed_steps_count as u32,
            error_message: self.error_message,
            created_at: parse_datetime(&self.created_at)?,
            started_at: self.started_at.as_deref().map(parse_datetime).transpose()?,
            completed_at: self
                .completed_at
                .as_deref()
                .map(parse_datetime)
                .transpose()?,
            duration_ms: self.duration_ms.map(|d| d as u64),
        })
    }
}

struct StepLogRow {
    id: String,
    execution_id: String,
    step_id: String,
    position: i64,
    status: String,
    input_data: Option<String>,
    output_data: Option<String>,
    error_message: Option<String>,
    error_backtrace: Option<String>,
    retry_count: i64,
    started_at: Option<String>,
    completed_at: Option<String>,
    duration_ms: Option<i64>,
}

impl StepLogRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            execution_id: row.try_get("execution_id")?,
            step_id: row.try_get("step_id")?,
            position: row.try_get("position")?,
            status: row.try_get("status")?,
            input_data: row.try_get("input_data")?,
            output_data: row.try_get("output_data")?,
            error_message: row.try_get("error_message")?,
            error_backtrace: row.try_get("error_backtrace")?,
            retry_count: row.try_get("retry_count")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            duration_ms: row.try_get("duration_ms")?,
        })
    }

    fn into_step_log(self) -> Result<WorkflowStepLog, RepositoryError> {
        let status = StepLogStatus::parse(&self.status).ok_or_else(|| {
            RepositoryError::Query(format!("invalid step log status: {}", self.status))
        })?;
        let input_data = self
            .input_data
            .as_deref()
            .map(|s| {
                serde_json::from_str(s)
                    .map_err(|e| RepositoryError::Query(format!("invalid step input: {e}")))
            })
            .transpose()?;
        let output_data = self
            .output_data
            .as_deref()
            .map(|s| {
                serde_json::from_str(s)
                    .map_err(|e| RepositoryError::Query(format!("invalid step output: {e}")))
            })
            .transpose()?;

        Ok(WorkflowStepLog {
            id: parse_uuid(&self.id)?,
            execution_id: parse_uuid(&self.execution_id)?,
            step_id: parse_uuid(&self.step_id)?,
            position: self.position as u32,
            status,
            input_data,
            output_data,
            error_message: self.error_message,
            error_backtrace: self.error_backtrace,
            retry_count: self.retry_count as u32,
            started_at: self.started_at.as_deref().map(parse_datetime).transpose()?,
            completed_at: self
                .completed_at
                .as_deref()
                .map(parse_datetime)
                .transpose()?,
            duration_ms: self.duration_ms.map(|d| d as u64),
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    s.parse::<Uuid>()
        .map_err(|e| RepositoryError::Query(format!("invalid UUID: {e}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn to_json_string<T: serde::Serialize>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|e| RepositoryError::Query(format!("serialize: {e}")))
}

// ---------------------------------------------------------------------------
// WorkflowRepository impl
// ---------------------------------------------------------------------------

impl WorkflowRepository for SqliteWorkflowRepository {
    async fn save_workflow(&self, workflow: &Workflow) -> Result<(), RepositoryError> {
        let trigger_config = to_json_string(&workflow.trigger_config)?;
        let mut tx = self
            .pool
            .writer
            .begin()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        sqlx::query(
            r#"INSERT INTO workflows
               (id, tenant_id, name, trigger_type, trigger_config, status,
                executions_count, last_executed_at, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 tenant_id = excluded.tenant_id,
                 name = excluded.name,
                 trigger_type = excluded.trigger_type,
                 trigger_config = excluded.trigger_config,
                 status = excluded.status,
                 executions_count = excluded.executions_count,
                 last_executed_at = excluded.last_executed_at,
                 updated_at = excluded.updated_at"#,
        )
        .bind(workflow.id.to_string())
        .bind(workflow.tenant_id.to_string())
        .bind(&workflow.name)
        .bind(workflow.trigger_type.as_str())
        .bind(&trigger_config)
        .bind(workflow.status.as_str())
        .bind(workflow.executions_count)
        .bind(workflow.last_executed_at.as_ref().map(format_datetime))
        .bind(format_datetime(&workflow.created_at))
        .bind(format_datetime(&workflow.updated_at))
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        // Steps are replaced wholesale; the definition is the source of truth.
        sqlx::query("DELETE FROM workflow_steps WHERE workflow_id = ?")
            .bind(workflow.id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        for step in &workflow.steps {
            let config = to_json_string(&step.config)?;
            let conditions = step
                .conditions
                .as_ref()
                .map(to_json_string)
                .transpose()?;
            sqlx::query(
                r#"INSERT INTO workflow_steps
                   (id, workflow_id, step_type, position, config, conditions, enabled, continue_on_failure)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(step.id.to_string())
            .bind(workflow.id.to_string())
            .bind(&step.step_type)
            .bind(step.position as i64)
            .bind(&config)
            .bind(&conditions)
            .bind(step.enabled)
            .bind(step.continue_on_failure)
            .execute(&mut *tx)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict(
                    format!("duplicate step position {} in workflow", step.position),
                ),
                _ => RepositoryError::Query(e.to_string()),
            })?;
        }

        tx.commit()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(())
    }

    async fn get_workflow(&self, id: Uuid) -> Result<Option<Workflow>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, tenant_id, name, trigger_type, trigger_config, status,
                    executions_count, last_executed_at, created_at, updated_at
             FROM workflows WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = WorkflowRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                let steps = self.load_steps(id).await?;
                Ok(Some(r.into_workflow(steps)?))
            }
            None => Ok(None),
        }
    }

    async fn list_scheduled_workflows(&self) -> Result<Vec<Workflow>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, tenant_id, name, trigger_type, trigger_config, status,
                    executions_count, last_executed_at, created_at, updated_at
             FROM workflows WHERE trigger_type = 'schedule' AND status = 'active'
             ORDER BY id ASC",
        )
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut workflows = Vec::with_capacity(rows.len());
        for row in &rows {
            let r =
                WorkflowRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            let id = parse_uuid(&r.id)?;
            let steps = self.load_steps(id).await?;
            workflows.push(r.into_workflow(steps)?);
        }
        Ok(workflows)
    }

    async fn record_workflow_executed(
        &self,
        workflow_id: Uuid,
        executed_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE workflows
             SET executions_count = executions_count + 1,
                 last_executed_at = ?,
                 updated_at = ?
             WHERE id = ?",
        )
        .bind(format_datetime(&executed_at))
        .bind(format_datetime(&Utc::now()))
        .bind(workflow_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn create_execution(
        &self,
        execution: &WorkflowExecution,
    ) -> Result<(), RepositoryError> {
        let trigger_data = to_json_string(&execution.trigger_data)?;
        let context = to_json_string(&execution.context)?;

        sqlx::query(
            r#"INSERT INTO workflow_executions
               (id, workflow_id, status, trigger_source, trigger_data, context,
                current_step_position, completed_steps_count, failed_steps_count,
                error_message, created_at, started_at, completed_at, duration_ms)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(execution.id.to_string())
        .bind(execution.workflow_id.to_string())
        .bind(execution.status.as_str())
        .bind(execution.trigger_source.as_str())
        .bind(&trigger_data)
        .bind(&context)
        .bind(execution.current_step_position.map(|p| p as i64))
        .bind(execution.completed_steps_count as i64)
        .bind(execution.failed_steps_count as i64)
        .bind(&execution.error_message)
        .bind(format_datetime(&execution.created_at))
        .bind(execution.started_at.as_ref().map(format_datetime))
        .bind(execution.completed_at.as_ref().map(format_datetime))
        .bind(execution.duration_ms.map(|d| d as i64))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RepositoryError::Conflict(format!("execution {} already exists", execution.id))
            }
            _ => RepositoryError::Query(e.to_string()),
        })?;

        Ok(())
    }

    async fn get_execution(
        &self,
        id: Uuid,
    ) -> Result<Option<WorkflowExecution>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, workflow_id, status, trigger_source, trigger_data, context,
                    current_step_position, completed_steps_count, failed_steps_count,
                    error_message, created_at, started_at, completed_at, duration_ms
             FROM workflow_executions WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = ExecutionRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_execution()?))
            }
            None => Ok(None),
        }
    }

    async fn update_execution(
        &self,
        execution: &WorkflowExecution,
    ) -> Result<(), RepositoryError> {
        let trigger_data = to_json_string(&execution.trigger_data)?;
        let context = to_json_string(&execution.context)?;

        let result = sqlx::query(
            r#"UPDATE workflow_executions SET
                 status = ?,
                 trigger_data = ?,
                 context = ?,
                 current_step_position = ?,
                 completed_steps_count = ?,
                 failed_steps_count = ?,
                 error_message = ?,
                 started_at = ?,
                 completed_at = ?,
                 duration_ms = ?
               WHERE id = ?"#,
        )
        .bind(execution.status.as_str())
        .bind(&trigger_data)
        .bind(&context)
        .bind(execution.current_step_position.map(|p| p as i64))
        .bind(execution.completed_steps_count as i64)
        .bind(execution.failed_steps_count as i64)
        .bind(&execution.error_message)
        .bind(execution.started_at.as_ref().map(format_datetime))
        .bind(execution.completed_at.as_ref().map(format_datetime))
        .bind(execution.duration_ms.map(|d| d as i64))
        .bind(execution.id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn create_step_log(&self, log: &WorkflowStepLog) -> Result<(), RepositoryError> {
        let input_data = log.input_data.as_ref().map(to_json_string).transpose()?;
        let output_data = log.output_data.as_ref().map(to_json_string).transpose()?;

        sqlx::query(
            r#"INSERT INTO workflow_step_logs
               (id, execution_id, step_id, position, status, input_data, output_data,
                error_message, error_backtrace, retry_count, started_at, completed_at, duration_ms)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(log.id.to_string())
        .bind(log.execution_id.to_string())
        .bind(log.step_id.to_string())
        .bind(log.position as i64)
        .bind(log.status.as_str())
        .bind(&input_data)
        .bind(&output_data)
        .bind(&log.error_message)
        .bind(&log.error_backtrace)
        .bind(log.retry_count as i64)
        .bind(log.started_at.as_ref().map(format_datetime))
        .bind(log.completed_at.as_ref().map(format_datetime))
        .bind(log.duration_ms.map(|d| d as i64))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict(
                format!("step log for step {} already exists", log.step_id),
            ),
            _ => RepositoryError::Query(e.to_string()),
        })?;

        Ok(())
    }

    async fn update_step_log(&self, log: &WorkflowStepLog) -> Result<(), RepositoryError> {
        let input_data = log.input_data.as_ref().map(to_json_string).transpose()?;
        let output_data = log.output_data.as_ref().map(to_json_string).transpose()?;

        let result = sqlx::query(
            r#"UPDATE workflow_step_logs SET
                 status = ?,
                 input_data = ?,
                 output_data = ?,
                 error_message = ?,
                 error_backtrace = ?,
                 retry_count = ?,
                 started_at = ?,
                 completed_at = ?,
                 duration_ms = ?
               WHERE id = ?"#,
        )
        .bind(log.status.as_str())
        .bind(&input_data)
        .bind(&output_data)
        .bind(&log.error_message)
        .bind(&log.error_backtrace)
        .bind(log.retry_count as i64)
        .bind(log.started_at.as_ref().map(format_datetime))
        .bind(log.completed_at.as_ref().map(format_datetime))
        .bind(log.duration_ms.map(|d| d as i64))
        .bind(log.id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn get_step_log(
        &self,
        execution_id: Uuid,
        step_id: Uuid,
    ) -> Result<Option<WorkflowStepLog>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, execution_id, step_id, position, status, input_data, output_data,
                    error_message, error_backtrace, retry_count, started_at, completed_at, duration_ms
             FROM workflow_step_logs WHERE execution_id = ? AND step_id = ?",
        )
        .bind(execution_id.to_string())
        .bind(step_id.to_string())
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = StepLogRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_step_log()?))
            }
            None => Ok(None),
        }
    }

    async fn list_step_logs(
        &self,
        execution_id: Uuid,
    ) -> Result<Vec<WorkflowStepLog>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, execution_id, step_id, position, status, input_data, output_data,
                    error_message, error_backtrace, retry_count, started_at, completed_at, duration_ms
             FROM workflow_step_logs WHERE execution_id = ? ORDER BY position ASC",
        )
        .bind(execution_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut logs = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = StepLogRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            logs.push(r.into_step_log()?);
        }
        Ok(logs)
    }

    async fn reset_failed_step_logs(&self, execution_id: Uuid) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE workflow_step_logs SET
               status = 'pending',
               error_message = NULL,
               error_backtrace = NULL,
               started_at = NULL,
               completed_at = NULL,
               duration_ms = NULL
             WHERE execution_id = ? AND status = 'failed'",
        )
        .bind(execution_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(result.rows_affected())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

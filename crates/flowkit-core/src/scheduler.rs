//! Polling cron scheduler for schedule-triggered workflows.
//!
//! Every poll the scheduler lists active workflows with a schedule
//! trigger, computes whether their cron expression fired inside the last
//! polling window (in the workflow's fixed-offset timezone), and starts an
//! execution through the engine. A debounce guard keeps a workflow from
//! firing twice when polls and completions race.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use dashmap::DashMap;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use flowkit_types::error::RepositoryError;
use flowkit_types::workflow::{ScheduleConfig, TriggerType, Workflow};

use crate::dispatch::Dispatcher;
use crate::engine::WorkflowEngine;
use crate::repository::WorkflowRepository;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often the scheduler scans for due workflows.
    pub poll_interval: Duration,
    /// Minimum spacing between two fires of the same workflow.
    pub debounce_window: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            debounce_window: Duration::from_secs(120),
        }
    }
}

/// Scans schedule-triggered workflows and fires due ones.
pub struct PollingScheduler<R, D> {
    engine: Arc<WorkflowEngine<R, D>>,
    repo: Arc<R>,
    config: SchedulerConfig,
    /// When each workflow was last fired by this scheduler instance. The
    /// debounce also checks `last_executed_at`, but that only updates on
    /// completion; this map covers still-running executions.
    last_fired: DashMap<Uuid, DateTime<Utc>>,
}

impl<R, D> PollingScheduler<R, D>
where
    R: WorkflowRepository,
    D: Dispatcher,
{
    pub fn new(engine: Arc<WorkflowEngine<R, D>>, repo: Arc<R>, config: SchedulerConfig) -> Self {
        Self {
            engine,
            repo,
            config,
            last_fired: DashMap::new(),
        }
    }

    /// Poll loop. Runs until the shutdown token fires.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tracing::info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            "scheduler started"
        );
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("scheduler shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.poll_once(Utc::now()).await {
                        tracing::error!(error = %err, "scheduler poll failed");
                    }
                }
            }
        }
    }

    /// One scheduling pass at `now`. Returns how many workflows fired.
    ///
    /// A malformed schedule on one workflow logs a warning and skips only
    /// that workflow.
    pub async fn poll_once(&self, now: DateTime<Utc>) -> Result<usize, RepositoryError> {
        let workflows = self.repo.list_scheduled_workflows().await?;
        let window = chrono::Duration::from_std(self.config.poll_interval)
            .unwrap_or_else(|_| chrono::Duration::seconds(60));
        let mut fired = 0usize;

        for workflow in &workflows {
            let Some((config, due)) = self.due_at(workflow, now, window) else {
                continue;
            };
            if self.debounced(workflow, now) {
                tracing::debug!(workflow_id = %workflow.id, "schedule fire debounced");
                continue;
            }
            let trigger_data = json!({
                "scheduled_at": due.to_rfc3339(),
                "cron": config.cron,
                "timezone": config.timezone,
            });
            match self
                .engine
                .execute(workflow.id, TriggerType::Schedule, trigger_data)
                .await
            {
                Ok(execution) => {
                    self.last_fired.insert(workflow.id, now);
                    fired += 1;
                    tracing::info!(
                        workflow_id = %workflow.id,
                        execution_id = %execution.id,
                        scheduled_at = %due,
                        "scheduled workflow fired"
                    );
                }
                Err(err) => {
                    tracing::warn!(
                        workflow_id = %workflow.id,
                        error = %err,
                        "scheduled workflow failed to start"
                    );
                }
            }
        }
        Ok(fired)
    }

    /// Parse the workflow's schedule and return the due time if its cron
    /// fired within the window ending at `now`.
    fn due_at(
        &self,
        workflow: &Workflow,
        now: DateTime<Utc>,
        window: chrono::Duration,
    ) -> Option<(ScheduleConfig, DateTime<Utc>)> {
        let config = match ScheduleConfig::from_value(&workflow.trigger_config) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(
                    workflow_id = %workflow.id,
                    error = %err,
                    "invalid schedule trigger config"
                );
                return None;
            }
        };
        let cron_expr = normalize_cron(&config.cron);
        let cron = match cron_expr.parse::<croner::Cron>() {
            Ok(cron) => cron,
            Err(err) => {
                tracing::warn!(
                    workflow_id = %workflow.id,
                    cron = %config.cron,
                    error = %err,
                    "invalid cron expression"
                );
                return None;
            }
        };
        let offset = match parse_offset(config.timezone.as_deref()) {
            Some(offset) => offset,
            None => {
                tracing::warn!(
                    workflow_id = %workflow.id,
                    timezone = config.timezone.as_deref().unwrap_or_default(),
                    "invalid schedule timezone"
                );
                return None;
            }
        };

        let window_start = (now - window).with_timezone(&offset);
        let due = cron
            .iter_after(window_start)
            .next()
            .map(|t| t.with_timezone(&Utc))
            .filter(|t| *t <= now)?;
        Some((config, due))
    }

    /// True when the workflow fired (or finished a run) too recently.
    fn debounced(&self, workflow: &Workflow, now: DateTime<Utc>) -> bool {
        let debounce = chrono::Duration::from_std(self.config.debounce_window)
            .unwrap_or_else(|_| chrono::Duration::seconds(120));
        let recent_fire = self.last_fired.get(&workflow.id).map(|e| *e.value());
        let last = match (workflow.last_executed_at, recent_fire) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        matches!(last, Some(last) if now - last < debounce)
    }
}

// ---------------------------------------------------------------------------
// Schedule parsing helpers
// ---------------------------------------------------------------------------

/// Croner expects a seconds field; standard 5-field expressions get a `0`
/// prepended. 6-field expressions pass through unchanged.
fn normalize_cron(expr: &str) -> String {
    let trimmed = expr.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    }
}

/// Parse a fixed UTC offset string like `"+02:00"` or `"-05:30"`. `None`,
/// empty, `"UTC"`, and `"Z"` mean UTC. Unparseable input returns `None`.
fn parse_offset(timezone: Option<&str>) -> Option<FixedOffset> {
    let tz = match timezone {
        None => return Some(Utc.fix()),
        Some(tz) => tz.trim(),
    };
    if tz.is_empty() || tz.eq_ignore_ascii_case("utc") || tz == "Z" {
        return Some(Utc.fix());
    }
    let (sign, rest) = match tz.split_at_checked(1)? {
        ("+", rest) => (1i32, rest),
        ("-", rest) => (-1i32, rest),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':')?;
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 14 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

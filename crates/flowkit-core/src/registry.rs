//! Step capability contract and the closed handler registry.
//!
//! The engine never contains step business logic. Each step type is a
//! registered [`StepHandler`] resolved by its stable string key; the
//! registry is populated once at process start and is an explicit closed
//! table, never a dynamic plugin surface.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use flowkit_types::workflow::{WorkflowExecution, WorkflowStep};

use crate::cache::LookupCache;
use crate::notify::{Notifier, TracingNotifier};

// ---------------------------------------------------------------------------
// Step results & errors
// ---------------------------------------------------------------------------

/// Outcome of one step handler invocation.
///
/// `success: false` is a structured, expected outcome (for example "no
/// matching document"): the step log completes with the output recorded.
/// Unexpected failures are returned as [`StepExecutionError`] instead.
#[derive(Debug, Clone)]
pub struct StepResult {
    pub success: bool,
    /// Arbitrary JSON persisted (sanitized) on the step log.
    pub output: Value,
    /// Keys merged into the execution context, overriding on collision.
    pub context_updates: Map<String, Value>,
}

impl StepResult {
    pub fn ok(output: Value) -> Self {
        Self {
            success: true,
            output,
            context_updates: Map::new(),
        }
    }

    pub fn with_context_updates(mut self, updates: Map<String, Value>) -> Self {
        self.context_updates = updates;
        self
    }
}

/// Step-level failures, caught by the executor and recorded on the step log.
#[derive(Debug, Error)]
pub enum StepExecutionError {
    #[error("step failed: {0}")]
    Failed(String),

    #[error("unknown step type: {0}")]
    UnknownStepType(String),

    #[error("invalid step config: {0}")]
    InvalidConfig(String),
}

// ---------------------------------------------------------------------------
// Invocation & services
// ---------------------------------------------------------------------------

/// Shared services handed to every step handler.
#[derive(Clone)]
pub struct StepServices {
    pub notifier: Arc<dyn Notifier>,
    pub lookups: Arc<LookupCache>,
}

impl Default for StepServices {
    fn default() -> Self {
        Self {
            notifier: Arc::new(TracingNotifier),
            lookups: Arc::new(LookupCache::empty()),
        }
    }
}

/// Everything a handler sees for one step invocation. The context is the
/// execution's accumulated state at the moment the step starts; handlers
/// influence it only through [`StepResult::context_updates`].
pub struct StepInvocation<'a> {
    pub execution: &'a WorkflowExecution,
    pub step: &'a WorkflowStep,
    pub context: &'a Map<String, Value>,
    pub services: &'a StepServices,
}

/// The capability every step type implements.
#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn execute(
        &self,
        invocation: &StepInvocation<'_>,
    ) -> Result<StepResult, StepExecutionError>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

pub type StepFactory = Arc<dyn Fn() -> Box<dyn StepHandler> + Send + Sync>;

/// Closed table mapping step type keys to handler factories.
#[derive(Default)]
pub struct StepRegistry {
    factories: HashMap<String, StepFactory>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under a step type key. Last registration wins.
    pub fn register(
        &mut self,
        step_type: impl Into<String>,
        factory: impl Fn() -> Box<dyn StepHandler> + Send + Sync + 'static,
    ) {
        let step_type = step_type.into();
        if self.factories.insert(step_type.clone(), Arc::new(factory)).is_some() {
            tracing::warn!(step_type = %step_type, "step handler re-registered");
        }
    }

    /// Build a handler for a step type, or `None` for unregistered types.
    pub fn resolve(&self, step_type: &str) -> Option<Box<dyn StepHandler>> {
        self.factories.get(step_type).map(|f| f())
    }

    pub fn contains(&self, step_type: &str) -> bool {
        self.factories.contains_key(step_type)
    }

    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

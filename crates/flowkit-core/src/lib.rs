//! Flowkit engine core.
//!
//! Pure domain logic for the workflow automation engine: the condition
//! evaluator, the step handler registry, the step executor state machine,
//! the engine facade (execute / resume / cancel), the dispatch queue, and
//! the polling cron scheduler. Storage lives behind the
//! [`repository::WorkflowRepository`] port; flowkit-infra provides the
//! SQLite adapter.

pub mod cache;
pub mod condition;
pub mod dispatch;
pub mod engine;
pub mod executor;
pub mod notify;
pub mod registry;
pub mod repository;
pub mod sanitize;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

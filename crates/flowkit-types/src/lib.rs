//! Shared domain types for the Flowkit workflow automation engine.
//!
//! This crate holds the canonical entities (workflows, steps, executions,
//! step logs), their status enums, the condition rule tree, and the error
//! types shared across crates. It depends only on serde-family crates --
//! never on the engine or any storage/IO crate.

pub mod condition;
pub mod error;
pub mod workflow;

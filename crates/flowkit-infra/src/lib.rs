//! Infrastructure adapters for Flowkit.
//!
//! Currently SQLite only: a split reader/writer WAL pool and the
//! `WorkflowRepository` implementation.

pub mod sqlite;

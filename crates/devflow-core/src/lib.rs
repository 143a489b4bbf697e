//! Workflow orchestration core for devflow.
//!
//! This crate owns the engine: workflow definitions and their validation,
//! the capability registry that maps tool IDs to executors, the run
//! orchestrator, and the event bus runs publish to. It depends only on
//! `devflow-types`; concrete tools live in `devflow-infra`.

pub mod capability;
pub mod event;
pub mod workflow;

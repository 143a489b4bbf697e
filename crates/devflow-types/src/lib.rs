//! Shared domain types for devflow.
//!
//! This crate contains the types passed between the engine, the built-in
//! executors and the CLI: workflow definitions and templates, runs and their
//! results, orchestration events, and engine configuration.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono.

pub mod config;
pub mod event;
pub mod workflow;

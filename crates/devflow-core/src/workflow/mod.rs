//! Workflow engine core.
//!
//! - `definition` -- JSON/YAML parsing, validation, filesystem load/save
//! - `dag` -- dependency graph, cycle detection, execution order
//! - `catalog` -- built-in templates and instantiation
//! - `context` -- per-step context and template resolution
//! - `retry` -- error handling policy decisions and backoff
//! - `step_runner` -- single step invocation under a deadline
//! - `run_store` -- in-memory run state and control handles
//! - `executor` -- the run orchestrator

pub mod catalog;
pub mod context;
pub mod dag;
pub mod definition;
pub mod executor;
pub mod retry;
pub mod run_store;
pub mod step_runner;

pub use catalog::{CatalogError, TemplateCatalog};
pub use context::StepContext;
pub use definition::WorkflowError;
pub use executor::{Orchestrator, OrchestratorError, RunHandle, StartOptions};

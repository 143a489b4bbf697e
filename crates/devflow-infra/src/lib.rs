//! Infrastructure layer for devflow.
//!
//! Configuration loading from the data directory and the concrete step
//! executors (filesystem, git, HTTP, simulated tools) registered into the
//! `devflow-core` capability registry.

pub mod config;
pub mod tools;

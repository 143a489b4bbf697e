//! Step capability registry.
//!
//! Maps tool IDs to executors that implement the uniform `StepExecutor`
//! contract. The registry is built once at start-up and then shared
//! read-only by every run.

pub mod executor;
pub mod registry;

pub use executor::{BoxStepExecutor, FnExecutor, StepExecutor, StepExecutorDyn, ToolError, executor_fn};
pub use registry::{
    CapabilityRegistry, RegistryError, ToolCategory, ToolDescriptor, ToolExecution, ToolSpec,
};

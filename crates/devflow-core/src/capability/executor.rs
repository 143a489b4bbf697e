//! StepExecutor trait and its object-safe dynamic dispatch wrapper.
//!
//! Follows the blanket-impl pattern:
//! 1. `StepExecutor` uses native async fn in traits (RPITIT)
//! 2. An object-safe `StepExecutorDyn` with boxed futures is blanket-implemented
//!    for every `T: StepExecutor`
//! 3. `BoxStepExecutor` wraps `Box<dyn StepExecutorDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::workflow::context::StepContext;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Failure reported by an executor.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The step's parameters are missing a field or have the wrong shape.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// The operation ran and failed.
    #[error("{0}")]
    Failed(String),

    /// The executor does not support the requested operation.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ToolError {
    pub fn failed(message: impl Into<String>) -> Self {
        ToolError::Failed(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        ToolError::InvalidParameters(message.into())
    }
}

// ---------------------------------------------------------------------------
// StepExecutor
// ---------------------------------------------------------------------------

/// The uniform contract every step capability implements.
///
/// `parameters` are the step's parameters with the `tool` override removed.
/// Executors must be safe to call from many runs at once.
pub trait StepExecutor: Send + Sync {
    fn execute(
        &self,
        parameters: Map<String, Value>,
        context: &StepContext,
    ) -> impl Future<Output = Result<Value, ToolError>> + Send;
}

/// Object-safe version of [`StepExecutor`] with boxed futures.
///
/// This trait exists solely to enable dynamic dispatch (`dyn StepExecutorDyn`).
/// A blanket implementation is provided for all types implementing `StepExecutor`.
pub trait StepExecutorDyn: Send + Sync {
    fn execute_boxed<'a>(
        &'a self,
        parameters: Map<String, Value>,
        context: &'a StepContext,
    ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + 'a>>;
}

/// Blanket implementation: any `StepExecutor` automatically implements `StepExecutorDyn`.
impl<T: StepExecutor> StepExecutorDyn for T {
    fn execute_boxed<'a>(
        &'a self,
        parameters: Map<String, Value>,
        context: &'a StepContext,
    ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + 'a>> {
        Box::pin(self.execute(parameters, context))
    }
}

/// Type-erased step executor stored in the registry.
///
/// Since `StepExecutor` uses RPITIT, it cannot be used as a trait object
/// directly. `BoxStepExecutor` delegates to the inner `StepExecutorDyn`.
pub struct BoxStepExecutor {
    inner: Box<dyn StepExecutorDyn + Send + Sync>,
}

impl BoxStepExecutor {
    /// Wrap a concrete `StepExecutor` in a type-erased box.
    pub fn new<T: StepExecutor + 'static>(executor: T) -> Self {
        Self {
            inner: Box::new(executor),
        }
    }

    pub async fn execute(
        &self,
        parameters: Map<String, Value>,
        context: &StepContext,
    ) -> Result<Value, ToolError> {
        self.inner.execute_boxed(parameters, context).await
    }
}

impl std::fmt::Debug for BoxStepExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxStepExecutor").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Closure adapter
// ---------------------------------------------------------------------------

/// A `StepExecutor` backed by an async closure.
pub struct FnExecutor<F>(F);

/// Build an executor from a closure taking `(parameters, context)`.
pub fn executor_fn<F, Fut>(f: F) -> FnExecutor<F>
where
    F: Fn(Map<String, Value>, StepContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ToolError>> + Send,
{
    FnExecutor(f)
}

impl<F, Fut> StepExecutor for FnExecutor<F>
where
    F: Fn(Map<String, Value>, StepContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ToolError>> + Send,
{
    fn execute(
        &self,
        parameters: Map<String, Value>,
        context: &StepContext,
    ) -> impl Future<Output = Result<Value, ToolError>> + Send {
        (self.0)(parameters, context.clone())
    }
}

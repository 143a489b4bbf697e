//! Single-attempt step invocation.
//!
//! `StepRunner` resolves a step's executor in the capability registry and
//! runs it once under the step's hard deadline. Retry, skip and fallback
//! decisions are made by the orchestrator on top of this.

use std::sync::Arc;
use std::time::Duration;

use devflow_types::workflow::StepDefinition;
use serde_json::{Map, Value};

use super::context::StepContext;
use crate::capability::{CapabilityRegistry, RegistryError};

// ---------------------------------------------------------------------------
// StepError
// ---------------------------------------------------------------------------

/// Errors from a single step invocation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
    /// The executor did not finish within the step's timeout.
    #[error("step '{step_id}' timed out after {timeout_ms}ms")]
    Timeout { step_id: String, timeout_ms: u64 },

    /// The executor returned an error or panicked.
    #[error("step '{step_id}' failed: {error}")]
    Failed { step_id: String, error: String },

    /// No executor is registered under the resolved tool ID.
    #[error("step '{step_id}' uses unknown tool '{tool_id}'")]
    ToolNotFound { step_id: String, tool_id: String },
}

impl StepError {
    pub fn step_id(&self) -> &str {
        match self {
            StepError::Timeout { step_id, .. }
            | StepError::Failed { step_id, .. }
            | StepError::ToolNotFound { step_id, .. } => step_id,
        }
    }

    /// The failure without the step prefix.
    pub fn detail(&self) -> String {
        match self {
            StepError::Timeout { timeout_ms, .. } => format!("timed out after {timeout_ms}ms"),
            StepError::Failed { error, .. } => error.clone(),
            StepError::ToolNotFound { tool_id, .. } => format!("unknown tool '{tool_id}'"),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, StepError::Timeout { .. })
    }
}

// ---------------------------------------------------------------------------
// StepRunner
// ---------------------------------------------------------------------------

/// Runs one step invocation through the capability registry.
#[derive(Debug, Clone)]
pub struct StepRunner {
    registry: Arc<CapabilityRegistry>,
}

impl StepRunner {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Resolve the tool ID for a step and the parameters its executor receives.
    ///
    /// A string `tool` parameter overrides the step type's default tool and is
    /// removed from the forwarded parameters.
    pub fn prepare(step: &StepDefinition) -> (String, Map<String, Value>) {
        let tool_id = step.tool_id().to_string();
        let mut parameters = step.parameters.clone();
        if step.tool_override().is_some() {
            parameters.remove("tool");
        }
        (tool_id, parameters)
    }

    /// Invoke the step's executor once, bounded by `step.timeout_ms`.
    ///
    /// On timeout the executor future is dropped.
    pub async fn run(
        &self,
        step: &StepDefinition,
        tool_id: &str,
        parameters: Map<String, Value>,
        context: &StepContext,
    ) -> Result<Value, StepError> {
        let deadline = Duration::from_millis(step.timeout_ms);
        let started = std::time::Instant::now();

        let outcome =
            tokio::time::timeout(deadline, self.registry.execute(tool_id, parameters, context))
                .await;

        match outcome {
            Err(_elapsed) => {
                tracing::warn!(
                    step_id = step.id.as_str(),
                    tool_id,
                    timeout_ms = step.timeout_ms,
                    "step timed out"
                );
                Err(StepError::Timeout {
                    step_id: step.id.clone(),
                    timeout_ms: step.timeout_ms,
                })
            }
            Ok(Err(RegistryError::ToolNotFound(tool_id))) => Err(StepError::ToolNotFound {
                step_id: step.id.clone(),
                tool_id,
            }),
            Ok(Ok(execution)) => {
                tracing::debug!(
                    step_id = step.id.as_str(),
                    tool_id,
                    success = execution.success,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "step invocation finished"
                );
                execution.into_result().map_err(|error| StepError::Failed {
                    step_id: step.id.clone(),
                    error,
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

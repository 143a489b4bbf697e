//! Capability registry for runtime executor lookup.
//!
//! A tool-ID-indexed registry of boxed step executors with descriptive
//! metadata. Executor failures and panics are turned into a `ToolExecution`
//! record at this boundary; nothing escapes `execute`.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::executor::{BoxStepExecutor, StepExecutor};
use crate::workflow::context::StepContext;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Errors from registry lookups.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("tool not found: {0}")]
    ToolNotFound(String),
}

/// Broad grouping used for listing tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    AiGeneration,
    CodeAnalysis,
    CodeEditing,
    FileSystem,
    Git,
    Database,
    Deployment,
    Testing,
    Monitoring,
    ApiCall,
    Custom,
}

impl ToolCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolCategory::AiGeneration => "ai_generation",
            ToolCategory::CodeAnalysis => "code_analysis",
            ToolCategory::CodeEditing => "code_editing",
            ToolCategory::FileSystem => "file_system",
            ToolCategory::Git => "git",
            ToolCategory::Database => "database",
            ToolCategory::Deployment => "deployment",
            ToolCategory::Testing => "testing",
            ToolCategory::Monitoring => "monitoring",
            ToolCategory::ApiCall => "api_call",
            ToolCategory::Custom => "custom",
        }
    }
}

impl std::fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptive metadata for a registered tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpec {
    pub name: String,
    /// Free-form implementation kind, e.g. "builtin" or "placeholder".
    pub tool_type: String,
    pub category: ToolCategory,
    #[serde(default)]
    pub description: String,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, category: ToolCategory) -> Self {
        Self {
            name: name.into(),
            tool_type: "custom".to_string(),
            category,
            description: String::new(),
        }
    }

    pub fn with_type(mut self, tool_type: impl Into<String>) -> Self {
        self.tool_type = tool_type.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// A registered tool: its ID, metadata and executor.
#[derive(Debug)]
pub struct ToolDescriptor {
    pub id: String,
    pub spec: ToolSpec,
    executor: BoxStepExecutor,
}

impl ToolDescriptor {
    pub fn executor(&self) -> &BoxStepExecutor {
        &self.executor
    }
}

/// Outcome of one registry-mediated invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolExecution {
    pub tool_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ToolExecution {
    fn succeeded(tool_id: &str, result: Value) -> Self {
        Self {
            tool_id: tool_id.to_string(),
            success: true,
            result: Some(result),
            error: None,
            timestamp: Utc::now(),
        }
    }

    fn failed(tool_id: &str, error: String) -> Self {
        Self {
            tool_id: tool_id.to_string(),
            success: false,
            result: None,
            error: Some(error),
            timestamp: Utc::now(),
        }
    }

    /// Collapse into the executor's value or its error message.
    pub fn into_result(self) -> Result<Value, String> {
        if self.success {
            Ok(self.result.unwrap_or(Value::Null))
        } else {
            Err(self
                .error
                .unwrap_or_else(|| format!("tool '{}' failed", self.tool_id)))
        }
    }
}

// ---------------------------------------------------------------------------
// CapabilityRegistry
// ---------------------------------------------------------------------------

/// Registry of available step executors, indexed by tool ID.
///
/// Holds no per-run state. Build it mutably at start-up, then share it
/// behind an `Arc`.
pub struct CapabilityRegistry {
    tools: HashMap<String, ToolDescriptor>,
}

impl CapabilityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register an executor under the given tool ID.
    ///
    /// If a tool with this ID already exists, it is replaced.
    pub fn register<E: StepExecutor + 'static>(
        &mut self,
        tool_id: impl Into<String>,
        spec: ToolSpec,
        executor: E,
    ) {
        self.register_boxed(tool_id, spec, BoxStepExecutor::new(executor));
    }

    /// Register an already boxed executor.
    pub fn register_boxed(
        &mut self,
        tool_id: impl Into<String>,
        spec: ToolSpec,
        executor: BoxStepExecutor,
    ) {
        let id = tool_id.into();
        if self.tools.contains_key(&id) {
            tracing::debug!(tool_id = %id, "replacing registered tool");
        }
        self.tools.insert(
            id.clone(),
            ToolDescriptor {
                id,
                spec,
                executor,
            },
        );
    }

    /// Look up a tool by ID.
    pub fn resolve(&self, tool_id: &str) -> Result<&ToolDescriptor, RegistryError> {
        self.tools
            .get(tool_id)
            .ok_or_else(|| RegistryError::ToolNotFound(tool_id.to_string()))
    }

    pub fn contains(&self, tool_id: &str) -> bool {
        self.tools.contains_key(tool_id)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// All registered tools, sorted by ID.
    pub fn list_tools(&self) -> Vec<&ToolDescriptor> {
        let mut tools: Vec<_> = self.tools.values().collect();
        tools.sort_by(|a, b| a.id.cmp(&b.id));
        tools
    }

    /// Registered tools in one category, sorted by ID.
    pub fn list_by_category(&self, category: ToolCategory) -> Vec<&ToolDescriptor> {
        self.list_tools()
            .into_iter()
            .filter(|t| t.spec.category == category)
            .collect()
    }

    /// Invoke a tool once.
    ///
    /// Only an unknown `tool_id` is an `Err`. Executor errors and panics come
    /// back as a `ToolExecution` with `success == false`.
    pub async fn execute(
        &self,
        tool_id: &str,
        parameters: Map<String, Value>,
        context: &StepContext,
    ) -> Result<ToolExecution, RegistryError> {
        let descriptor = self.resolve(tool_id)?;

        let outcome = AssertUnwindSafe(descriptor.executor.execute(parameters, context))
            .catch_unwind()
            .await;

        let execution = match outcome {
            Ok(Ok(value)) => ToolExecution::succeeded(tool_id, value),
            Ok(Err(e)) => {
                tracing::debug!(tool_id, step_id = %context.step_id, error = %e, "tool returned error");
                ToolExecution::failed(tool_id, e.to_string())
            }
            Err(panic) => {
                let message = format!("tool '{}' panicked: {}", tool_id, panic_message(&*panic));
                tracing::warn!(tool_id, step_id = %context.step_id, "{message}");
                ToolExecution::failed(tool_id, message)
            }
        };
        Ok(execution)
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.tools.keys().collect();
        ids.sort();
        f.debug_struct("CapabilityRegistry").field("tools", &ids).finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::executor::{ToolError, executor_fn};
    use devflow_types::workflow::{StepDefinition, StepType};
    use serde_json::json;

    fn ctx() -> StepContext {
        StepContext::detached(&StepDefinition::new("s1", StepType::Custom))
    }

    fn registry() -> CapabilityRegistry {
        let mut reg = CapabilityRegistry::new();
        reg.register(
            "ok",
            ToolSpec::new("Ok", ToolCategory::Custom),
            executor_fn(|_p, _c| async { Ok(json!({ "ok": true })) }),
        );
        reg.register(
            "fails",
            ToolSpec::new("Fails", ToolCategory::Testing),
            executor_fn(|_p, _c| async { Err::<Value, _>(ToolError::failed("boom")) }),
        );
        reg.register(
            "panics",
            ToolSpec::new("Panics", ToolCategory::Custom),
            executor_fn(|_p, _c| async {
                if true {
                    panic!("kaboom");
                }
                Ok(Value::Null)
            }),
        );
        reg
    }

    #[test]
    fn resolve_unknown_tool() {
        let reg = registry();
        assert_eq!(
            reg.resolve("missing").unwrap_err(),
            RegistryError::ToolNotFound("missing".to_string())
        );
        assert!(reg.contains("ok"));
        assert_eq!(reg.len(), 3);
    }

    #[test]
    fn register_overwrites_existing_id() {
        let mut reg = registry();
        reg.register(
            "ok",
            ToolSpec::new("Replaced", ToolCategory::Git),
            executor_fn(|_p, _c| async { Ok(Value::Null) }),
        );
        assert_eq!(reg.len(), 3);
        assert_eq!(reg.resolve("ok").unwrap().spec.name, "Replaced");
    }

    #[test]
    fn list_tools_sorted_and_filtered() {
        let reg = registry();
        let ids: Vec<_> = reg.list_tools().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["fails", "ok", "panics"]);

        let testing = reg.list_by_category(ToolCategory::Testing);
        assert_eq!(testing.len(), 1);
        assert_eq!(testing[0].id, "fails");
        assert!(reg.list_by_category(ToolCategory::Database).is_empty());
    }

    #[tokio::test]
    async fn execute_success_wraps_result() {
        let exec = registry().execute("ok", Map::new(), &ctx()).await.unwrap();
        assert!(exec.success);
        assert_eq!(exec.tool_id, "ok");
        assert_eq!(exec.into_result().unwrap(), json!({ "ok": true }));
    }

    #[tokio::test]
    async fn execute_error_is_captured() {
        let exec = registry().execute("fails", Map::new(), &ctx()).await.unwrap();
        assert!(!exec.success);
        assert_eq!(exec.error.as_deref(), Some("boom"));
        assert!(exec.result.is_none());
    }

    #[tokio::test]
    async fn execute_panic_is_captured() {
        let exec = registry().execute("panics", Map::new(), &ctx()).await.unwrap();
        assert!(!exec.success);
        assert!(exec.error.unwrap().contains("kaboom"));
    }

    #[tokio::test]
    async fn execute_unknown_tool_is_err() {
        let err = registry()
            .execute("missing", Map::new(), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::ToolNotFound(_)));
    }

    #[test]
    fn tool_execution_serializes_camel_case() {
        let exec = ToolExecution::failed("git", "no repo".to_string());
        let v = serde_json::to_value(&exec).unwrap();
        assert_eq!(v["toolId"], "git");
        assert_eq!(v["success"], false);
        assert_eq!(v["error"], "no repo");
        assert!(v.get("result").is_none());
    }
}

//! Workflow domain types for devflow.
//!
//! `WorkflowDefinition` is the canonical shape callers submit, as JSON or
//! YAML with camelCase keys. This module also holds the execution tracking
//! types (`WorkflowRun`, `StepResult`, `RunLogEntry`) and the run status
//! state machine.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Default per-step deadline in milliseconds.
pub const DEFAULT_STEP_TIMEOUT_MS: u64 = 30_000;

/// Default per-step retry budget.
pub const DEFAULT_RETRY_COUNT: u32 = 3;

/// Default `maxRetries` on an error handling policy.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

// ---------------------------------------------------------------------------
// Workflow Definition
// ---------------------------------------------------------------------------

/// A named graph of steps plus triggers and one error handling policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    /// Workflow ID. Generated (UUIDv7) when the document omits it.
    #[serde(default = "generate_workflow_id")]
    pub id: String,
    /// Human-readable name. May be empty.
    #[serde(default)]
    pub name: String,
    /// Optional longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Steps in declared order.
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
    /// Conditions under which this workflow may be started.
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    /// How step failures are handled.
    #[serde(default)]
    pub error_handling: ErrorHandlingPolicy,
}

/// Generate a fresh workflow ID.
pub fn generate_workflow_id() -> String {
    Uuid::now_v7().to_string()
}

impl WorkflowDefinition {
    /// Name for logs and display, falling back to the ID.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    /// Look up a step by ID.
    pub fn step(&self, step_id: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    /// Triggers that are currently active.
    pub fn active_triggers(&self) -> impl Iterator<Item = &Trigger> {
        self.triggers.iter().filter(|t| t.is_active)
    }
}

// ---------------------------------------------------------------------------
// Step Definition
// ---------------------------------------------------------------------------

/// One unit of work in a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    /// Step ID, unique within its workflow.
    pub id: String,
    /// Human-readable step name.
    #[serde(default)]
    pub name: String,
    /// The kind of step. Selects the default executor.
    #[serde(rename = "type")]
    pub step_type: StepType,
    /// Opaque executor parameters. A `tool` entry overrides executor lookup.
    #[serde(default)]
    pub parameters: Map<String, Value>,
    /// IDs of steps that must be satisfied before this one runs.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Hard deadline for one invocation, in milliseconds.
    #[serde(rename = "timeout", default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Retry budget used by the `retry` strategy.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    /// Disabled steps are never invoked.
    #[serde(default = "default_true")]
    pub is_enabled: bool,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_STEP_TIMEOUT_MS
}

fn default_retry_count() -> u32 {
    DEFAULT_RETRY_COUNT
}

fn default_true() -> bool {
    true
}

impl StepDefinition {
    /// Build an enabled step with default timeout and retry budget.
    pub fn new(id: impl Into<String>, step_type: StepType) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            step_type,
            parameters: Map::new(),
            dependencies: Vec::new(),
            timeout_ms: DEFAULT_STEP_TIMEOUT_MS,
            retry_count: DEFAULT_RETRY_COUNT,
            is_enabled: true,
        }
    }

    /// Name for logs and display, falling back to the ID.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    /// Explicit `tool` parameter, if present.
    pub fn tool_override(&self) -> Option<&str> {
        self.parameters.get("tool").and_then(Value::as_str)
    }

    /// Registry key used to resolve this step's executor.
    pub fn tool_id(&self) -> &str {
        self.tool_override()
            .unwrap_or_else(|| self.step_type.default_tool_id())
    }
}

/// The kind of step in a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    AiGeneration,
    CodeAnalysis,
    FileOperation,
    GitOperation,
    Deployment,
    Testing,
    ApiCall,
    DatabaseOperation,
    Custom,
}

impl StepType {
    /// Wire name of the step type.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::AiGeneration => "ai_generation",
            StepType::CodeAnalysis => "code_analysis",
            StepType::FileOperation => "file_operation",
            StepType::GitOperation => "git_operation",
            StepType::Deployment => "deployment",
            StepType::Testing => "testing",
            StepType::ApiCall => "api_call",
            StepType::DatabaseOperation => "database_operation",
            StepType::Custom => "custom",
        }
    }

    /// Registry key for steps without a `tool` parameter.
    pub fn default_tool_id(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Triggers
// ---------------------------------------------------------------------------

/// A declarative condition under which a workflow may start.
///
/// Delivery (cron scheduling, webhook endpoints) happens outside the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    #[serde(default)]
    pub configuration: Map<String, Value>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// How a workflow can be triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Manual,
    Scheduled,
    Webhook,
    Event,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::Manual => "manual",
            TriggerType::Scheduled => "scheduled",
            TriggerType::Webhook => "webhook",
            TriggerType::Event => "event",
        }
    }
}

// ---------------------------------------------------------------------------
// Error handling policy
// ---------------------------------------------------------------------------

/// Workflow-wide policy applied when a step fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorHandlingPolicy {
    #[serde(default)]
    pub strategy: ErrorStrategy,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_action: Option<FallbackAction>,
    #[serde(default)]
    pub notification_on_error: bool,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

impl Default for ErrorHandlingPolicy {
    fn default() -> Self {
        Self {
            strategy: ErrorStrategy::Stop,
            max_retries: DEFAULT_MAX_RETRIES,
            fallback_action: None,
            notification_on_error: false,
        }
    }
}

impl ErrorHandlingPolicy {
    /// Policy with the given strategy and defaults elsewhere.
    pub fn with_strategy(strategy: ErrorStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }
}

/// What to do when a step fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStrategy {
    #[default]
    Stop,
    Retry,
    Skip,
    Fallback,
}

impl ErrorStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorStrategy::Stop => "stop",
            ErrorStrategy::Retry => "retry",
            ErrorStrategy::Skip => "skip",
            ErrorStrategy::Fallback => "fallback",
        }
    }
}

/// Named recovery side effect run by the `fallback` strategy, or once the
/// `retry` budget is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackAction {
    /// Publish a notification event.
    NotifyAdmin,
    /// Re-invoke the step once with `retry: true` added to its parameters.
    RegenerateComponent,
    /// Publish a revert event for external handling.
    RevertChanges,
    /// Publish an escalation event.
    EscalateToHuman,
}

impl FallbackAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackAction::NotifyAdmin => "notify_admin",
            FallbackAction::RegenerateComponent => "regenerate_component",
            FallbackAction::RevertChanges => "revert_changes",
            FallbackAction::EscalateToHuman => "escalate_to_human",
        }
    }
}

impl fmt::Display for FallbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

/// A catalog entry: a workflow shape that is instantiated, never run directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTemplate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    #[serde(default)]
    pub error_handling: ErrorHandlingPolicy,
}

/// Overrides applied when instantiating a template. Every present field
/// replaces the template's value wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowCustomizations {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<StepDefinition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggers: Option<Vec<Trigger>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_handling: Option<ErrorHandlingPolicy>,
}

// ---------------------------------------------------------------------------
// Run status
// ---------------------------------------------------------------------------

/// Overall status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowRunStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Stopped,
}

impl WorkflowRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowRunStatus::Pending => "pending",
            WorkflowRunStatus::Running => "running",
            WorkflowRunStatus::Paused => "paused",
            WorkflowRunStatus::Completed => "completed",
            WorkflowRunStatus::Failed => "failed",
            WorkflowRunStatus::Stopped => "stopped",
        }
    }

    /// Completed, failed and stopped runs never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowRunStatus::Completed | WorkflowRunStatus::Failed | WorkflowRunStatus::Stopped
        )
    }

    /// Allowed moves: pending -> running, running <-> paused,
    /// running -> {completed, failed, stopped}.
    pub fn can_transition_to(&self, next: WorkflowRunStatus) -> bool {
        use WorkflowRunStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Running, Paused)
                | (Paused, Running)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Stopped)
        )
    }
}

impl fmt::Display for WorkflowRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorkflowRunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(WorkflowRunStatus::Pending),
            "running" => Ok(WorkflowRunStatus::Running),
            "paused" => Ok(WorkflowRunStatus::Paused),
            "completed" => Ok(WorkflowRunStatus::Completed),
            "failed" => Ok(WorkflowRunStatus::Failed),
            "stopped" => Ok(WorkflowRunStatus::Stopped),
            other => Err(format!("invalid run status: '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Run records
// ---------------------------------------------------------------------------

/// Output of one successful step invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Step type of the step that produced this result.
    #[serde(rename = "type")]
    pub step_type: StepType,
    /// Registry key of the executor that ran.
    pub tool: String,
    /// Value returned by the executor.
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

/// One timestamped line of a run's log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunLogEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    pub message: String,
}

/// One execution instance of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRun {
    /// UUIDv7 run ID.
    pub id: Uuid,
    /// ID of the workflow definition being executed.
    pub workflow_id: String,
    /// Display name of the workflow (denormalized).
    pub workflow_name: String,
    pub status: WorkflowRunStatus,
    /// Trigger the caller attributed this run to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<TriggerType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Steps that produced a result, in execution order.
    pub executed_steps: Vec<String>,
    /// Steps visited without a result: policy-skipped, disabled or blocked.
    pub skipped_steps: Vec<String>,
    pub results: HashMap<String, StepResult>,
    /// Executor invocations per step, retries and regenerations included.
    pub attempts: HashMap<String, u32>,
    /// Caller-seeded context.
    pub context: Map<String, Value>,
    pub logs: Vec<RunLogEntry>,
    /// Message of the first unhandled error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowRun {
    /// Create a pending run for `definition`.
    pub fn new(
        id: Uuid,
        definition: &WorkflowDefinition,
        context: Map<String, Value>,
        trigger: Option<TriggerType>,
    ) -> Self {
        Self {
            id,
            workflow_id: definition.id.clone(),
            workflow_name: definition.display_name().to_string(),
            status: WorkflowRunStatus::Pending,
            trigger,
            start_time: None,
            end_time: None,
            executed_steps: Vec::new(),
            skipped_steps: Vec::new(),
            results: HashMap::new(),
            attempts: HashMap::new(),
            context,
            logs: Vec::new(),
            error: None,
        }
    }

    /// Append a log line.
    pub fn push_log(&mut self, step_id: Option<&str>, message: impl Into<String>) {
        self.logs.push(RunLogEntry {
            timestamp: Utc::now(),
            step_id: step_id.map(str::to_string),
            message: message.into(),
        });
    }

    /// Store a step's result (overwriting any earlier attempt) and mark it executed.
    pub fn record_result(&mut self, step_id: &str, result: StepResult) {
        self.results.insert(step_id.to_string(), result);
        if !self.has_executed(step_id) {
            self.executed_steps.push(step_id.to_string());
        }
    }

    /// Mark a step as visited without a result.
    pub fn record_skipped(&mut self, step_id: &str) {
        if !self.skipped_steps.iter().any(|s| s == step_id) {
            self.skipped_steps.push(step_id.to_string());
        }
    }

    /// Count one more executor invocation for `step_id`; returns the new total.
    pub fn record_attempt(&mut self, step_id: &str) -> u32 {
        let count = self.attempts.entry(step_id.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn has_executed(&self, step_id: &str) -> bool {
        self.executed_steps.iter().any(|s| s == step_id)
    }

    /// Log messages only, in order.
    pub fn log_messages(&self) -> Vec<&str> {
        self.logs.iter().map(|l| l.message.as_str()).collect()
    }

    /// Wall-clock duration, once the run has ended.
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Run orchestrator.
//!
//! `Orchestrator` validates a workflow, creates its run in the run store and
//! spawns one driver task per run. The driver visits steps in topological
//! order, strictly one at a time, and applies the workflow's error handling
//! policy to every failed invocation. Stop, pause and resume are cooperative
//! and take effect at step boundaries.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use devflow_types::config::EngineConfig;
use devflow_types::event::{WorkflowEvent, WorkflowEventKind};
use devflow_types::workflow::{
    FallbackAction, StepDefinition, StepResult, TriggerType, WorkflowCustomizations,
    WorkflowDefinition, WorkflowRun, WorkflowRunStatus,
};
use serde_json::{Map, Value, json};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::catalog::{CatalogError, TemplateCatalog};
use super::context::StepContext;
use super::dag::execution_order;
use super::definition::{WorkflowError, validate_definition};
use super::retry::{Recovery, RetryHandler};
use super::run_store::{RunSlot, RunStore};
use super::step_runner::{StepError, StepRunner};
use crate::capability::CapabilityRegistry;
use crate::event::EventBus;

// ---------------------------------------------------------------------------
// OrchestratorError
// ---------------------------------------------------------------------------

/// Errors surfaced by the orchestrator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OrchestratorError {
    /// The workflow definition is malformed or structurally invalid.
    #[error("workflow error: {0}")]
    Workflow(String),

    #[error("template not found: {0}")]
    TemplateNotFound(String),

    #[error("workflow run not found: {0}")]
    RunNotFound(Uuid),

    /// An enabled step resolves to a tool that is not registered.
    #[error("step '{step_id}' uses unknown tool '{tool_id}'")]
    ToolNotFound { step_id: String, tool_id: String },

    #[error("step '{step_id}' timed out after {timeout_ms}ms")]
    StepTimeout { step_id: String, timeout_ms: u64 },

    #[error("step '{step_id}' failed: {error}")]
    StepFailed { step_id: String, error: String },

    /// The retry budget was used up and no fallback action was configured.
    #[error("step '{step_id}' failed after {attempts} attempts: {error}")]
    PolicyExhausted {
        step_id: String,
        attempts: u32,
        error: String,
    },

    #[error("run {run_id} cannot move from {from} to {to}")]
    InvalidTransition {
        run_id: Uuid,
        from: WorkflowRunStatus,
        to: WorkflowRunStatus,
    },

    /// The run has not reached a terminal status yet.
    #[error("workflow run {0} is still active")]
    RunActive(Uuid),

    /// The driver task panicked or was aborted.
    #[error("run task failed: {0}")]
    Join(String),
}

impl From<WorkflowError> for OrchestratorError {
    fn from(e: WorkflowError) -> Self {
        OrchestratorError::Workflow(e.to_string())
    }
}

impl From<StepError> for OrchestratorError {
    fn from(e: StepError) -> Self {
        match e {
            StepError::Timeout {
                step_id,
                timeout_ms,
            } => OrchestratorError::StepTimeout {
                step_id,
                timeout_ms,
            },
            StepError::Failed { step_id, error } => OrchestratorError::StepFailed { step_id, error },
            StepError::ToolNotFound { step_id, tool_id } => {
                OrchestratorError::ToolNotFound { step_id, tool_id }
            }
        }
    }
}

impl From<CatalogError> for OrchestratorError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::NotFound(id) => OrchestratorError::TemplateNotFound(id),
            other => OrchestratorError::Workflow(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Start options and run handle
// ---------------------------------------------------------------------------

/// Caller inputs for starting a run.
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Initial context visible to every step as its variables.
    pub context: Map<String, Value>,
    /// Trigger the run is attributed to. Must match an active declared
    /// trigger when the workflow declares any.
    pub trigger: Option<TriggerType>,
}

impl StartOptions {
    pub fn with_context(context: Map<String, Value>) -> Self {
        Self {
            context,
            trigger: None,
        }
    }

    pub fn trigger(mut self, trigger: TriggerType) -> Self {
        self.trigger = Some(trigger);
        self
    }
}

/// Handle to a started run.
#[derive(Debug)]
pub struct RunHandle {
    run_id: Uuid,
    join: JoinHandle<WorkflowRun>,
}

impl RunHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Wait for the run to reach a terminal status and return its final state.
    pub async fn wait(self) -> Result<WorkflowRun, OrchestratorError> {
        self.join
            .await
            .map_err(|e| OrchestratorError::Join(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// How a step visit ended.
enum StepOutcome {
    /// A result was stored.
    Executed,
    /// Skipped by policy. Dependents may still run.
    Skipped,
    /// Handled by a fallback action without a result. Dependents are blocked.
    Handled,
    /// A stop was requested while the step was being handled.
    Stopped,
    /// Unhandled failure. The run fails.
    Failed(OrchestratorError),
}

/// Drives workflow runs against a shared capability registry.
///
/// Cloning is cheap; clones share the same run store and event bus.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    runner: StepRunner,
    event_bus: EventBus,
    config: EngineConfig,
    runs: RunStore,
}

impl Orchestrator {
    pub fn new(registry: Arc<CapabilityRegistry>, event_bus: EventBus, config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                runner: StepRunner::new(registry),
                event_bus,
                config,
                runs: RunStore::new(),
            }),
        }
    }

    /// Orchestrator with its own event bus sized from `config.event_capacity`.
    pub fn with_config(registry: Arc<CapabilityRegistry>, config: EngineConfig) -> Self {
        let event_bus = EventBus::new(config.event_capacity);
        Self::new(registry, event_bus, config)
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        self.inner.runner.registry()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.inner.event_bus
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.inner.event_bus.subscribe()
    }

    /// Validate `workflow`, create its run and spawn the driver.
    ///
    /// All validation happens before the run exists: structural errors,
    /// unknown tools of enabled steps and trigger mismatches are returned
    /// here and no run is created. Must be called within a Tokio runtime.
    pub fn start(
        &self,
        workflow: WorkflowDefinition,
        options: StartOptions,
    ) -> Result<RunHandle, OrchestratorError> {
        validate_definition(&workflow)?;

        if let Some(trigger) = options.trigger {
            if !workflow.triggers.is_empty()
                && !workflow.active_triggers().any(|t| t.trigger_type == trigger)
            {
                return Err(WorkflowError::ValidationError(format!(
                    "workflow '{}' has no active {} trigger",
                    workflow.id,
                    trigger.as_str()
                ))
                .into());
            }
        }

        for step in workflow.steps.iter().filter(|s| s.is_enabled) {
            let tool_id = step.tool_id();
            if !self.registry().contains(tool_id) {
                return Err(OrchestratorError::ToolNotFound {
                    step_id: step.id.clone(),
                    tool_id: tool_id.to_string(),
                });
            }
        }

        let order: Vec<String> = execution_order(&workflow.steps)?
            .into_iter()
            .map(|s| s.id.clone())
            .collect();

        let run_id = Uuid::now_v7();
        let mut run = WorkflowRun::new(run_id, &workflow, options.context, options.trigger);
        run.status = WorkflowRunStatus::Running;
        run.start_time = Some(Utc::now());
        run.push_log(None, format!("Workflow {} started", workflow.display_name()));
        let slot = self.inner.runs.insert(run);

        tracing::info!(
            run_id = %run_id,
            workflow_id = workflow.id.as_str(),
            workflow = workflow.display_name(),
            steps = workflow.steps.len(),
            "starting workflow execution"
        );
        self.inner
            .publish(WorkflowEvent::run(WorkflowEventKind::WorkflowStarted, run_id));

        let inner = Arc::clone(&self.inner);
        let workflow = Arc::new(workflow);
        let join = tokio::spawn(async move {
            let control = Arc::clone(&slot.control);
            let run = inner.drive(workflow, order, slot).await;
            control.finished.cancel();
            run
        });

        Ok(RunHandle { run_id, join })
    }

    /// Start a run and wait for it to finish.
    pub async fn execute(
        &self,
        workflow: WorkflowDefinition,
        options: StartOptions,
    ) -> Result<WorkflowRun, OrchestratorError> {
        self.start(workflow, options)?.wait().await
    }

    /// Instantiate a catalog template and start it.
    pub fn start_template(
        &self,
        catalog: &TemplateCatalog,
        template_id: &str,
        customizations: WorkflowCustomizations,
        options: StartOptions,
    ) -> Result<RunHandle, OrchestratorError> {
        let workflow = catalog.instantiate(template_id, customizations)?;
        self.start(workflow, options)
    }

    /// Request a stop. The in-flight step, if any, finishes and its result
    /// is kept; no further step starts. A paused run is resumed first.
    pub async fn stop(&self, run_id: Uuid) -> Result<(), OrchestratorError> {
        let slot = self.inner.slot(run_id)?;
        {
            let mut run = slot.run.write().await;
            let from = run.status;
            if !matches!(from, WorkflowRunStatus::Running | WorkflowRunStatus::Paused) {
                return Err(OrchestratorError::InvalidTransition {
                    run_id,
                    from,
                    to: WorkflowRunStatus::Stopped,
                });
            }
            enter_terminal(&mut run, WorkflowRunStatus::Stopped);
            run.push_log(None, "Workflow stopped");
        }
        slot.control.cancel.cancel();

        tracing::info!(run_id = %run_id, "workflow stopped");
        self.inner
            .publish(WorkflowEvent::run(WorkflowEventKind::WorkflowStopped, run_id));
        Ok(())
    }

    /// Pause a running run at the next step boundary.
    pub async fn pause(&self, run_id: Uuid) -> Result<(), OrchestratorError> {
        let slot = self.inner.slot(run_id)?;
        {
            let mut run = slot.run.write().await;
            transition(&mut run, WorkflowRunStatus::Paused)?;
            run.push_log(None, "Workflow paused");
        }

        tracing::info!(run_id = %run_id, "workflow paused");
        self.inner
            .publish(WorkflowEvent::run(WorkflowEventKind::WorkflowPaused, run_id));
        Ok(())
    }

    /// Resume a paused run.
    pub async fn resume(&self, run_id: Uuid) -> Result<(), OrchestratorError> {
        let slot = self.inner.slot(run_id)?;
        {
            let mut run = slot.run.write().await;
            transition(&mut run, WorkflowRunStatus::Running)?;
            run.push_log(None, "Workflow resumed");
        }
        slot.control.resume.notify_one();

        tracing::info!(run_id = %run_id, "workflow resumed");
        self.inner
            .publish(WorkflowEvent::run(WorkflowEventKind::WorkflowResumed, run_id));
        Ok(())
    }

    /// Snapshot of one run.
    pub async fn get_run(&self, run_id: Uuid) -> Result<WorkflowRun, OrchestratorError> {
        Ok(self.inner.slot(run_id)?.snapshot().await)
    }

    /// Snapshots of all retained runs, oldest first.
    pub async fn list_runs(&self) -> Vec<WorkflowRun> {
        self.inner.runs.snapshots().await
    }

    pub async fn list_runs_by_status(&self, status: WorkflowRunStatus) -> Vec<WorkflowRun> {
        self.list_runs()
            .await
            .into_iter()
            .filter(|r| r.status == status)
            .collect()
    }

    /// Drop a finished run from the store and return its final state.
    ///
    /// A stopped run stays active until its in-flight step has returned.
    pub async fn release(&self, run_id: Uuid) -> Result<WorkflowRun, OrchestratorError> {
        let slot = self.inner.slot(run_id)?;
        if !slot.control.is_finished() {
            return Err(OrchestratorError::RunActive(run_id));
        }
        let run = slot.snapshot().await;
        if !run.status.is_terminal() {
            return Err(OrchestratorError::RunActive(run_id));
        }
        self.inner.runs.remove(&run_id);
        tracing::debug!(run_id = %run_id, "released workflow run");
        Ok(run)
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("tools", &self.registry().len())
            .field("runs", &self.inner.runs.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Status helpers
// ---------------------------------------------------------------------------

fn transition(run: &mut WorkflowRun, next: WorkflowRunStatus) -> Result<(), OrchestratorError> {
    if !run.status.can_transition_to(next) {
        return Err(OrchestratorError::InvalidTransition {
            run_id: run.id,
            from: run.status,
            to: next,
        });
    }
    run.status = next;
    Ok(())
}

/// Move a run into a terminal status, passing through running when paused.
/// Returns false when the run is already terminal.
fn enter_terminal(run: &mut WorkflowRun, next: WorkflowRunStatus) -> bool {
    if run.status == WorkflowRunStatus::Paused {
        run.status = WorkflowRunStatus::Running;
        run.push_log(None, format!("Workflow {next} while paused"));
    }
    if !run.status.can_transition_to(next) {
        return false;
    }
    run.status = next;
    run.end_time = Some(Utc::now());
    true
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

impl Inner {
    fn publish(&self, event: WorkflowEvent) {
        self.event_bus.publish(event);
    }

    fn slot(&self, run_id: Uuid) -> Result<RunSlot, OrchestratorError> {
        self.runs
            .get(&run_id)
            .ok_or(OrchestratorError::RunNotFound(run_id))
    }

    async fn drive(
        &self,
        workflow: Arc<WorkflowDefinition>,
        order: Vec<String>,
        slot: RunSlot,
    ) -> WorkflowRun {
        // Steps whose dependents may run: executed, policy-skipped or disabled.
        let mut satisfied: HashSet<&str> = HashSet::new();

        for step_id in &order {
            let Some(step) = workflow.step(step_id) else {
                continue;
            };

            if !self.await_boundary(&slot).await {
                return slot.snapshot().await;
            }

            if !step.is_enabled {
                let mut run = slot.run.write().await;
                run.record_skipped(&step.id);
                run.push_log(Some(&step.id), format!("Skipping disabled step {}", step.id));
                satisfied.insert(step.id.as_str());
                continue;
            }

            if let Some(missing) = step
                .dependencies
                .iter()
                .find(|d| !satisfied.contains(d.as_str()))
            {
                tracing::info!(
                    run_id = %slot.id,
                    step_id = step.id.as_str(),
                    dependency = missing.as_str(),
                    "skipping step with unmet dependency"
                );
                let mut run = slot.run.write().await;
                run.record_skipped(&step.id);
                run.push_log(
                    Some(&step.id),
                    format!("Skipping step {} - dependencies not met", step.id),
                );
                continue;
            }

            match self.run_step(&workflow, step, &slot).await {
                StepOutcome::Executed | StepOutcome::Skipped => {
                    satisfied.insert(step.id.as_str());
                }
                StepOutcome::Handled => {}
                StepOutcome::Stopped => return slot.snapshot().await,
                StepOutcome::Failed(error) => {
                    self.fail_run(&slot, &error).await;
                    return slot.snapshot().await;
                }
            }
        }

        if self.await_boundary(&slot).await {
            self.complete_run(&slot).await;
        }
        slot.snapshot().await
    }

    /// Park while the run is paused. Returns false once the run must not
    /// start another step.
    async fn await_boundary(&self, slot: &RunSlot) -> bool {
        loop {
            if slot.control.stop_requested() {
                return false;
            }
            match slot.status().await {
                WorkflowRunStatus::Running => return true,
                WorkflowRunStatus::Paused => {
                    tracing::debug!(run_id = %slot.id, "run parked at step boundary");
                    tokio::select! {
                        _ = slot.control.resume.notified() => {}
                        _ = slot.control.cancel.cancelled() => return false,
                    }
                }
                _ => return false,
            }
        }
    }

    async fn run_step(
        &self,
        workflow: &WorkflowDefinition,
        step: &StepDefinition,
        slot: &RunSlot,
    ) -> StepOutcome {
        let (tool_id, parameters) = StepRunner::prepare(step);

        slot.run.write().await.push_log(
            Some(&step.id),
            format!("Executing step {} with {}", step.display_name(), tool_id),
        );
        tracing::info!(
            run_id = %slot.id,
            step_id = step.id.as_str(),
            tool_id = tool_id.as_str(),
            "executing step"
        );
        self.publish(
            WorkflowEvent::step(WorkflowEventKind::WorkflowStepStarted, slot.id, &step.id)
                .with_detail(json!({ "tool": tool_id })),
        );

        match self
            .invoke(workflow, step, &tool_id, parameters.clone(), slot)
            .await
        {
            Ok(payload) => {
                self.record_success(step, &tool_id, payload, slot).await;
                StepOutcome::Executed
            }
            Err(error) => {
                self.handle_failure(workflow, step, &tool_id, &parameters, error, slot)
                    .await
            }
        }
    }

    async fn handle_failure(
        &self,
        workflow: &WorkflowDefinition,
        step: &StepDefinition,
        tool_id: &str,
        parameters: &Map<String, Value>,
        error: StepError,
        slot: &RunSlot,
    ) -> StepOutcome {
        self.report_error(workflow, step, &error, slot).await;
        if slot.control.stop_requested() {
            return StepOutcome::Stopped;
        }

        match RetryHandler::recovery_for(&workflow.error_handling) {
            Recovery::Stop => StepOutcome::Failed(error.into()),
            Recovery::Skip => {
                let mut run = slot.run.write().await;
                run.record_skipped(&step.id);
                run.push_log(Some(&step.id), format!("Skipping failed step {}", step.id));
                tracing::info!(run_id = %slot.id, step_id = step.id.as_str(), "skipping failed step");
                StepOutcome::Skipped
            }
            Recovery::Retry => {
                self.retry_step(workflow, step, tool_id, parameters, error, slot)
                    .await
            }
            Recovery::Fallback(action) => {
                self.run_fallback(action, workflow, step, tool_id, parameters, slot)
                    .await
            }
        }
    }

    async fn retry_step(
        &self,
        workflow: &WorkflowDefinition,
        step: &StepDefinition,
        tool_id: &str,
        parameters: &Map<String, Value>,
        error: StepError,
        slot: &RunSlot,
    ) -> StepOutcome {
        let mut remaining = step.retry_count;
        let mut retry = 0u32;
        let mut last_error = error;

        while RetryHandler::should_retry(remaining, slot.control.stop_requested()) {
            remaining -= 1;
            retry += 1;
            let delay = RetryHandler::backoff_delay(&self.config.retry_backoff, retry);

            slot.run.write().await.push_log(
                Some(&step.id),
                format!("Retrying step {} ({} retries left)", step.id, remaining),
            );
            tracing::info!(
                run_id = %slot.id,
                step_id = step.id.as_str(),
                retry,
                remaining,
                delay_ms = delay.as_millis() as u64,
                "retrying step"
            );

            if !self.sleep_unless_stopped(delay, slot).await {
                return StepOutcome::Stopped;
            }
            // A retry is a new dispatch: honour a pause requested meanwhile.
            if !self.await_boundary(slot).await {
                return StepOutcome::Stopped;
            }

            match self
                .invoke(workflow, step, tool_id, parameters.clone(), slot)
                .await
            {
                Ok(payload) => {
                    self.record_success(step, tool_id, payload, slot).await;
                    return StepOutcome::Executed;
                }
                Err(e) => {
                    self.report_error(workflow, step, &e, slot).await;
                    last_error = e;
                }
            }
        }

        if slot.control.stop_requested() {
            return StepOutcome::Stopped;
        }

        match RetryHandler::after_exhaustion(&workflow.error_handling) {
            Recovery::Fallback(action) => {
                self.run_fallback(action, workflow, step, tool_id, parameters, slot)
                    .await
            }
            _ => {
                let attempts = slot
                    .run
                    .read()
                    .await
                    .attempts
                    .get(&step.id)
                    .copied()
                    .unwrap_or(0);
                StepOutcome::Failed(OrchestratorError::PolicyExhausted {
                    step_id: step.id.clone(),
                    attempts,
                    error: last_error.detail(),
                })
            }
        }
    }

    async fn run_fallback(
        &self,
        action: FallbackAction,
        workflow: &WorkflowDefinition,
        step: &StepDefinition,
        tool_id: &str,
        parameters: &Map<String, Value>,
        slot: &RunSlot,
    ) -> StepOutcome {
        slot.run.write().await.push_log(
            Some(&step.id),
            format!("Executing fallback action {} for step {}", action, step.id),
        );
        tracing::info!(
            run_id = %slot.id,
            step_id = step.id.as_str(),
            action = action.as_str(),
            "executing fallback action"
        );

        let event = |kind: WorkflowEventKind| {
            WorkflowEvent::step(kind, slot.id, &step.id).with_detail(json!({ "action": action }))
        };

        match action {
            FallbackAction::NotifyAdmin => {
                self.publish(event(WorkflowEventKind::WorkflowNotification))
            }
            FallbackAction::RevertChanges => self.publish(event(WorkflowEventKind::WorkflowRevert)),
            FallbackAction::EscalateToHuman => {
                self.publish(event(WorkflowEventKind::WorkflowEscalation))
            }
            FallbackAction::RegenerateComponent => {
                if !self.await_boundary(slot).await {
                    return StepOutcome::Stopped;
                }
                let params = RetryHandler::regenerate_parameters(parameters);
                match self.invoke(workflow, step, tool_id, params, slot).await {
                    Ok(payload) => {
                        self.record_success(step, tool_id, payload, slot).await;
                        return StepOutcome::Executed;
                    }
                    Err(e) => {
                        self.report_error(workflow, step, &e, slot).await;
                        slot.run.write().await.push_log(
                            Some(&step.id),
                            format!("Regeneration of step {} failed", step.id),
                        );
                    }
                }
            }
        }

        StepOutcome::Handled
    }

    /// One executor invocation with a fresh context snapshot.
    async fn invoke(
        &self,
        workflow: &WorkflowDefinition,
        step: &StepDefinition,
        tool_id: &str,
        parameters: Map<String, Value>,
        slot: &RunSlot,
    ) -> Result<Value, StepError> {
        let context = {
            let mut run = slot.run.write().await;
            run.record_attempt(&step.id);
            StepContext::new(
                run.id,
                workflow.id.clone(),
                step,
                run.context.clone(),
                run.results.clone(),
            )
        };
        self.runner.run(step, tool_id, parameters, &context).await
    }

    async fn record_success(
        &self,
        step: &StepDefinition,
        tool_id: &str,
        payload: Value,
        slot: &RunSlot,
    ) {
        let result = StepResult {
            step_type: step.step_type,
            tool: tool_id.to_string(),
            payload: payload.clone(),
            timestamp: Utc::now(),
        };
        {
            let mut run = slot.run.write().await;
            run.record_result(&step.id, result);
            run.push_log(Some(&step.id), format!("Step {} completed", step.id));
        }
        tracing::info!(run_id = %slot.id, step_id = step.id.as_str(), "step completed");
        self.publish(
            WorkflowEvent::step(WorkflowEventKind::WorkflowStepCompleted, slot.id, &step.id)
                .with_detail(payload),
        );
    }

    /// Log an intercepted error and publish it.
    async fn report_error(
        &self,
        workflow: &WorkflowDefinition,
        step: &StepDefinition,
        error: &StepError,
        slot: &RunSlot,
    ) {
        let message = error.to_string();
        slot.run
            .write()
            .await
            .push_log(Some(&step.id), format!("Error: {message}"));
        tracing::warn!(
            run_id = %slot.id,
            step_id = step.id.as_str(),
            error = %message,
            "step failed"
        );

        self.publish(
            WorkflowEvent::step(WorkflowEventKind::WorkflowError, slot.id, &step.id)
                .with_error(message.clone()),
        );
        if workflow.error_handling.notification_on_error {
            self.publish(
                WorkflowEvent::step(WorkflowEventKind::WorkflowNotification, slot.id, &step.id)
                    .with_error(message),
            );
        }
    }

    /// Sleep for `delay` unless a stop arrives first. Returns false on stop.
    async fn sleep_unless_stopped(&self, delay: Duration, slot: &RunSlot) -> bool {
        if delay.is_zero() {
            return !slot.control.stop_requested();
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = slot.control.cancel.cancelled() => false,
        }
    }

    async fn fail_run(&self, slot: &RunSlot, error: &OrchestratorError) {
        let message = error.to_string();
        {
            let mut run = slot.run.write().await;
            if !enter_terminal(&mut run, WorkflowRunStatus::Failed) {
                return;
            }
            if run.error.is_none() {
                run.error = Some(message.clone());
            }
            run.push_log(None, format!("Workflow failed: {message}"));
        }
        tracing::error!(run_id = %slot.id, error = %message, "workflow failed");
        self.publish(
            WorkflowEvent::run(WorkflowEventKind::WorkflowFailed, slot.id).with_error(message),
        );
    }

    async fn complete_run(&self, slot: &RunSlot) {
        let (executed, duration_ms) = {
            let mut run = slot.run.write().await;
            if !enter_terminal(&mut run, WorkflowRunStatus::Completed) {
                return;
            }
            run.push_log(None, "Workflow completed");
            (run.executed_steps.len(), run.duration_ms())
        };
        tracing::info!(
            run_id = %slot.id,
            executed,
            duration_ms,
            "workflow completed"
        );
        self.publish(WorkflowEvent::run(
            WorkflowEventKind::WorkflowCompleted,
            slot.id,
        ));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

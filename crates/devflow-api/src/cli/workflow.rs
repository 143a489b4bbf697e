//! Workflow validation and execution commands.

use std::path::Path;

use anyhow::{Context, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use console::style;
use devflow_core::workflow::StartOptions;
use devflow_core::workflow::dag::execution_order;
use devflow_core::workflow::definition::load_workflow_file;
use devflow_types::event::{WorkflowEvent, WorkflowEventKind};
use devflow_types::workflow::{
    StepDefinition, WorkflowCustomizations, WorkflowDefinition, WorkflowRun, WorkflowRunStatus,
};
use serde_json::{Map, Value};
use tokio::sync::broadcast::error::RecvError;

use super::RunArgs;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

/// Parse and validate a workflow document, then check every enabled step
/// resolves to a registered tool.
pub fn validate_workflow(state: &AppState, file: &Path, json: bool) -> anyhow::Result<()> {
    let definition = load_workflow_file(file)
        .with_context(|| format!("invalid workflow document {}", file.display()))?;
    let order = execution_order(&definition.steps)?;

    let registry = state.orchestrator.registry();
    let missing: Vec<(&str, &str)> = definition
        .steps
        .iter()
        .filter(|s| s.is_enabled && !registry.contains(s.tool_id()))
        .map(|s| (s.id.as_str(), s.tool_id()))
        .collect();

    if json {
        let report = serde_json::json!({
            "valid": missing.is_empty(),
            "id": definition.id,
            "name": definition.display_name(),
            "steps": definition.steps.len(),
            "executionOrder": order.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
            "missingTools": missing
                .iter()
                .map(|(step, tool)| serde_json::json!({ "step": step, "tool": tool }))
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("#").fg(Color::Cyan),
                Cell::new("Step").fg(Color::Cyan),
                Cell::new("Type").fg(Color::Cyan),
                Cell::new("Tool").fg(Color::Cyan),
                Cell::new("Depends on").fg(Color::Cyan),
            ]);
        for (i, step) in order.iter().enumerate() {
            let tool = if !step.is_enabled {
                Cell::new("(disabled)").fg(Color::DarkGrey)
            } else if registry.contains(step.tool_id()) {
                Cell::new(step.tool_id())
            } else {
                Cell::new(step.tool_id()).fg(Color::Red)
            };
            table.add_row(vec![
                Cell::new(i + 1),
                Cell::new(&step.id),
                Cell::new(step.step_type.as_str()),
                tool,
                Cell::new(if step.dependencies.is_empty() {
                    "-".to_string()
                } else {
                    step.dependencies.join(", ")
                }),
            ]);
        }

        println!();
        println!(
            "  {} ({})",
            style(definition.display_name()).bold(),
            style(&definition.id).dim()
        );
        println!();
        println!("{table}");
        println!();
    }

    if !missing.is_empty() {
        let list: Vec<String> = missing
            .iter()
            .map(|(step, tool)| format!("{step} -> {tool}"))
            .collect();
        bail!("no registered tool for: {}", list.join(", "));
    }

    if !json {
        println!(
            "{} Workflow is valid ({} steps)",
            style("✓").green().bold(),
            definition.steps.len()
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

/// Run a workflow from a file or template and wait for it to finish.
///
/// Streams step events to stdout unless `json` is set. Ctrl-C stops the
/// run; the step in flight finishes and its result is kept. A run that
/// ends `failed` makes the command fail.
pub async fn run_workflow(state: &AppState, args: RunArgs, json: bool) -> anyhow::Result<()> {
    let definition = load_definition(state, &args)?;
    let context = parse_context(args.context.as_deref())?;
    let steps = definition.steps.clone();

    let mut options = StartOptions::with_context(context);
    if let Some(trigger) = args.trigger {
        options = options.trigger(trigger.into());
    }

    let mut events = state.orchestrator.subscribe();
    let handle = state.orchestrator.start(definition, options)?;
    let run_id = handle.run_id();

    if !json {
        println!();
        println!(
            "  {} run {}",
            style("▶").cyan().bold(),
            style(run_id).dim()
        );
    }

    let mut wait = std::pin::pin!(handle.wait());
    let mut events_open = true;
    let mut stop_requested = false;

    let run = loop {
        tokio::select! {
            result = &mut wait => break result?,
            event = events.recv(), if events_open => match event {
                Ok(event) if event.run_id == run_id && !json => print_event(&event),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event stream lagged, some events were not shown");
                }
                Err(RecvError::Closed) => events_open = false,
            },
            signal = tokio::signal::ctrl_c(), if !stop_requested => {
                signal.context("failed to listen for ctrl-c")?;
                stop_requested = true;
                if !json {
                    println!("  {} stopping after the current step...", style("■").yellow());
                }
                if let Err(e) = state.orchestrator.stop(run_id).await {
                    tracing::debug!(%run_id, error = %e, "stop request ignored");
                }
            }
        }
    };

    // Events published just before the driver returned.
    while let Ok(event) = events.try_recv() {
        if event.run_id == run_id && !json {
            print_event(&event);
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        display_run(&run, &steps);
    }

    if run.status == WorkflowRunStatus::Failed {
        bail!(
            "workflow '{}' failed: {}",
            run.workflow_name,
            run.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn load_definition(state: &AppState, args: &RunArgs) -> anyhow::Result<WorkflowDefinition> {
    match (&args.file, &args.template) {
        (Some(file), _) => load_workflow_file(file)
            .with_context(|| format!("invalid workflow document {}", file.display())),
        (None, Some(template)) => Ok(state.catalog.instantiate(
            template,
            WorkflowCustomizations {
                name: args.name.clone(),
                ..Default::default()
            },
        )?),
        (None, None) => bail!("pass a workflow file or --template"),
    }
}

/// Parse `--context`, which must be a JSON object.
fn parse_context(raw: Option<&str>) -> anyhow::Result<Map<String, Value>> {
    let Some(raw) = raw else {
        return Ok(Map::new());
    };
    match serde_json::from_str::<Value>(raw).context("--context is not valid JSON")? {
        Value::Object(map) => Ok(map),
        other => bail!("--context must be a JSON object, got {other}"),
    }
}

// ---------------------------------------------------------------------------
// Display helpers
// ---------------------------------------------------------------------------

fn print_event(event: &WorkflowEvent) {
    let step = event.step_id.as_deref().unwrap_or("");
    match event.kind {
        WorkflowEventKind::WorkflowStepStarted => {
            println!("  {} {}", style("→").dim(), step);
        }
        WorkflowEventKind::WorkflowStepCompleted => {
            println!("  {} {}", style("✓").green(), step);
        }
        WorkflowEventKind::WorkflowError => {
            println!(
                "  {} {} {}",
                style("✗").red(),
                step,
                style(event.error.as_deref().unwrap_or("")).red()
            );
        }
        WorkflowEventKind::WorkflowNotification
        | WorkflowEventKind::WorkflowRevert
        | WorkflowEventKind::WorkflowEscalation => {
            println!(
                "  {} {} {}",
                style("!").yellow(),
                style(event.kind.as_str()).yellow(),
                step
            );
        }
        WorkflowEventKind::WorkflowPaused | WorkflowEventKind::WorkflowResumed => {
            println!("  {} {}", style("·").dim(), event.kind.as_str());
        }
        // Run-level outcome is shown by the summary.
        WorkflowEventKind::WorkflowStarted
        | WorkflowEventKind::WorkflowStopped
        | WorkflowEventKind::WorkflowCompleted
        | WorkflowEventKind::WorkflowFailed => {}
    }
}

/// Per-step outcome as shown in the summary table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepState {
    Executed,
    Skipped,
    Disabled,
    NotRun,
}

fn step_state(step: &StepDefinition, run: &WorkflowRun) -> StepState {
    if run.has_executed(&step.id) {
        StepState::Executed
    } else if !step.is_enabled {
        StepState::Disabled
    } else if run.skipped_steps.iter().any(|s| s == &step.id) {
        StepState::Skipped
    } else {
        StepState::NotRun
    }
}

fn format_step_state(state: StepState) -> Cell {
    match state {
        StepState::Executed => Cell::new("executed").fg(Color::Green),
        StepState::Skipped => Cell::new("skipped").fg(Color::Yellow),
        StepState::Disabled => Cell::new("disabled").fg(Color::DarkGrey),
        StepState::NotRun => Cell::new("not run").fg(Color::DarkGrey),
    }
}

fn format_status(status: WorkflowRunStatus) -> Cell {
    match status {
        WorkflowRunStatus::Pending => Cell::new("pending").fg(Color::Yellow),
        WorkflowRunStatus::Running => Cell::new("running").fg(Color::Blue),
        WorkflowRunStatus::Paused => Cell::new("paused").fg(Color::Magenta),
        WorkflowRunStatus::Completed => Cell::new("completed").fg(Color::Green),
        WorkflowRunStatus::Failed => Cell::new("failed").fg(Color::Red),
        WorkflowRunStatus::Stopped => Cell::new("stopped").fg(Color::DarkYellow),
    }
}

fn display_run(run: &WorkflowRun, steps: &[StepDefinition]) {
    let mut summary = Table::new();
    summary
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);
    summary.add_row(vec![Cell::new("Run ID").fg(Color::Cyan), Cell::new(run.id)]);
    summary.add_row(vec![
        Cell::new("Workflow").fg(Color::Cyan),
        Cell::new(format!("{} ({})", run.workflow_name, run.workflow_id)),
    ]);
    summary.add_row(vec![
        Cell::new("Status").fg(Color::Cyan),
        format_status(run.status),
    ]);
    if let Some(trigger) = run.trigger {
        summary.add_row(vec![
            Cell::new("Trigger").fg(Color::Cyan),
            Cell::new(trigger.as_str()),
        ]);
    }
    if let Some(ms) = run.duration_ms() {
        summary.add_row(vec![
            Cell::new("Duration").fg(Color::Cyan),
            Cell::new(format!("{:.2}s", ms as f64 / 1000.0)),
        ]);
    }
    if let Some(ref error) = run.error {
        summary.add_row(vec![
            Cell::new("Error").fg(Color::Cyan),
            Cell::new(error).fg(Color::Red),
        ]);
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Step").fg(Color::Cyan),
            Cell::new("Type").fg(Color::Cyan),
            Cell::new("Tool").fg(Color::Cyan),
            Cell::new("Status").fg(Color::Cyan),
            Cell::new("Attempts").fg(Color::Cyan),
        ]);
    for step in steps {
        let tool = run
            .results
            .get(&step.id)
            .map(|r| r.tool.as_str())
            .unwrap_or_else(|| step.tool_id());
        table.add_row(vec![
            Cell::new(&step.id),
            Cell::new(step.step_type.as_str()),
            Cell::new(tool),
            format_step_state(step_state(step, run)),
            Cell::new(run.attempts.get(&step.id).copied().unwrap_or(0)),
        ]);
    }

    println!();
    println!("{summary}");
    println!();
    println!("{table}");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::TriggerArg;
    use devflow_types::workflow::StepType;
    use tempfile::TempDir;

    async fn state_in(tmp: &TempDir) -> AppState {
        AppState::init(tmp.path().join("data")).await.unwrap()
    }

    fn run_args(file: &Path) -> RunArgs {
        RunArgs {
            file: Some(file.to_path_buf()),
            template: None,
            name: None,
            context: None,
            trigger: None,
        }
    }

    #[test]
    fn context_must_be_an_object() {
        assert!(parse_context(None).unwrap().is_empty());
        let map = parse_context(Some(r#"{"project":"demo"}"#)).unwrap();
        assert_eq!(map["project"], "demo");
        assert!(parse_context(Some("[1,2]")).is_err());
        assert!(parse_context(Some("{nope")).is_err());
    }

    #[test]
    fn step_state_prefers_recorded_outcome() {
        let definition = WorkflowDefinition {
            id: "wf".into(),
            name: "wf".into(),
            description: None,
            steps: vec![
                StepDefinition::new("a", StepType::Custom),
                StepDefinition::new("b", StepType::Custom),
                StepDefinition {
                    is_enabled: false,
                    ..StepDefinition::new("c", StepType::Custom)
                },
                StepDefinition::new("d", StepType::Custom),
            ],
            triggers: vec![],
            error_handling: Default::default(),
        };
        let mut run = WorkflowRun::new(uuid::Uuid::now_v7(), &definition, Map::new(), None);
        run.executed_steps.push("a".into());
        run.record_skipped("b");
        run.record_skipped("c");

        let states: Vec<_> = definition
            .steps
            .iter()
            .map(|s| step_state(s, &run))
            .collect();
        assert_eq!(
            states,
            vec![
                StepState::Executed,
                StepState::Skipped,
                StepState::Disabled,
                StepState::NotRun
            ]
        );
    }

    #[tokio::test]
    async fn validate_accepts_known_tools_and_rejects_unknown() {
        let tmp = TempDir::new().unwrap();
        let state = state_in(&tmp).await;

        let good = tmp.path().join("good.yaml");
        std::fs::write(
            &good,
            "name: Good\nsteps:\n  - id: write\n    type: file_operation\n  - id: commit\n    type: git_operation\n    dependencies: [write]\n",
        )
        .unwrap();
        validate_workflow(&state, &good, true).unwrap();

        let bad = tmp.path().join("bad.yaml");
        std::fs::write(
            &bad,
            "name: Bad\nsteps:\n  - id: x\n    type: custom\n    parameters:\n      tool: nonexistent_tool\n",
        )
        .unwrap();
        let err = validate_workflow(&state, &bad, true).unwrap_err();
        assert!(err.to_string().contains("nonexistent_tool"));
    }

    #[tokio::test]
    async fn run_executes_file_steps_in_workspace() {
        let tmp = TempDir::new().unwrap();
        let state = state_in(&tmp).await;

        let file = tmp.path().join("flow.yaml");
        std::fs::write(
            &file,
            r#"
name: Write notes
steps:
  - id: mkdir
    type: file_operation
    parameters:
      operation: mkdir
      path: notes
  - id: write
    type: file_operation
    dependencies: [mkdir]
    parameters:
      operation: write
      path: notes/todo.txt
      content: ship it
triggers:
  - type: manual
"#,
        )
        .unwrap();

        let mut args = run_args(&file);
        args.trigger = Some(TriggerArg::Manual);
        run_workflow(&state, args, true).await.unwrap();

        let written = std::fs::read_to_string(state.workspace_dir.join("notes/todo.txt")).unwrap();
        assert_eq!(written, "ship it");
    }

    #[tokio::test]
    async fn failed_run_fails_the_command() {
        let tmp = TempDir::new().unwrap();
        let state = state_in(&tmp).await;

        let file = tmp.path().join("flow.json");
        std::fs::write(
            &file,
            r#"{"name":"Broken","steps":[{"id":"read","type":"file_operation","parameters":{"operation":"read","path":"missing.txt"}}]}"#,
        )
        .unwrap();

        let err = run_workflow(&state, run_args(&file), true).await.unwrap_err();
        assert!(err.to_string().contains("Broken"), "got: {err}");
    }

    #[tokio::test]
    async fn run_template_with_renamed_workflow() {
        let tmp = TempDir::new().unwrap();
        let state = state_in(&tmp).await;
        let args = RunArgs {
            file: None,
            template: Some("ai_assistant_complete".into()),
            name: Some("Renamed".into()),
            context: Some(r#"{"prompt":"build a todo app"}"#.into()),
            trigger: None,
        };
        let definition = load_definition(&state, &args).unwrap();
        assert_eq!(definition.name, "Renamed");
        assert!(!definition.steps.is_empty());
    }
}

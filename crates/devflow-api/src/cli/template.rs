//! Template catalog commands.

use std::path::Path;

use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use console::style;
use devflow_core::workflow::definition::{save_workflow_file, serialize_workflow_yaml};
use devflow_types::workflow::{WorkflowCustomizations, WorkflowTemplate};

use crate::state::AppState;

/// List the built-in templates.
pub fn list_templates(state: &AppState, json: bool) -> anyhow::Result<()> {
    let templates = state.catalog.list_templates();

    if json {
        println!("{}", serde_json::to_string_pretty(&templates)?);
        return Ok(());
    }

    if templates.is_empty() {
        println!("No templates available.");
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("ID").fg(Color::Cyan),
            Cell::new("Name").fg(Color::Cyan),
            Cell::new("Steps").fg(Color::Cyan),
            Cell::new("Triggers").fg(Color::Cyan),
            Cell::new("On error").fg(Color::Cyan),
        ]);

    for template in &templates {
        table.add_row(vec![
            Cell::new(&template.id),
            Cell::new(&template.name),
            Cell::new(template.steps.len()),
            Cell::new(trigger_summary(template)),
            Cell::new(template.error_handling.strategy.as_str()),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} Export one with {}",
        style("tip:").dim(),
        style("devflow template <id> --output flow.yaml").cyan()
    );

    Ok(())
}

/// Export a template as a standalone workflow document.
///
/// The exported workflow keeps the template ID so repeated exports are
/// identical.
pub fn export_template(
    state: &AppState,
    id: &str,
    output: Option<&Path>,
    json: bool,
) -> anyhow::Result<()> {
    let definition = state.catalog.instantiate(
        id,
        WorkflowCustomizations {
            id: Some(id.to_string()),
            ..Default::default()
        },
    )?;

    match output {
        Some(path) => {
            save_workflow_file(path, &definition)?;
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "template": id, "path": path.display().to_string() })
                );
            } else {
                println!(
                    "{} Exported {} to {}",
                    style("✓").green().bold(),
                    style(&definition.name).cyan(),
                    path.display()
                );
            }
        }
        None if json => println!("{}", serde_json::to_string_pretty(&definition)?),
        None => print!("{}", serialize_workflow_yaml(&definition)?),
    }

    Ok(())
}

fn trigger_summary(template: &WorkflowTemplate) -> String {
    let active: Vec<&str> = template
        .triggers
        .iter()
        .filter(|t| t.is_active)
        .map(|t| t.trigger_type.as_str())
        .collect();
    if active.is_empty() {
        "-".to_string()
    } else {
        active.join(", ")
    }
}

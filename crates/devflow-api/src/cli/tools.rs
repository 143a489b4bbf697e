//! Tool registry listing.

use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use devflow_core::capability::ToolDescriptor;

use crate::state::AppState;

/// List registered tools, optionally filtered by category name.
pub fn list_tools(state: &AppState, category: Option<&str>, json: bool) -> anyhow::Result<()> {
    let tools = filter_tools(state.orchestrator.registry().list_tools(), category);

    if json {
        let entries: Vec<_> = tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "id": t.id,
                    "name": t.spec.name,
                    "type": t.spec.tool_type,
                    "category": t.spec.category,
                    "description": t.spec.description,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if tools.is_empty() {
        match category {
            Some(category) => println!("No tools in category '{category}'."),
            None => println!("No tools registered."),
        }
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("ID").fg(Color::Cyan),
            Cell::new("Name").fg(Color::Cyan),
            Cell::new("Category").fg(Color::Cyan),
            Cell::new("Type").fg(Color::Cyan),
            Cell::new("Description").fg(Color::Cyan),
        ]);

    for tool in &tools {
        let kind = if tool.spec.tool_type == "builtin" {
            Cell::new(&tool.spec.tool_type).fg(Color::Green)
        } else {
            Cell::new(&tool.spec.tool_type).fg(Color::DarkGrey)
        };
        table.add_row(vec![
            Cell::new(&tool.id),
            Cell::new(&tool.spec.name),
            Cell::new(tool.spec.category.as_str()),
            kind,
            Cell::new(&tool.spec.description),
        ]);
    }

    println!();
    println!("{table}");

    Ok(())
}

fn filter_tools<'a>(
    tools: Vec<&'a ToolDescriptor>,
    category: Option<&str>,
) -> Vec<&'a ToolDescriptor> {
    match category {
        Some(category) => tools
            .into_iter()
            .filter(|t| t.spec.category.as_str().eq_ignore_ascii_case(category))
            .collect(),
        None => tools,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn category_filter_matches_case_insensitively() {
        let tmp = TempDir::new().unwrap();
        let state = AppState::init(tmp.path().join("data")).await.unwrap();
        let all = state.orchestrator.registry().list_tools();

        let git = filter_tools(all.clone(), Some("GIT"));
        assert!(!git.is_empty());
        assert!(git.iter().all(|t| t.spec.category.as_str() == "git"));
        assert!(git.iter().any(|t| t.id == "git_operation"));

        assert!(filter_tools(all.clone(), Some("nope")).is_empty());
        assert_eq!(filter_tools(all.clone(), None).len(), all.len());
    }
}

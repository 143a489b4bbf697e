//! Placeholder executors.
//!
//! These tools stand in for integrations devflow does not ship (LLM
//! providers, deployment targets, test runners, databases and the
//! assistant-specific tools used by the built-in templates). They validate
//! their parameters the way a real integration would and return a
//! deterministic payload marked `"simulated": true`.

use devflow_core::capability::{StepExecutor, ToolCategory, ToolError, ToolSpec};
use devflow_core::workflow::StepContext;
use serde_json::{Map, Value, json};

use super::{optional_str, required_str};

const DEFAULT_MODEL: &str = "gpt-4";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatedTool {
    AiGeneration,
    CodeAnalysis,
    Deployment,
    Testing,
    DatabaseOperation,
    Monitoring,
    CapyCodeGeneration,
    CapyIssueTriage,
    CapyVmExecution,
    SameUiGeneration,
    SameDesignSystem,
    SameResponsiveDesign,
    KiloTaskManagement,
    KiloProjectPlanning,
    KiloProgressTracking,
    ClineCodeEditing,
    ClineCodeReview,
    ClineRefactoring,
    AssistantCodeAnalysis,
    AssistantDocumentation,
    AssistantDebugging,
}

impl SimulatedTool {
    pub const ALL: &'static [SimulatedTool] = &[
        SimulatedTool::AiGeneration,
        SimulatedTool::CodeAnalysis,
        SimulatedTool::Deployment,
        SimulatedTool::Testing,
        SimulatedTool::DatabaseOperation,
        SimulatedTool::Monitoring,
        SimulatedTool::CapyCodeGeneration,
        SimulatedTool::CapyIssueTriage,
        SimulatedTool::CapyVmExecution,
        SimulatedTool::SameUiGeneration,
        SimulatedTool::SameDesignSystem,
        SimulatedTool::SameResponsiveDesign,
        SimulatedTool::KiloTaskManagement,
        SimulatedTool::KiloProjectPlanning,
        SimulatedTool::KiloProgressTracking,
        SimulatedTool::ClineCodeEditing,
        SimulatedTool::ClineCodeReview,
        SimulatedTool::ClineRefactoring,
        SimulatedTool::AssistantCodeAnalysis,
        SimulatedTool::AssistantDocumentation,
        SimulatedTool::AssistantDebugging,
    ];

    /// Registry key.
    pub fn tool_id(&self) -> &'static str {
        match self {
            SimulatedTool::AiGeneration => "ai_generation",
            SimulatedTool::CodeAnalysis => "code_analysis",
            SimulatedTool::Deployment => "deployment",
            SimulatedTool::Testing => "testing",
            SimulatedTool::DatabaseOperation => "database_operation",
            SimulatedTool::Monitoring => "monitoring",
            SimulatedTool::CapyCodeGeneration => "capy_code_generation",
            SimulatedTool::CapyIssueTriage => "capy_issue_triage",
            SimulatedTool::CapyVmExecution => "capy_vm_execution",
            SimulatedTool::SameUiGeneration => "same_ui_generation",
            SimulatedTool::SameDesignSystem => "same_design_system",
            SimulatedTool::SameResponsiveDesign => "same_responsive_design",
            SimulatedTool::KiloTaskManagement => "kilo_task_management",
            SimulatedTool::KiloProjectPlanning => "kilo_project_planning",
            SimulatedTool::KiloProgressTracking => "kilo_progress_tracking",
            SimulatedTool::ClineCodeEditing => "cline_code_editing",
            SimulatedTool::ClineCodeReview => "cline_code_review",
            SimulatedTool::ClineRefactoring => "cline_refactoring",
            SimulatedTool::AssistantCodeAnalysis => "assistant_code_analysis",
            SimulatedTool::AssistantDocumentation => "assistant_documentation",
            SimulatedTool::AssistantDebugging => "assistant_debugging",
        }
    }

    pub fn spec(&self) -> ToolSpec {
        let (name, category, description) = match self {
            SimulatedTool::AiGeneration => (
                "AI Generation",
                ToolCategory::AiGeneration,
                "Render a prompt from the run context and generate a response",
            ),
            SimulatedTool::CodeAnalysis => (
                "Code Analysis",
                ToolCategory::CodeAnalysis,
                "Static analysis summary for a code base",
            ),
            SimulatedTool::Deployment => (
                "Deployment",
                ToolCategory::Deployment,
                "Deploy to a hosting provider",
            ),
            SimulatedTool::Testing => ("Testing", ToolCategory::Testing, "Run a test suite"),
            SimulatedTool::DatabaseOperation => (
                "Database Operation",
                ToolCategory::Database,
                "Run a database operation",
            ),
            SimulatedTool::Monitoring => (
                "Monitoring",
                ToolCategory::Monitoring,
                "Collect service health metrics",
            ),
            SimulatedTool::CapyCodeGeneration => (
                "Capy Code Generation",
                ToolCategory::AiGeneration,
                "Generate code for a language and framework",
            ),
            SimulatedTool::CapyIssueTriage => (
                "Capy Issue Triage",
                ToolCategory::Custom,
                "Triage and categorize an issue",
            ),
            SimulatedTool::CapyVmExecution => (
                "Capy VM Execution",
                ToolCategory::Custom,
                "Execute code in an isolated machine",
            ),
            SimulatedTool::SameUiGeneration => (
                "Same UI Generation",
                ToolCategory::AiGeneration,
                "Generate UI components and layouts",
            ),
            SimulatedTool::SameDesignSystem => (
                "Same Design System",
                ToolCategory::AiGeneration,
                "Create a design system",
            ),
            SimulatedTool::SameResponsiveDesign => (
                "Same Responsive Design",
                ToolCategory::AiGeneration,
                "Generate responsive layouts",
            ),
            SimulatedTool::KiloTaskManagement => (
                "Kilo Task Management",
                ToolCategory::Custom,
                "Create, update, delete and list tasks",
            ),
            SimulatedTool::KiloProjectPlanning => (
                "Kilo Project Planning",
                ToolCategory::Custom,
                "Plan milestones and timeline for a project",
            ),
            SimulatedTool::KiloProgressTracking => (
                "Kilo Progress Tracking",
                ToolCategory::Monitoring,
                "Track project progress",
            ),
            SimulatedTool::ClineCodeEditing => (
                "Cline Code Editing",
                ToolCategory::CodeEditing,
                "Apply an editing operation to code",
            ),
            SimulatedTool::ClineCodeReview => (
                "Cline Code Review",
                ToolCategory::CodeEditing,
                "Review code against standards",
            ),
            SimulatedTool::ClineRefactoring => (
                "Cline Refactoring",
                ToolCategory::CodeEditing,
                "Refactor code",
            ),
            SimulatedTool::AssistantCodeAnalysis => (
                "Assistant Code Analysis",
                ToolCategory::CodeAnalysis,
                "Analyze code complexity and patterns",
            ),
            SimulatedTool::AssistantDocumentation => (
                "Assistant Documentation",
                ToolCategory::AiGeneration,
                "Generate documentation",
            ),
            SimulatedTool::AssistantDebugging => (
                "Assistant Debugging",
                ToolCategory::AiGeneration,
                "Suggest fixes for an error",
            ),
        };
        ToolSpec::new(name, category)
            .with_type("simulated")
            .with_description(description)
    }

    fn respond(&self, params: &Map<String, Value>, context: &StepContext) -> Result<Value, ToolError> {
        let value = match self {
            SimulatedTool::AiGeneration => {
                let prompt = context.resolve_template(required_str(params, "prompt")?);
                let model = optional_str(params, "model").unwrap_or(DEFAULT_MODEL);
                json!({
                    "prompt": prompt,
                    "model": model,
                    "result": { "content": format!("Generated response for: {prompt}") },
                })
            }
            SimulatedTool::CodeAnalysis | SimulatedTool::AssistantCodeAnalysis => json!({
                "language": optional_str(params, "language").unwrap_or("javascript"),
                "analysisType": optional_str(params, "analysisType").unwrap_or("comprehensive"),
                "complexity": "low",
                "issues": [],
                "recommendations": [],
            }),
            SimulatedTool::Deployment => json!({
                "provider": optional_str(params, "provider").unwrap_or("vercel"),
                "environment": optional_str(params, "environment").unwrap_or("production"),
                "status": "deployed",
            }),
            SimulatedTool::Testing => {
                let files = params
                    .get("testFiles")
                    .and_then(Value::as_array)
                    .map_or(0, Vec::len);
                json!({
                    "testType": optional_str(params, "testType").unwrap_or("unit"),
                    "testFiles": files,
                    "passed": 0,
                    "failed": 0,
                    "coverage": params.get("coverage").and_then(Value::as_bool).unwrap_or(false),
                })
            }
            SimulatedTool::DatabaseOperation => json!({
                "operation": required_str(params, "operation")?,
                "rowsAffected": 0,
            }),
            SimulatedTool::Monitoring | SimulatedTool::KiloProgressTracking => json!({
                "project": params.get("project").cloned().unwrap_or(Value::Null),
                "metrics": params.get("metrics").cloned().unwrap_or_else(|| json!([])),
                "trends": [],
                "recommendations": [],
            }),
            SimulatedTool::CapyCodeGeneration => json!({
                "generatedCode": "",
                "prompt": context.resolve_template(optional_str(params, "prompt").unwrap_or_default()),
                "language": optional_str(params, "language").unwrap_or("javascript"),
                "framework": optional_str(params, "framework").unwrap_or("react"),
            }),
            SimulatedTool::CapyIssueTriage => json!({
                "issue": required_str(params, "issue")?,
                "priority": "medium",
                "category": "uncategorized",
                "tags": [],
            }),
            SimulatedTool::CapyVmExecution => json!({
                "language": required_str(params, "language")?,
                "output": "",
                "error": Value::Null,
                "executionTime": 0,
            }),
            SimulatedTool::SameUiGeneration => json!({
                "description": optional_str(params, "description").unwrap_or_default(),
                "framework": optional_str(params, "framework").unwrap_or("react"),
                "style": optional_str(params, "style").unwrap_or("modern"),
                "components": [],
                "responsive": true,
            }),
            SimulatedTool::SameDesignSystem => json!({
                "brand": params.get("brand").cloned().unwrap_or(Value::Null),
                "colorPalette": params.get("colors").cloned().unwrap_or_else(|| json!([])),
                "typography": params.get("typography").cloned().unwrap_or(Value::Null),
                "components": [],
            }),
            SimulatedTool::SameResponsiveDesign => json!({
                "layout": params.get("layout").cloned().unwrap_or(Value::Null),
                "breakpoints": params
                    .get("breakpoints")
                    .cloned()
                    .unwrap_or_else(|| json!(["mobile", "tablet", "desktop"])),
            }),
            SimulatedTool::KiloTaskManagement => kilo_task(params)?,
            SimulatedTool::KiloProjectPlanning => json!({
                "project": params.get("project").cloned().unwrap_or(Value::Null),
                "milestones": params.get("milestones").cloned().unwrap_or_else(|| json!([])),
                "timeline": params.get("timeline").cloned().unwrap_or(Value::Null),
                "resources": [],
            }),
            SimulatedTool::ClineCodeEditing => json!({
                "operation": optional_str(params, "operation").unwrap_or("edit"),
                "editedCode": params.get("code").cloned().unwrap_or(Value::Null),
                "changes": [],
            }),
            SimulatedTool::ClineCodeReview => json!({
                "score": 100,
                "standards": params.get("standards").cloned().unwrap_or(Value::Null),
                "issues": [],
                "suggestions": [],
            }),
            SimulatedTool::ClineRefactoring => json!({
                "refactoringType": optional_str(params, "refactoringType").unwrap_or("general"),
                "refactoredCode": params.get("code").cloned().unwrap_or(Value::Null),
                "improvements": [],
            }),
            SimulatedTool::AssistantDocumentation => json!({
                "format": optional_str(params, "format").unwrap_or("markdown"),
                "style": optional_str(params, "style").unwrap_or("comprehensive"),
                "sections": [],
            }),
            SimulatedTool::AssistantDebugging => json!({
                "error": params.get("error").cloned().unwrap_or(Value::Null),
                "solution": Value::Null,
                "steps": [],
            }),
        };
        Ok(value)
    }
}

/// `kilo_task_management`: create, update, delete or list tasks.
fn kilo_task(params: &Map<String, Value>) -> Result<Value, ToolError> {
    let action = required_str(params, "action")?;
    let project = params.get("project").cloned().unwrap_or(Value::Null);
    let task = || {
        params
            .get("task")
            .cloned()
            .ok_or_else(|| ToolError::invalid(format!("action '{action}' requires a task")))
    };
    let value = match action {
        "create" => json!({ "action": action, "task": task()?, "project": project, "status": "pending" }),
        "update" => json!({ "action": action, "task": task()? }),
        "delete" => {
            let id = task()?
                .get("id")
                .cloned()
                .ok_or_else(|| ToolError::invalid("delete requires task.id"))?;
            json!({ "action": action, "taskId": id })
        }
        "list" => json!({ "action": action, "project": project, "tasks": [] }),
        other => return Err(ToolError::Unsupported(format!("task action '{other}'"))),
    };
    Ok(value)
}

impl StepExecutor for SimulatedTool {
    async fn execute(
        &self,
        parameters: Map<String, Value>,
        context: &StepContext,
    ) -> Result<Value, ToolError> {
        let mut value = self.respond(&parameters, context)?;
        if let Value::Object(map) = &mut value {
            map.insert("simulated".to_string(), Value::Bool(true));
            if parameters.get("retry") == Some(&Value::Bool(true)) {
                map.insert("regenerated".to_string(), Value::Bool(true));
            }
        }
        tracing::debug!(
            step_id = %context.step_id,
            tool_id = self.tool_id(),
            "simulated tool invoked"
        );
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devflow_types::workflow::{StepDefinition, StepResult, StepType};
    use std::collections::HashMap;
    use uuid::Uuid;

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("params must be an object"),
        }
    }

    #[test]
    fn tool_ids_are_unique() {
        let mut ids: Vec<_> = SimulatedTool::ALL.iter().map(|t| t.tool_id()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), SimulatedTool::ALL.len());
    }

    #[tokio::test]
    async fn ai_generation_renders_prompt_from_context() {
        let step = StepDefinition::new("gen", StepType::AiGeneration);
        let mut variables = Map::new();
        variables.insert("project".to_string(), json!("devflow"));
        let mut previous = HashMap::new();
        previous.insert(
            "plan".to_string(),
            StepResult {
                step_type: StepType::AiGeneration,
                tool: "ai_generation".to_string(),
                payload: json!("three modules"),
                timestamp: chrono::Utc::now(),
            },
        );
        let ctx = StepContext::new(Uuid::now_v7(), "wf", &step, variables, previous);

        let out = SimulatedTool::AiGeneration
            .execute(
                params(json!({ "prompt": "Build {{project}} with {{ steps.plan.output }}" })),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(out["prompt"], "Build devflow with three modules");
        assert_eq!(out["model"], "gpt-4");
        assert_eq!(out["simulated"], true);
    }

    #[tokio::test]
    async fn ai_generation_requires_prompt() {
        let step = StepDefinition::new("gen", StepType::AiGeneration);
        let err = SimulatedTool::AiGeneration
            .execute(Map::new(), &StepContext::detached(&step))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters(_)));
    }

    #[tokio::test]
    async fn kilo_task_actions() {
        let step = StepDefinition::new("tasks", StepType::Custom);
        let ctx = StepContext::detached(&step);
        let tool = SimulatedTool::KiloTaskManagement;

        let created = tool
            .execute(params(json!({ "action": "create", "task": { "title": "t" } })), &ctx)
            .await
            .unwrap();
        assert_eq!(created["status"], "pending");

        let deleted = tool
            .execute(params(json!({ "action": "delete", "task": { "id": 7 } })), &ctx)
            .await
            .unwrap();
        assert_eq!(deleted["taskId"], 7);

        assert!(matches!(
            tool.execute(params(json!({ "action": "archive" })), &ctx).await,
            Err(ToolError::Unsupported(_))
        ));
        assert!(matches!(
            tool.execute(params(json!({ "action": "update" })), &ctx).await,
            Err(ToolError::InvalidParameters(_))
        ));
    }

    #[tokio::test]
    async fn regeneration_flag_is_reported() {
        let step = StepDefinition::new("ui", StepType::Custom);
        let out = SimulatedTool::SameUiGeneration
            .execute(params(json!({ "retry": true })), &StepContext::detached(&step))
            .await
            .unwrap();
        assert_eq!(out["regenerated"], true);
        assert_eq!(out["framework"], "react");
    }
}

//! Workflow definition parsing, validation, and filesystem operations.
//!
//! Converts between JSON/YAML documents and the canonical `WorkflowDefinition`
//! and validates structural constraints (unique step IDs, known dependencies,
//! positive timeouts, acyclic graph).

use std::collections::HashSet;
use std::path::Path;

use devflow_types::workflow::WorkflowDefinition;
use thiserror::Error;

use super::dag;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors raised while loading or validating a workflow definition.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Malformed document or structural validation failure.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Dependency graph contains a cycle.
    #[error("cycle detected: {0}")]
    CycleDetected(String),

    /// A step references an unknown dependency.
    #[error("unknown dependency: {0}")]
    UnknownDependency(String),

    /// Filesystem I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// A definition could not be rendered back to text.
    #[error("serialize error: {0}")]
    SerializeError(String),
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a JSON document into a validated `WorkflowDefinition`.
pub fn parse_workflow_json(json: &str) -> Result<WorkflowDefinition, WorkflowError> {
    let def: WorkflowDefinition = serde_json::from_str(json)
        .map_err(|e| WorkflowError::ValidationError(format!("malformed workflow: {e}")))?;
    validate_definition(&def)?;
    Ok(def)
}

/// Parse a YAML document into a validated `WorkflowDefinition`.
///
/// YAML is a superset of JSON, so this also accepts JSON text.
pub fn parse_workflow_yaml(yaml: &str) -> Result<WorkflowDefinition, WorkflowError> {
    let def: WorkflowDefinition = serde_yaml_ng::from_str(yaml)
        .map_err(|e| WorkflowError::ValidationError(format!("malformed workflow: {e}")))?;
    validate_definition(&def)?;
    Ok(def)
}

/// Serialize a `WorkflowDefinition` to a YAML string.
pub fn serialize_workflow_yaml(def: &WorkflowDefinition) -> Result<String, WorkflowError> {
    serde_yaml_ng::to_string(def).map_err(|e| WorkflowError::SerializeError(e.to_string()))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate structural constraints on a `WorkflowDefinition`.
///
/// Checks:
/// - Every step ID is non-empty and unique
/// - All `dependencies` point to declared step IDs
/// - Every step timeout is > 0
/// - The dependency graph is acyclic (self-dependencies included)
///
/// A workflow with no steps is valid and completes immediately.
pub fn validate_definition(def: &WorkflowDefinition) -> Result<(), WorkflowError> {
    let mut seen_ids = HashSet::new();
    for step in &def.steps {
        if step.id.trim().is_empty() {
            return Err(WorkflowError::ValidationError(
                "step ID must not be empty".to_string(),
            ));
        }
        if !seen_ids.insert(step.id.as_str()) {
            return Err(WorkflowError::ValidationError(format!(
                "duplicate step ID: '{}'",
                step.id
            )));
        }
    }

    for step in &def.steps {
        for dep in &step.dependencies {
            if !seen_ids.contains(dep.as_str()) {
                return Err(WorkflowError::UnknownDependency(format!(
                    "step '{}' depends on unknown step '{}'",
                    step.id, dep
                )));
            }
        }
        if step.timeout_ms == 0 {
            return Err(WorkflowError::ValidationError(format!(
                "step '{}' timeout must be > 0",
                step.id
            )));
        }
    }

    dag::validate_dag(&def.steps)
}

// ---------------------------------------------------------------------------
// Filesystem operations
// ---------------------------------------------------------------------------

/// Load a workflow definition from a `.json`, `.yaml` or `.yml` file.
pub fn load_workflow_file(path: &Path) -> Result<WorkflowDefinition, WorkflowError> {
    let content = std::fs::read_to_string(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => parse_workflow_json(&content),
        _ => parse_workflow_yaml(&content),
    }
}

/// Save a workflow definition to a YAML file.
///
/// Creates parent directories if they don't exist.
pub fn save_workflow_file(path: &Path, def: &WorkflowDefinition) -> Result<(), WorkflowError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let yaml = serialize_workflow_yaml(def)?;
    std::fs::write(path, yaml)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use devflow_types::workflow::{ErrorStrategy, StepDefinition, StepType};

    fn custom_step(id: &str, deps: Vec<&str>) -> StepDefinition {
        let mut step = StepDefinition::new(id, StepType::Custom);
        step.dependencies = deps.into_iter().map(String::from).collect();
        step
    }

    fn workflow(steps: Vec<StepDefinition>) -> WorkflowDefinition {
        WorkflowDefinition {
            id: "wf".to_string(),
            name: "test".to_string(),
            description: None,
            steps,
            triggers: vec![],
            error_handling: Default::default(),
        }
    }

    #[test]
    fn test_parse_json_document() {
        let json = r#"{
            "steps": [
                {"id": "s1", "type": "custom", "dependencies": []},
                {"id": "s2", "type": "custom", "dependencies": ["s1"]}
            ],
            "errorHandling": {"strategy": "stop"}
        }"#;
        let def = parse_workflow_json(json).unwrap();
        assert_eq!(def.steps.len(), 2);
        assert_eq!(def.error_handling.strategy, ErrorStrategy::Stop);
    }

    #[test]
    fn test_parse_yaml_document() {
        let yaml = r#"
id: release
name: Release
steps:
  - id: test
    type: testing
  - id: deploy
    type: deployment
    dependencies: [test]
    timeout: 120000
errorHandling:
  strategy: retry
"#;
        let def = parse_workflow_yaml(yaml).unwrap();
        assert_eq!(def.id, "release");
        assert_eq!(def.steps[1].timeout_ms, 120_000);
    }

    #[test]
    fn test_malformed_document_is_validation_error() {
        let err = parse_workflow_json(r#"{"steps": [{"id": "a"}]}"#).unwrap_err();
        assert!(matches!(err, WorkflowError::ValidationError(ref m) if m.contains("malformed")));

        let err = parse_workflow_yaml("steps: [").unwrap_err();
        assert!(matches!(err, WorkflowError::ValidationError(_)));
    }

    #[test]
    fn test_duplicate_step_ids_rejected() {
        let def = workflow(vec![custom_step("a", vec![]), custom_step("a", vec![])]);
        let err = validate_definition(&def).unwrap_err();
        assert!(err.to_string().contains("duplicate step ID: 'a'"));
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let def = workflow(vec![custom_step("a", vec!["ghost"])]);
        let err = validate_definition(&def).unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownDependency(_)));
        assert!(err.to_string().contains("'ghost'"));
    }

    #[test]
    fn test_cycle_rejected() {
        let def = workflow(vec![custom_step("a", vec!["b"]), custom_step("b", vec!["a"])]);
        assert!(matches!(
            validate_definition(&def),
            Err(WorkflowError::CycleDetected(_))
        ));
    }

    #[test]
    fn test_self_dependency_rejected() {
        let def = workflow(vec![custom_step("a", vec!["a"])]);
        assert!(matches!(
            validate_definition(&def),
            Err(WorkflowError::CycleDetected(_))
        ));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut step = custom_step("a", vec![]);
        step.timeout_ms = 0;
        let err = validate_definition(&workflow(vec![step])).unwrap_err();
        assert!(err.to_string().contains("timeout must be > 0"));
    }

    #[test]
    fn test_empty_step_id_rejected() {
        let def = workflow(vec![custom_step("", vec![])]);
        assert!(matches!(
            validate_definition(&def),
            Err(WorkflowError::ValidationError(_))
        ));
    }

    #[test]
    fn test_empty_workflow_is_valid() {
        assert!(validate_definition(&workflow(vec![])).is_ok());
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("wf.yaml");
        let def = workflow(vec![custom_step("a", vec![]), custom_step("b", vec!["a"])]);

        save_workflow_file(&path, &def).unwrap();
        let loaded = load_workflow_file(&path).unwrap();
        assert_eq!(loaded, def);
    }

    #[test]
    fn test_load_json_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wf.json");
        std::fs::write(&path, r#"{"id": "j", "steps": [{"id": "x", "type": "api_call"}]}"#)
            .unwrap();
        let def = load_workflow_file(&path).unwrap();
        assert_eq!(def.id, "j");
        assert_eq!(def.steps[0].step_type, StepType::ApiCall);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = load_workflow_file(Path::new("/nonexistent/devflow/wf.yaml")).unwrap_err();
        assert!(matches!(err, WorkflowError::IoError(_)));
    }
}

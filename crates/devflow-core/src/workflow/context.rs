//! Per-step execution context and template resolution.
//!
//! `StepContext` is the read-only view an executor receives for one
//! invocation: the caller's context variables, the results of steps that ran
//! earlier in the same run, and the metadata of the step being executed.

use std::collections::HashMap;

use devflow_types::workflow::{StepDefinition, StepResult, StepType};
use serde::Serialize;
use serde_json::{Map, Value, json};
use uuid::Uuid;

/// Context handed to an executor for a single invocation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepContext {
    pub run_id: Uuid,
    pub workflow_id: String,
    pub step_id: String,
    pub step_name: String,
    pub step_type: StepType,
    /// Caller-seeded context variables.
    pub variables: Map<String, Value>,
    /// Results of steps executed earlier in this run, keyed by step ID.
    pub previous_results: HashMap<String, StepResult>,
}

impl StepContext {
    pub fn new(
        run_id: Uuid,
        workflow_id: impl Into<String>,
        step: &StepDefinition,
        variables: Map<String, Value>,
        previous_results: HashMap<String, StepResult>,
    ) -> Self {
        Self {
            run_id,
            workflow_id: workflow_id.into(),
            step_id: step.id.clone(),
            step_name: step.display_name().to_string(),
            step_type: step.step_type,
            variables,
            previous_results,
        }
    }

    /// Context for invoking an executor outside of any run.
    pub fn detached(step: &StepDefinition) -> Self {
        Self::new(Uuid::nil(), "", step, Map::new(), HashMap::new())
    }

    /// Look up a caller variable by top-level key.
    pub fn variable(&self, key: &str) -> Option<&Value> {
        self.variables.get(key)
    }

    /// Payload produced by an earlier step in this run.
    pub fn previous_output(&self, step_id: &str) -> Option<&Value> {
        self.previous_results.get(step_id).map(|r| &r.payload)
    }

    /// Flatten into a single JSON object:
    /// `{...variables, step, previousResults, workflowContext}`.
    ///
    /// The three reserved keys shadow caller variables of the same name.
    pub fn to_value(&self) -> Value {
        let mut object = self.variables.clone();
        object.insert(
            "step".to_string(),
            json!({
                "id": self.step_id,
                "name": self.step_name,
                "type": self.step_type,
            }),
        );
        object.insert(
            "previousResults".to_string(),
            serde_json::to_value(&self.previous_results).unwrap_or(Value::Null),
        );
        object.insert(
            "workflowContext".to_string(),
            json!({
                "runId": self.run_id,
                "workflowId": self.workflow_id,
            }),
        );
        Value::Object(object)
    }

    /// Replace `{{ ... }}` placeholders in `template`.
    ///
    /// Supported references:
    /// - `{{ steps.<id>.output }}` -- payload of an earlier step
    /// - `{{ key }}` or `{{ key.nested.path }}` -- a caller variable
    ///
    /// Strings are inserted verbatim, other values as compact JSON.
    /// Unknown references are left as-is (not an error).
    pub fn resolve_template(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                out.push_str(&rest[start..]);
                return out;
            };
            let placeholder = &rest[start..start + 2 + end + 2];
            match self.lookup(after[..end].trim()) {
                Some(value) => out.push_str(&value_to_string(value)),
                None => out.push_str(placeholder),
            }
            rest = &after[end + 2..];
        }

        out.push_str(rest);
        out
    }

    fn lookup(&self, reference: &str) -> Option<&Value> {
        if let Some(step_id) = reference
            .strip_prefix("steps.")
            .and_then(|r| r.strip_suffix(".output"))
        {
            return self.previous_output(step_id);
        }

        let mut segments = reference.split('.');
        let mut current = self.variables.get(segments.next()?)?;
        for segment in segments {
            current = current.get(segment)?;
        }
        Some(current)
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn context_with(variables: Value) -> StepContext {
        let step = StepDefinition::new("generate", StepType::AiGeneration);
        let Value::Object(variables) = variables else {
            panic!("variables must be an object");
        };
        let mut ctx = StepContext::new(Uuid::now_v7(), "wf", &step, variables, HashMap::new());
        ctx.previous_results.insert(
            "analyze".to_string(),
            StepResult {
                step_type: StepType::CodeAnalysis,
                tool: "code_analysis".to_string(),
                payload: json!({ "issues": 2 }),
                timestamp: Utc::now(),
            },
        );
        ctx
    }

    #[test]
    fn resolves_flat_variables() {
        let ctx = context_with(json!({ "component": "Navbar", "count": 3 }));
        assert_eq!(
            ctx.resolve_template("Build {{component}} x{{ count }}"),
            "Build Navbar x3"
        );
    }

    #[test]
    fn resolves_nested_variable_paths() {
        let ctx = context_with(json!({ "project": { "repo": { "branch": "main" } } }));
        assert_eq!(
            ctx.resolve_template("on {{ project.repo.branch }}"),
            "on main"
        );
    }

    #[test]
    fn resolves_previous_step_output() {
        let ctx = context_with(json!({}));
        assert_eq!(
            ctx.resolve_template("analysis: {{ steps.analyze.output }}"),
            r#"analysis: {"issues":2}"#
        );
    }

    #[test]
    fn unknown_references_are_left_untouched() {
        let ctx = context_with(json!({ "a": "x" }));
        assert_eq!(
            ctx.resolve_template("{{missing}} {{ steps.nope.output }} {{a}}"),
            "{{missing}} {{ steps.nope.output }} x"
        );
    }

    #[test]
    fn unterminated_placeholder_is_kept() {
        let ctx = context_with(json!({ "a": "x" }));
        assert_eq!(ctx.resolve_template("{{a}} and {{a"), "x and {{a");
    }

    #[test]
    fn to_value_merges_variables_with_reserved_keys() {
        let ctx = context_with(json!({ "component": "Navbar", "step": "shadowed" }));
        let v = ctx.to_value();

        assert_eq!(v["component"], "Navbar");
        assert_eq!(v["step"]["id"], "generate");
        assert_eq!(v["step"]["type"], "ai_generation");
        assert_eq!(v["previousResults"]["analyze"]["payload"]["issues"], 2);
        assert_eq!(v["workflowContext"]["workflowId"], "wf");
    }
}

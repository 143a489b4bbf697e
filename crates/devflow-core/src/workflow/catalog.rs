//! Workflow template catalog.
//!
//! Templates are immutable after the catalog is built. `instantiate` turns a
//! template plus caller customizations into a fresh, validated
//! `WorkflowDefinition`.

use std::collections::BTreeMap;

use devflow_types::workflow::{
    WorkflowCustomizations, WorkflowDefinition, WorkflowTemplate, generate_workflow_id,
};
use thiserror::Error;

use super::definition::{WorkflowError, validate_definition};

/// Built-in templates, embedded at compile time.
const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    (
        "capy_development",
        include_str!("templates/capy_development.yaml"),
    ),
    (
        "same_ui_development",
        include_str!("templates/same_ui_development.yaml"),
    ),
    (
        "kilo_task_management",
        include_str!("templates/kilo_task_management.yaml"),
    ),
    (
        "cline_code_editing",
        include_str!("templates/cline_code_editing.yaml"),
    ),
    (
        "ai_assistant_complete",
        include_str!("templates/ai_assistant_complete.yaml"),
    ),
];

/// Errors from catalog lookups and instantiation.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("template not found: {0}")]
    NotFound(String),

    /// An embedded or inserted template could not be parsed.
    #[error("invalid template '{id}': {reason}")]
    InvalidTemplate { id: String, reason: String },

    /// The instantiated definition failed validation.
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

/// Read-only collection of workflow templates keyed by ID.
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    templates: BTreeMap<String, WorkflowTemplate>,
}

impl TemplateCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog preloaded with the five built-in templates.
    pub fn builtin() -> Result<Self, CatalogError> {
        let mut catalog = Self::new();
        for (id, yaml) in BUILTIN_TEMPLATES {
            let template: WorkflowTemplate =
                serde_yaml_ng::from_str(yaml).map_err(|e| CatalogError::InvalidTemplate {
                    id: (*id).to_string(),
                    reason: e.to_string(),
                })?;
            catalog.insert(template);
        }
        tracing::debug!(count = catalog.len(), "loaded built-in workflow templates");
        Ok(catalog)
    }

    /// Add a template, replacing any template with the same ID.
    pub fn insert(&mut self, template: WorkflowTemplate) {
        self.templates.insert(template.id.clone(), template);
    }

    /// All templates, sorted by ID.
    pub fn list_templates(&self) -> Vec<&WorkflowTemplate> {
        self.templates.values().collect()
    }

    pub fn get(&self, template_id: &str) -> Option<&WorkflowTemplate> {
        self.templates.get(template_id)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Build a new workflow definition from a template.
    ///
    /// Each customization that is present replaces the template's value
    /// wholesale. The ID is the customization's ID or a fresh UUIDv7. The
    /// template itself is never modified.
    pub fn instantiate(
        &self,
        template_id: &str,
        customizations: WorkflowCustomizations,
    ) -> Result<WorkflowDefinition, CatalogError> {
        let template = self
            .get(template_id)
            .ok_or_else(|| CatalogError::NotFound(template_id.to_string()))?;

        let definition = WorkflowDefinition {
            id: customizations.id.unwrap_or_else(generate_workflow_id),
            name: customizations.name.unwrap_or_else(|| template.name.clone()),
            description: customizations
                .description
                .or_else(|| Some(template.description.clone()).filter(|d| !d.is_empty())),
            steps: customizations
                .steps
                .unwrap_or_else(|| template.steps.clone()),
            triggers: customizations
                .triggers
                .unwrap_or_else(|| template.triggers.clone()),
            error_handling: customizations
                .error_handling
                .unwrap_or_else(|| template.error_handling.clone()),
        };

        validate_definition(&definition)?;
        Ok(definition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devflow_types::workflow::{
        ErrorHandlingPolicy, ErrorStrategy, FallbackAction, StepDefinition, StepType, TriggerType,
    };

    fn catalog() -> TemplateCatalog {
        TemplateCatalog::builtin().unwrap()
    }

    #[test]
    fn builtin_catalog_has_five_valid_templates() {
        let catalog = catalog();
        let ids: Vec<_> = catalog.list_templates().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "ai_assistant_complete",
                "capy_development",
                "cline_code_editing",
                "kilo_task_management",
                "same_ui_development",
            ]
        );
        for template in catalog.list_templates() {
            let def = catalog
                .instantiate(&template.id, WorkflowCustomizations::default())
                .unwrap();
            assert_eq!(def.steps.len(), template.steps.len());
        }
    }

    #[test]
    fn builtin_templates_carry_policies_and_triggers() {
        let catalog = catalog();

        let capy = catalog.get("capy_development").unwrap();
        assert_eq!(capy.steps.len(), 6);
        assert_eq!(capy.error_handling.strategy, ErrorStrategy::Retry);
        assert_eq!(
            capy.error_handling.fallback_action,
            Some(FallbackAction::NotifyAdmin)
        );
        let deploy = capy.steps.iter().find(|s| s.id == "deploy_application").unwrap();
        assert_eq!(deploy.timeout_ms, 300_000);
        assert_eq!(deploy.retry_count, 2);

        let kilo = catalog.get("kilo_task_management").unwrap();
        assert_eq!(kilo.triggers.len(), 2);
        assert_eq!(kilo.triggers[1].trigger_type, TriggerType::Scheduled);
        assert_eq!(kilo.triggers[1].configuration["schedule"], "0 9 * * 1");
        assert_eq!(
            kilo.error_handling.fallback_action,
            Some(FallbackAction::EscalateToHuman)
        );

        let same = catalog.get("same_ui_development").unwrap();
        let components = same.steps.iter().find(|s| s.id == "generate_components").unwrap();
        assert_eq!(components.step_type, StepType::Custom);
        assert_eq!(components.tool_id(), "same_ui_generation");
    }

    #[test]
    fn instantiate_unknown_template_is_not_found() {
        let err = catalog()
            .instantiate("nope", WorkflowCustomizations::default())
            .unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(ref id) if id == "nope"));
    }

    #[test]
    fn instantiate_twice_yields_equal_content_with_fresh_ids() {
        let catalog = catalog();
        let mut a = catalog
            .instantiate("cline_code_editing", WorkflowCustomizations::default())
            .unwrap();
        let mut b = catalog
            .instantiate("cline_code_editing", WorkflowCustomizations::default())
            .unwrap();

        assert_ne!(a.id, b.id);
        a.id.clear();
        b.id.clear();
        assert_eq!(a, b);
    }

    #[test]
    fn instantiate_with_id_is_deterministic() {
        let catalog = catalog();
        let custom = || WorkflowCustomizations {
            id: Some("fixed".to_string()),
            ..Default::default()
        };
        let a = catalog.instantiate("capy_development", custom()).unwrap();
        let b = catalog.instantiate("capy_development", custom()).unwrap();
        assert_eq!(a.id, "fixed");
        assert_eq!(a, b);
    }

    #[test]
    fn customizations_replace_fields_wholesale() {
        let catalog = catalog();
        let customizations = WorkflowCustomizations {
            name: Some("Just tests".to_string()),
            steps: Some(vec![StepDefinition::new("only", StepType::Testing)]),
            error_handling: Some(ErrorHandlingPolicy::with_strategy(ErrorStrategy::Skip)),
            ..Default::default()
        };
        let def = catalog
            .instantiate("capy_development", customizations)
            .unwrap();

        assert_eq!(def.name, "Just tests");
        assert_eq!(def.steps.len(), 1);
        assert_eq!(def.error_handling.strategy, ErrorStrategy::Skip);
        // Not customized, so kept from the template.
        assert_eq!(def.triggers.len(), 1);

        // The template is untouched.
        assert_eq!(catalog.get("capy_development").unwrap().steps.len(), 6);
    }

    #[test]
    fn invalid_customized_steps_are_rejected() {
        let mut step = StepDefinition::new("a", StepType::Custom);
        step.dependencies = vec!["missing".to_string()];
        let err = catalog()
            .instantiate(
                "capy_development",
                WorkflowCustomizations {
                    steps: Some(vec![step]),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            CatalogError::Workflow(WorkflowError::UnknownDependency(_))
        ));
    }

    #[test]
    fn insert_adds_custom_template() {
        let mut catalog = TemplateCatalog::new();
        assert!(catalog.is_empty());
        catalog.insert(WorkflowTemplate {
            id: "mine".to_string(),
            name: "Mine".to_string(),
            description: String::new(),
            steps: vec![StepDefinition::new("x", StepType::ApiCall)],
            triggers: vec![],
            error_handling: ErrorHandlingPolicy::default(),
        });
        let def = catalog
            .instantiate("mine", WorkflowCustomizations::default())
            .unwrap();
        assert_eq!(def.name, "Mine");
        assert!(def.description.is_none());
    }
}

//! Event types for the devflow orchestration event bus.
//!
//! `WorkflowEvent` is the single payload broadcast while runs execute. It is
//! Clone + Send + Sync for use with tokio broadcast channels, and serializes
//! to `{event, runId, stepId?, error?, detail?, timestamp}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// What happened. Serialized as the `event` field (`workflowStarted`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WorkflowEventKind {
    WorkflowStarted,
    WorkflowStepStarted,
    WorkflowStepCompleted,
    WorkflowError,
    WorkflowNotification,
    WorkflowRevert,
    WorkflowEscalation,
    WorkflowPaused,
    WorkflowResumed,
    WorkflowStopped,
    WorkflowCompleted,
    WorkflowFailed,
}

impl WorkflowEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowEventKind::WorkflowStarted => "workflowStarted",
            WorkflowEventKind::WorkflowStepStarted => "workflowStepStarted",
            WorkflowEventKind::WorkflowStepCompleted => "workflowStepCompleted",
            WorkflowEventKind::WorkflowError => "workflowError",
            WorkflowEventKind::WorkflowNotification => "workflowNotification",
            WorkflowEventKind::WorkflowRevert => "workflowRevert",
            WorkflowEventKind::WorkflowEscalation => "workflowEscalation",
            WorkflowEventKind::WorkflowPaused => "workflowPaused",
            WorkflowEventKind::WorkflowResumed => "workflowResumed",
            WorkflowEventKind::WorkflowStopped => "workflowStopped",
            WorkflowEventKind::WorkflowCompleted => "workflowCompleted",
            WorkflowEventKind::WorkflowFailed => "workflowFailed",
        }
    }

    /// Run-level events that end a run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowEventKind::WorkflowStopped
                | WorkflowEventKind::WorkflowCompleted
                | WorkflowEventKind::WorkflowFailed
        )
    }
}

/// A single orchestration event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowEvent {
    #[serde(rename = "event")]
    pub kind: WorkflowEventKind,
    pub run_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Extra structured data, e.g. the fallback action or the step result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl WorkflowEvent {
    /// Run-level event with no step attached.
    pub fn run(kind: WorkflowEventKind, run_id: Uuid) -> Self {
        Self {
            kind,
            run_id,
            step_id: None,
            error: None,
            detail: None,
            timestamp: Utc::now(),
        }
    }

    /// Step-level event.
    pub fn step(kind: WorkflowEventKind, run_id: Uuid, step_id: impl Into<String>) -> Self {
        Self {
            step_id: Some(step_id.into()),
            ..Self::run(kind, run_id)
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_serializes_kind_under_event_key() {
        let run_id = Uuid::now_v7();
        let event = WorkflowEvent::step(WorkflowEventKind::WorkflowError, run_id, "build")
            .with_error("boom");
        let v = serde_json::to_value(&event).unwrap();

        assert_eq!(v["event"], "workflowError");
        assert_eq!(v["runId"], run_id.to_string());
        assert_eq!(v["stepId"], "build");
        assert_eq!(v["error"], "boom");
        assert!(v.get("detail").is_none());
    }

    #[test]
    fn test_run_event_omits_step_fields() {
        let event = WorkflowEvent::run(WorkflowEventKind::WorkflowStarted, Uuid::nil());
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["event"], "workflowStarted");
        assert!(v.get("stepId").is_none());
        assert!(v.get("error").is_none());
    }

    #[test]
    fn test_event_roundtrip_with_detail() {
        let event = WorkflowEvent::step(WorkflowEventKind::WorkflowEscalation, Uuid::nil(), "qa")
            .with_detail(json!({ "action": "escalate_to_human" }));
        let json = serde_json::to_string(&event).unwrap();
        let parsed: WorkflowEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_kind_wire_names_match_as_str() {
        for kind in [
            WorkflowEventKind::WorkflowStarted,
            WorkflowEventKind::WorkflowStepStarted,
            WorkflowEventKind::WorkflowStepCompleted,
            WorkflowEventKind::WorkflowError,
            WorkflowEventKind::WorkflowNotification,
            WorkflowEventKind::WorkflowRevert,
            WorkflowEventKind::WorkflowEscalation,
            WorkflowEventKind::WorkflowPaused,
            WorkflowEventKind::WorkflowResumed,
            WorkflowEventKind::WorkflowStopped,
            WorkflowEventKind::WorkflowCompleted,
            WorkflowEventKind::WorkflowFailed,
        ] {
            let v = serde_json::to_value(kind).unwrap();
            assert_eq!(v, json!(kind.as_str()));
        }
    }

    #[test]
    fn test_terminal_kinds() {
        assert!(WorkflowEventKind::WorkflowCompleted.is_terminal());
        assert!(WorkflowEventKind::WorkflowFailed.is_terminal());
        assert!(WorkflowEventKind::WorkflowStopped.is_terminal());
        assert!(!WorkflowEventKind::WorkflowPaused.is_terminal());
    }
}

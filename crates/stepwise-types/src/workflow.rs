//! Workflow definition types.
//!
//! A `WorkflowDefinition` is a named, ordered chain of `WorkflowStep`s. Each
//! step references a reusable `StepDefinition` (its type and default
//! configuration) and may carry its own configuration overlay and start delay.
//! `WorkflowDefinitionModel` is the portable description accepted by the
//! builder and the CLI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Persisted definitions
// ---------------------------------------------------------------------------

/// A named workflow template. Names are unique across the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// UUIDv7 assigned on creation.
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Inactive definitions cannot be started.
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl WorkflowDefinition {
    pub fn new(name: impl Into<String>, description: Option<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            description,
            is_active: true,
            created_at: Utc::now(),
            updated_at: None,
        }
    }
}

/// A reusable step template: the handler type plus its default configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub id: Uuid,
    /// Used as the `step_<name>` key when outputs are shared with later steps.
    pub name: String,
    /// Registry key of the handler that runs this step (e.g. "LogStep").
    pub step_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Default configuration document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl StepDefinition {
    pub fn new(
        name: impl Into<String>,
        step_type: impl Into<String>,
        configuration: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            step_type: step_type.into(),
            description: None,
            configuration,
            input_schema: None,
            output_schema: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: None,
        }
    }
}

/// A step occurrence inside a workflow. `order` is unique within the workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: Uuid,
    pub workflow_definition_id: Uuid,
    pub step_definition_id: Uuid,
    pub order: i32,
    /// Free-form condition expression, stored but not evaluated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_rules: Option<String>,
    /// Minutes added to the execution's scheduled time for this step.
    #[serde(default)]
    pub delay_minutes: u32,
    /// Instance configuration, overlaid on the step definition's default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// A workflow step joined with its step definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStepDetail {
    pub step: WorkflowStep,
    pub definition: StepDefinition,
}

/// A workflow definition with its steps in ascending order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowGraph {
    pub definition: WorkflowDefinition,
    pub steps: Vec<WorkflowStepDetail>,
}

// ---------------------------------------------------------------------------
// Portable model (builder / CLI input)
// ---------------------------------------------------------------------------

/// Portable workflow description, as produced by the builder or read from a
/// JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinitionModel {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub steps: Vec<WorkflowStepModel>,
}

/// One step of a `WorkflowDefinitionModel`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStepModel {
    pub step_type: String,
    pub name: String,
    pub order: i32,
    #[serde(default)]
    pub delay_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_rules: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_definition_model_json_defaults() {
        let raw = json!({
            "name": "onboarding",
            "steps": [
                { "step_type": "LogStep", "name": "hello", "order": 0,
                  "configuration": { "message": "hi" } },
                { "step_type": "DelayStep", "name": "wait", "order": 1, "delay_minutes": 5 }
            ]
        });
        let model: WorkflowDefinitionModel = serde_json::from_value(raw).unwrap();
        assert_eq!(model.name, "onboarding");
        assert!(model.description.is_none());
        assert_eq!(model.steps.len(), 2);
        assert_eq!(model.steps[0].delay_minutes, 0);
        assert_eq!(model.steps[1].delay_minutes, 5);
        assert!(model.steps[1].configuration.is_none());
    }

    #[test]
    fn test_step_definition_new_is_active() {
        let def = StepDefinition::new("greet", "LogStep", Some(json!({"message": "hi"})));
        assert!(def.is_active);
        assert_eq!(def.step_type, "LogStep");
        assert!(def.input_schema.is_none());
    }

    #[test]
    fn test_workflow_definition_omits_empty_optionals() {
        let def = WorkflowDefinition::new("w", None);
        let value = serde_json::to_value(&def).unwrap();
        assert!(value.get("description").is_none());
        assert!(value.get("updated_at").is_none());
        assert_eq!(value["is_active"], json!(true));
    }
}

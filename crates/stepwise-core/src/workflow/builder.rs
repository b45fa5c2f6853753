//! Fluent construction and persistence of workflow definitions.

use chrono::Utc;
use serde_json::{Value, json};
use stepwise_types::workflow::{
    StepDefinition, WorkflowDefinition, WorkflowDefinitionModel, WorkflowStep, WorkflowStepModel,
};
use uuid::Uuid;

use crate::repository::WorkflowRepository;

use super::engine::EngineError;

/// Builds a `WorkflowDefinitionModel` and saves it as a definition.
#[derive(Debug, Clone)]
pub struct WorkflowBuilder {
    model: WorkflowDefinitionModel,
}

impl WorkflowBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            model: WorkflowDefinitionModel {
                name: name.into(),
                description: None,
                steps: Vec::new(),
            },
        }
    }

    /// Start from an existing model, e.g. one read from a JSON file.
    pub fn from_model(model: WorkflowDefinitionModel) -> Self {
        Self { model }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.model.description = Some(description.into());
        self
    }

    pub fn add_step(
        mut self,
        step_type: impl Into<String>,
        name: impl Into<String>,
        order: i32,
        delay_minutes: u32,
        configuration: Option<Value>,
    ) -> Self {
        self.model.steps.push(WorkflowStepModel {
            step_type: step_type.into(),
            name: name.into(),
            order,
            delay_minutes,
            configuration,
            condition_rules: None,
        });
        self
    }

    /// Attach a condition expression to the step at `order`. The expression
    /// is stored with the step; it is not evaluated by the engine.
    pub fn add_condition(mut self, order: i32, expression: impl Into<String>) -> Self {
        if let Some(step) = self.model.steps.iter_mut().find(|s| s.order == order) {
            step.condition_rules = Some(expression.into());
        }
        self
    }

    /// Validate and return the model, steps sorted by order.
    pub fn build(self) -> Result<WorkflowDefinitionModel, EngineError> {
        let mut model = self.model;
        if model.name.trim().is_empty() {
            return Err(EngineError::InvalidDefinition(
                "workflow name must not be empty".to_string(),
            ));
        }
        if model.steps.is_empty() {
            return Err(EngineError::InvalidDefinition(format!(
                "workflow '{}' has no steps",
                model.name
            )));
        }

        model.steps.sort_by_key(|s| s.order);
        for pair in model.steps.windows(2) {
            if pair[0].order == pair[1].order {
                return Err(EngineError::InvalidDefinition(format!(
                    "duplicate step order {}",
                    pair[0].order
                )));
            }
        }
        for (i, step) in model.steps.iter().enumerate() {
            if step.step_type.trim().is_empty() {
                return Err(EngineError::InvalidDefinition(format!(
                    "step at order {} has no step type",
                    step.order
                )));
            }
            if step.name.trim().is_empty() {
                return Err(EngineError::InvalidDefinition(format!(
                    "step at order {} has no name",
                    step.order
                )));
            }
            if model.steps[..i].iter().any(|s| s.name == step.name) {
                return Err(EngineError::InvalidDefinition(format!(
                    "duplicate step name '{}'",
                    step.name
                )));
            }
        }
        Ok(model)
    }

    /// Validate and persist: one step definition per step (its configuration
    /// becomes the default), then the workflow definition with its steps.
    pub async fn save<R: WorkflowRepository>(self, repo: &R) -> Result<Uuid, EngineError> {
        let model = self.build()?;
        let definition = WorkflowDefinition::new(model.name.clone(), model.description.clone());

        let mut steps = Vec::with_capacity(model.steps.len());
        for step in &model.steps {
            let step_def =
                StepDefinition::new(step.name.clone(), step.step_type.clone(), step.configuration.clone());
            repo.save_step_definition(&step_def).await?;
            steps.push(WorkflowStep {
                id: Uuid::now_v7(),
                workflow_definition_id: definition.id,
                step_definition_id: step_def.id,
                order: step.order,
                condition_rules: step.condition_rules.clone(),
                delay_minutes: step.delay_minutes,
                configuration: None,
                created_at: Utc::now(),
            });
        }

        repo.create_workflow_definition(&definition, &steps).await?;
        tracing::info!(
            workflow_definition_id = %definition.id,
            name = %definition.name,
            steps = steps.len(),
            "created workflow definition"
        );
        Ok(definition.id)
    }
}

/// Four-step demo: log, pause, email one minute later, log.
pub fn demo_workflow() -> WorkflowBuilder {
    WorkflowBuilder::new("Demo Workflow")
        .description("A demo workflow with log, delay and email steps.")
        .add_step(
            "LogStep",
            "log-start",
            1,
            0,
            Some(json!({ "message": "Workflow started!", "level": "Information" })),
        )
        .add_step("DelayStep", "wait", 2, 0, Some(json!({ "delay_seconds": 30 })))
        .add_step(
            "EmailStep",
            "send-email",
            3,
            1,
            Some(json!({
                "to": "user@example.com",
                "subject": "Workflow finished",
                "body": "Your workflow finished successfully!"
            })),
        )
        .add_step(
            "LogStep",
            "log-end",
            4,
            0,
            Some(json!({ "message": "Workflow finished!", "level": "Information" })),
        )
}

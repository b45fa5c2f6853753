//! Step context assembly.
//!
//! Builds the `StepContext` a handler sees: the merged configuration, the
//! step's own input document, and the workflow data map made of the
//! execution input plus `step_<name>` outputs of earlier completed steps.

use serde_json::{Map, Value};
use stepwise_types::execution::{PriorStepOutput, StepExecutionDetail, WorkflowExecution};

use crate::step::StepContext;

/// Key under which a non-object workflow input is exposed.
pub const INPUT_KEY: &str = "input";

/// Prefix for prior step outputs in the workflow data map.
pub const STEP_OUTPUT_PREFIX: &str = "step_";

/// Overlay `instance` onto `default`.
///
/// Two objects merge shallowly with instance keys winning. Otherwise the
/// instance configuration replaces the default when present.
pub fn merge_configuration(default: Option<&Value>, instance: Option<&Value>) -> Option<Value> {
    match (default, instance) {
        (Some(Value::Object(base)), Some(Value::Object(overlay))) => {
            let mut merged = base.clone();
            for (key, value) in overlay {
                merged.insert(key.clone(), value.clone());
            }
            Some(Value::Object(merged))
        }
        (_, Some(instance)) if !instance.is_null() => Some(instance.clone()),
        (Some(default), _) => Some(default.clone()),
        (None, instance) => instance.cloned(),
    }
}

/// Workflow input keys followed by `step_<name>` entries for `prior`.
///
/// `prior` must already be restricted to completed, lower-order steps; a
/// later entry with the same name overwrites an earlier one.
pub fn workflow_data(input: Option<&Value>, prior: &[PriorStepOutput]) -> Map<String, Value> {
    let mut data = match input {
        Some(Value::Object(map)) => map.clone(),
        Some(Value::Null) | None => Map::new(),
        Some(other) => {
            let mut map = Map::new();
            map.insert(INPUT_KEY.to_string(), other.clone());
            map
        }
    };
    for output in prior {
        data.insert(
            format!("{STEP_OUTPUT_PREFIX}{}", output.step_name),
            output.output.clone(),
        );
    }
    data
}

/// Assemble the handler context for one step execution.
pub fn build_step_context(
    parent: &WorkflowExecution,
    detail: &StepExecutionDetail,
    prior: &[PriorStepOutput],
) -> StepContext {
    let exec = &detail.execution;
    StepContext {
        workflow_execution_id: parent.id,
        step_execution_id: exec.id,
        workflow_definition_id: parent.workflow_definition_id,
        step_definition_id: detail.definition.id,
        step_type: detail.definition.step_type.clone(),
        step_name: detail.definition.name.clone(),
        order: detail.step.order,
        configuration: merge_configuration(
            detail.definition.configuration.as_ref(),
            detail.step.configuration.as_ref(),
        ),
        input_data: exec.input_data.clone(),
        workflow_data: workflow_data(parent.input_data.as_ref(), prior),
        retry_count: exec.retry_count,
        max_retries: exec.max_retries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use stepwise_types::execution::{StepExecution, WorkflowExecutionStatus};
    use stepwise_types::workflow::{StepDefinition, WorkflowStep};
    use uuid::Uuid;

    fn prior(name: &str, order: i32, output: Value) -> PriorStepOutput {
        PriorStepOutput {
            step_name: name.to_string(),
            order,
            output,
        }
    }

    #[test]
    fn merge_overlays_instance_keys() {
        let merged = merge_configuration(
            Some(&json!({"message": "default", "level": "Information"})),
            Some(&json!({"message": "custom", "extra": 1})),
        );
        assert_eq!(
            merged,
            Some(json!({"message": "custom", "level": "Information", "extra": 1}))
        );
    }

    #[test]
    fn merge_is_shallow() {
        let merged = merge_configuration(
            Some(&json!({"smtp": {"host": "a", "port": 25}})),
            Some(&json!({"smtp": {"host": "b"}})),
        );
        assert_eq!(merged, Some(json!({"smtp": {"host": "b"}})));
    }

    #[test]
    fn merge_falls_back_when_either_side_missing() {
        assert_eq!(merge_configuration(None, None), None);
        assert_eq!(
            merge_configuration(Some(&json!({"a": 1})), None),
            Some(json!({"a": 1}))
        );
        assert_eq!(
            merge_configuration(None, Some(&json!({"b": 2}))),
            Some(json!({"b": 2}))
        );
        assert_eq!(
            merge_configuration(Some(&json!({"a": 1})), Some(&Value::Null)),
            Some(json!({"a": 1}))
        );
        assert_eq!(
            merge_configuration(Some(&json!({"a": 1})), Some(&json!([1, 2]))),
            Some(json!([1, 2]))
        );
    }

    #[test]
    fn workflow_data_flattens_input_and_prior_outputs() {
        let data = workflow_data(
            Some(&json!({"user": "ada", "plan": "pro"})),
            &[
                prior("greet", 0, json!({"logged": true})),
                prior("wait", 1, json!({"delay_completed": true})),
            ],
        );
        assert_eq!(data["user"], "ada");
        assert_eq!(data["plan"], "pro");
        assert_eq!(data["step_greet"], json!({"logged": true}));
        assert_eq!(data["step_wait"], json!({"delay_completed": true}));
        assert_eq!(data.len(), 4);
    }

    #[test]
    fn workflow_data_wraps_scalar_input() {
        let data = workflow_data(Some(&json!(42)), &[]);
        assert_eq!(data[INPUT_KEY], 42);
        assert!(workflow_data(Some(&Value::Null), &[]).is_empty());
    }

    #[test]
    fn duplicate_step_names_later_wins() {
        let data = workflow_data(
            None,
            &[prior("log", 0, json!("first")), prior("log", 2, json!("second"))],
        );
        assert_eq!(data["step_log"], "second");
    }

    #[test]
    fn build_context_copies_counters_and_ids() {
        let now = Utc::now();
        let parent = WorkflowExecution::new(
            Uuid::now_v7(),
            WorkflowExecutionStatus::Running,
            Some(json!({"k": "v"})),
            None,
            now,
        );
        let definition =
            StepDefinition::new("notify", "EmailStep", Some(json!({"subject": "Hi"})));
        let step = WorkflowStep {
            id: Uuid::now_v7(),
            workflow_definition_id: parent.workflow_definition_id,
            step_definition_id: definition.id,
            order: 4,
            condition_rules: None,
            delay_minutes: 0,
            configuration: Some(json!({"to": "a@b.c"})),
            created_at: now,
        };
        let mut execution = StepExecution::pending(parent.id, step.id, None, 5, now);
        execution.retry_count = 2;
        execution.input_data = Some(json!({"raw": true}));
        let detail = StepExecutionDetail {
            execution,
            step,
            definition,
        };

        let ctx = build_step_context(&parent, &detail, &[prior("fetch", 1, json!(1))]);

        assert_eq!(ctx.workflow_execution_id, parent.id);
        assert_eq!(ctx.step_execution_id, detail.execution.id);
        assert_eq!(ctx.step_type, "EmailStep");
        assert_eq!(ctx.step_name, "notify");
        assert_eq!(ctx.order, 4);
        assert_eq!(ctx.retry_count, 2);
        assert_eq!(ctx.max_retries, 5);
        assert_eq!(
            ctx.configuration,
            Some(json!({"subject": "Hi", "to": "a@b.c"}))
        );
        assert_eq!(ctx.input_data, Some(json!({"raw": true})));
        assert_eq!(ctx.workflow_data["k"], "v");
        assert_eq!(ctx.workflow_data["step_fetch"], 1);
    }
}

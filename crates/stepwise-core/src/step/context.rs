//! The input record handed to a step handler.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::handler::StepError;

/// Everything a step handler sees about the step it is running.
///
/// `configuration` is already merged (step definition default overlaid by
/// the workflow step's instance configuration). `workflow_data` holds the
/// workflow input's top-level keys plus `step_<name>` entries with outputs
/// of earlier completed steps.
#[derive(Debug, Clone, PartialEq)]
pub struct StepContext {
    pub workflow_execution_id: Uuid,
    pub step_execution_id: Uuid,
    pub workflow_definition_id: Uuid,
    pub step_definition_id: Uuid,
    pub step_type: String,
    pub step_name: String,
    pub order: i32,
    pub configuration: Option<Value>,
    pub input_data: Option<Value>,
    pub workflow_data: Map<String, Value>,
    pub retry_count: u32,
    pub max_retries: u32,
}

impl StepContext {
    /// Deserialize the merged configuration into a typed config struct.
    /// A missing configuration is treated as an empty object, so structs
    /// whose fields all have defaults still parse.
    pub fn config_as<T: DeserializeOwned>(&self) -> Result<T, StepError> {
        let value = self
            .configuration
            .clone()
            .unwrap_or_else(|| Value::Object(Map::new()));
        serde_json::from_value(value)
            .map_err(|e| StepError::InvalidConfiguration(format!("{}: {e}", self.step_type)))
    }

    /// Output of an earlier completed step, by step definition name.
    pub fn prior_output(&self, step_name: &str) -> Option<&Value> {
        self.workflow_data.get(&format!("step_{step_name}"))
    }
}

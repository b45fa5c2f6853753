//! Built-in step handlers.

pub mod delay;
pub mod email;
pub mod log;

pub use delay::DelayStep;
pub use email::EmailStep;
pub use log::LogStep;

use serde::de::DeserializeOwned;

use super::context::StepContext;
use super::handler::StepError;

/// Parse the merged configuration. Built-in steps refuse to run without one.
fn required_config<T: DeserializeOwned>(ctx: &StepContext) -> Result<T, StepError> {
    if ctx.configuration.is_none() {
        return Err(StepError::InvalidConfiguration(format!(
            "{}: configuration is required",
            ctx.step_type
        )));
    }
    ctx.config_as()
}

#[cfg(test)]
pub(crate) fn test_context(step_type: &str, configuration: Option<serde_json::Value>) -> StepContext {
    StepContext {
        workflow_execution_id: uuid::Uuid::now_v7(),
        step_execution_id: uuid::Uuid::now_v7(),
        workflow_definition_id: uuid::Uuid::now_v7(),
        step_definition_id: uuid::Uuid::now_v7(),
        step_type: step_type.to_string(),
        step_name: step_type.to_lowercase(),
        order: 0,
        configuration,
        input_data: None,
        workflow_data: serde_json::Map::new(),
        retry_count: 0,
        max_retries: 3,
    }
}

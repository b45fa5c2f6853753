//! DelayStep: waits a configured number of seconds.

use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::step::context::StepContext;
use crate::step::handler::{StepError, StepHandler, StepOutcome};

use super::required_config;

#[derive(Debug, Deserialize)]
struct DelayConfig {
    #[serde(default = "default_delay_seconds")]
    delay_seconds: i64,
}

fn default_delay_seconds() -> i64 {
    5
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DelayStep;

impl StepHandler for DelayStep {
    fn step_type(&self) -> &str {
        "DelayStep"
    }

    async fn validate_input(&self, ctx: &StepContext) -> Result<(), StepError> {
        let config = required_config::<DelayConfig>(ctx)?;
        if config.delay_seconds <= 0 {
            return Err(StepError::InvalidInput(
                "delay_seconds must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    async fn can_execute(&self, ctx: &StepContext) -> bool {
        required_config::<DelayConfig>(ctx).is_ok_and(|c| c.delay_seconds > 0)
    }

    async fn execute(&self, ctx: &StepContext) -> StepOutcome {
        let config = match required_config::<DelayConfig>(ctx) {
            Ok(config) => config,
            Err(e) => return StepOutcome::failure(e.to_string()),
        };
        let seconds = config.delay_seconds.max(0);

        tracing::info!(execution_id = %ctx.workflow_execution_id, delay_seconds = seconds, "delaying");
        tokio::time::sleep(Duration::from_secs(seconds as u64)).await;
        tracing::debug!(execution_id = %ctx.workflow_execution_id, delay_seconds = seconds, "delay completed");

        StepOutcome::success(json!({
            "delay_completed": true,
            "delay_seconds": seconds,
            "completed_at": Utc::now(),
        }))
    }
}

//! LogStep: writes a configured message to the log.

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::step::context::StepContext;
use crate::step::handler::{StepError, StepHandler, StepOutcome};

use super::required_config;

#[derive(Debug, Deserialize)]
struct LogConfig {
    #[serde(default)]
    message: String,
    #[serde(default = "default_level")]
    level: String,
}

fn default_level() -> String {
    "Information".to_string()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogStep;

impl StepHandler for LogStep {
    fn step_type(&self) -> &str {
        "LogStep"
    }

    async fn validate_input(&self, ctx: &StepContext) -> Result<(), StepError> {
        required_config::<LogConfig>(ctx).map(|_| ())
    }

    async fn can_execute(&self, ctx: &StepContext) -> bool {
        required_config::<LogConfig>(ctx).is_ok_and(|c| !c.message.is_empty())
    }

    async fn execute(&self, ctx: &StepContext) -> StepOutcome {
        let config = match required_config::<LogConfig>(ctx) {
            Ok(config) => config,
            Err(e) => return StepOutcome::failure(e.to_string()),
        };

        let execution_id = ctx.workflow_execution_id;
        let message = config.message.as_str();
        match config.level.to_lowercase().as_str() {
            "trace" => tracing::trace!(%execution_id, "{message}"),
            "debug" => tracing::debug!(%execution_id, "{message}"),
            "warning" | "warn" => tracing::warn!(%execution_id, "{message}"),
            "error" | "critical" => tracing::error!(%execution_id, "{message}"),
            _ => tracing::info!(%execution_id, "{message}"),
        }

        StepOutcome::success(json!({
            "logged": true,
            "level": config.level,
            "message": config.message,
            "logged_at": Utc::now(),
        }))
    }
}

//! EmailStep: simulated email delivery.
//!
//! No mail is sent; delivery is logged after a short pause. Delivery errors
//! are retryable after two minutes.

use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::step::context::StepContext;
use crate::step::handler::{StepError, StepHandler, StepOutcome};

use super::required_config;

const RETRY_DELAY: Duration = Duration::from_secs(120);

#[derive(Debug, Deserialize)]
struct EmailConfig {
    #[serde(default)]
    to: String,
    #[serde(default)]
    subject: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    cc: Option<String>,
    #[serde(default)]
    bcc: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct EmailStep {
    send_delay: Duration,
}

impl EmailStep {
    pub fn new() -> Self {
        Self {
            send_delay: Duration::from_secs(1),
        }
    }

    /// Override the simulated delivery time.
    pub fn with_send_delay(send_delay: Duration) -> Self {
        Self { send_delay }
    }

    async fn deliver(&self, config: &EmailConfig) -> Result<(), String> {
        let recipients = std::iter::once(config.to.as_str())
            .chain(config.cc.as_deref())
            .chain(config.bcc.as_deref());
        for address in recipients.flat_map(|list| list.split([',', ';'])) {
            let address = address.trim();
            if !address.is_empty() && !address.contains('@') {
                return Err(format!("invalid recipient address '{address}'"));
            }
        }
        tokio::time::sleep(self.send_delay).await;
        Ok(())
    }
}

impl Default for EmailStep {
    fn default() -> Self {
        Self::new()
    }
}

impl StepHandler for EmailStep {
    fn step_type(&self) -> &str {
        "EmailStep"
    }

    async fn validate_input(&self, ctx: &StepContext) -> Result<(), StepError> {
        required_config::<EmailConfig>(ctx).map(|_| ())
    }

    async fn can_execute(&self, ctx: &StepContext) -> bool {
        required_config::<EmailConfig>(ctx).is_ok_and(|c| !c.to.is_empty() && !c.subject.is_empty())
    }

    async fn execute(&self, ctx: &StepContext) -> StepOutcome {
        let config = match required_config::<EmailConfig>(ctx) {
            Ok(config) => config,
            Err(e) => return StepOutcome::retryable(e.to_string(), Some(RETRY_DELAY)),
        };

        tracing::info!(
            execution_id = %ctx.workflow_execution_id,
            to = %config.to,
            subject = %config.subject,
            body_len = config.body.len(),
            "sending email"
        );
        if let Err(e) = self.deliver(&config).await {
            tracing::error!(execution_id = %ctx.workflow_execution_id, error = %e, "failed to send email");
            return StepOutcome::retryable(e, Some(RETRY_DELAY));
        }
        tracing::info!(execution_id = %ctx.workflow_execution_id, to = %config.to, "email sent");

        StepOutcome::success(json!({
            "email_sent": true,
            "to": config.to,
            "subject": config.subject,
            "sent_at": Utc::now(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::builtin::test_context;

    fn step() -> EmailStep {
        EmailStep::with_send_delay(Duration::ZERO)
    }

    #[tokio::test]
    async fn sends_to_valid_recipient() {
        let ctx = test_context(
            "EmailStep",
            Some(json!({"to": "user@example.com", "subject": "Hi", "body": "Welcome"})),
        );
        assert!(step().can_execute(&ctx).await);
        let StepOutcome::Success { output: Some(output) } = step().execute(&ctx).await else {
            panic!("expected success");
        };
        assert_eq!(output["email_sent"], true);
        assert_eq!(output["to"], "user@example.com");
    }

    #[tokio::test]
    async fn missing_subject_cannot_execute() {
        let ctx = test_context("EmailStep", Some(json!({"to": "user@example.com"})));
        assert!(step().validate_input(&ctx).await.is_ok());
        assert!(!step().can_execute(&ctx).await);
    }

    #[tokio::test]
    async fn delivery_error_is_retryable_after_two_minutes() {
        let ctx = test_context(
            "EmailStep",
            Some(json!({"to": "user@example.com", "cc": "not-an-address", "subject": "Hi"})),
        );
        match step().execute(&ctx).await {
            StepOutcome::Failure {
                error,
                retry,
                retry_delay,
            } => {
                assert!(error.contains("not-an-address"));
                assert!(retry);
                assert_eq!(retry_delay, Some(Duration::from_secs(120)));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }
}

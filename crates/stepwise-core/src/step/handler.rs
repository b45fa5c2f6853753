//! Step handler contract.
//!
//! A `StepHandler` implements one step type. The processor calls
//! `validate_input`, then `can_execute`, then `execute`; only `execute`
//! produces an outcome that can request a retry.

use std::time::Duration;

use serde_json::Value;

use super::context::StepContext;

// ---------------------------------------------------------------------------
// StepOutcome
// ---------------------------------------------------------------------------

/// Result of running a step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Success {
        output: Option<Value>,
    },
    Failure {
        error: String,
        /// Ask the engine to run the step again (subject to the retry limit).
        retry: bool,
        /// Explicit delay before the retry. Defaults to exponential backoff.
        retry_delay: Option<Duration>,
    },
}

impl StepOutcome {
    pub fn success(output: Value) -> Self {
        StepOutcome::Success {
            output: Some(output),
        }
    }

    /// Failure that must not be retried.
    pub fn failure(error: impl Into<String>) -> Self {
        StepOutcome::Failure {
            error: error.into(),
            retry: false,
            retry_delay: None,
        }
    }

    /// Failure that should be retried, optionally after a fixed delay.
    pub fn retryable(error: impl Into<String>, retry_delay: Option<Duration>) -> Self {
        StepOutcome::Failure {
            error: error.into(),
            retry: true,
            retry_delay,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Success { .. })
    }
}

// ---------------------------------------------------------------------------
// StepError
// ---------------------------------------------------------------------------

/// Errors a handler reports before it runs.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StepError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("invalid configuration for {0}")]
    InvalidConfiguration(String),

    #[error("{0}")]
    Execution(String),
}

// ---------------------------------------------------------------------------
// StepHandler trait
// ---------------------------------------------------------------------------

/// One step type's behaviour.
///
/// Uses RPITIT for async methods, consistent with the repository traits.
/// Use `BoxStepHandler` for dynamic dispatch.
pub trait StepHandler: Send + Sync {
    /// Registry key, e.g. "LogStep".
    fn step_type(&self) -> &str;

    /// Check configuration and input before running.
    fn validate_input(
        &self,
        ctx: &StepContext,
    ) -> impl std::future::Future<Output = Result<(), StepError>> + Send;

    /// Whether the step can run with this context. `false` skips the step.
    fn can_execute(&self, ctx: &StepContext) -> impl std::future::Future<Output = bool> + Send;

    fn execute(&self, ctx: &StepContext) -> impl std::future::Future<Output = StepOutcome> + Send;
}

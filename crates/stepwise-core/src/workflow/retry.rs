//! Retry policy for failed step executions.
//!
//! Stateless: all inputs come from the step execution row and the failure
//! outcome. A failure is retried only when the handler asked for it and the
//! step still has retries left; otherwise it is terminal.

use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

/// Upper bound on the backoff exponent, to keep the delay representable.
const MAX_BACKOFF_EXPONENT: u32 = 30;

/// What to do with a failed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry as attempt `retry_count` at `scheduled_time`.
    Retry {
        retry_count: u32,
        scheduled_time: DateTime<Utc>,
    },
    /// No retry requested, or retries exhausted.
    Fail,
}

/// Stateless retry handler.
pub struct RetryPolicy;

impl RetryPolicy {
    /// `true` if a retry was requested and `retry_count < max_retries`.
    pub fn should_retry(retry_requested: bool, retry_count: u32, max_retries: u32) -> bool {
        retry_requested && retry_count < max_retries
    }

    /// Default delay before retry number `retry_count`: `2^retry_count` minutes.
    pub fn backoff(retry_count: u32) -> ChronoDuration {
        let exponent = retry_count.min(MAX_BACKOFF_EXPONENT);
        ChronoDuration::minutes(1_i64 << exponent)
    }

    /// Decide the fate of a failed attempt.
    ///
    /// On retry the count is incremented first, and the backoff uses the new
    /// count, so the first retry waits 2 minutes, the second 4, and so on.
    pub fn decide(
        retry_requested: bool,
        retry_count: u32,
        max_retries: u32,
        explicit_delay: Option<Duration>,
        now: DateTime<Utc>,
    ) -> RetryDecision {
        if !Self::should_retry(retry_requested, retry_count, max_retries) {
            return RetryDecision::Fail;
        }
        let next = retry_count + 1;
        let delay = explicit_delay
            .and_then(|d| ChronoDuration::from_std(d).ok())
            .unwrap_or_else(|| Self::backoff(next));
        RetryDecision::Retry {
            retry_count: next,
            scheduled_time: now + delay,
        }
    }
}

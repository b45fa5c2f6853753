//! Job scheduler ports.
//!
//! `JobScheduler` is the narrow interface the engine uses to defer work:
//! run a job as soon as possible, or at a point in time. `JobQueue` extends
//! it with the claim/ack operations a `JobWorker` needs to execute jobs.

use chrono::{DateTime, Utc};
use stepwise_types::job::{Job, ScheduledJob};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from scheduling or queue operations.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The backing store failed.
    #[error("job storage error: {0}")]
    Storage(String),

    /// A stored job could not be decoded.
    #[error("invalid job: {0}")]
    InvalidJob(String),
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Deferred execution of engine jobs.
///
/// Implementations must be durable enough for their deployment: a scheduled
/// job is expected to run even if the scheduling process stops.
pub trait JobScheduler: Send + Sync {
    /// Run `job` as soon as a worker is available. Returns the job id.
    fn enqueue(
        &self,
        job: Job,
    ) -> impl std::future::Future<Output = Result<Uuid, SchedulerError>> + Send;

    /// Run `job` no earlier than `run_at`. Returns the job id.
    fn schedule(
        &self,
        job: Job,
        run_at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Uuid, SchedulerError>> + Send;
}

/// Worker-side queue operations.
pub trait JobQueue: JobScheduler {
    /// Atomically move up to `limit` Pending jobs with `run_at <= now` to
    /// Running, earliest `run_at` first, and return them.
    fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<ScheduledJob>, SchedulerError>> + Send;

    /// Mark a claimed job as done.
    fn complete(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<(), SchedulerError>> + Send;

    /// Mark a claimed job as failed. Failed jobs are not retried.
    fn fail(
        &self,
        id: &Uuid,
        error: &str,
    ) -> impl std::future::Future<Output = Result<(), SchedulerError>> + Send;

    /// Return Running jobs claimed before `claimed_before` to Pending.
    /// Returns how many were requeued.
    fn requeue_stale(
        &self,
        claimed_before: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<u64, SchedulerError>> + Send;

    /// Number of jobs still waiting to be claimed.
    fn pending_count(&self) -> impl std::future::Future<Output = Result<u64, SchedulerError>> + Send;
}

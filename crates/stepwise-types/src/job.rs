//! Scheduled job records.
//!
//! The engine never runs work inline across step boundaries; it hands a `Job`
//! to a scheduler, which invokes it later (immediately or at a point in time).
//! `ScheduledJob` is the queue-side record tracking one such invocation.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unit of deferred engine work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Job {
    /// Advance the given execution to its next step.
    ProcessWorkflow { execution_id: Uuid },
    /// Run the given step execution.
    ProcessStep { step_execution_id: Uuid },
}

impl Job {
    pub fn kind(&self) -> &'static str {
        match self {
            Job::ProcessWorkflow { .. } => "process_workflow",
            Job::ProcessStep { .. } => "process_step",
        }
    }

    /// The execution or step execution the job targets.
    pub fn target_id(&self) -> Uuid {
        match self {
            Job::ProcessWorkflow { execution_id } => *execution_id,
            Job::ProcessStep { step_execution_id } => *step_execution_id,
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind(), self.target_id())
    }
}

/// Queue-side state of a scheduled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for `run_at`.
    Pending,
    /// Claimed by a worker.
    Running,
    Completed,
    /// The handler returned an error. Not retried at this level.
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("invalid job status: '{other}'")),
        }
    }
}

/// A job as tracked by a queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: Uuid,
    pub job: Job,
    /// Earliest time the job may be claimed.
    pub run_at: DateTime<Utc>,
    pub status: JobStatus,
    /// Number of times the job has been claimed.
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ScheduledJob {
    pub fn new(job: Job, run_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            job,
            run_at,
            status: JobStatus::Pending,
            attempts: 0,
            last_error: None,
            claimed_at: None,
            created_at: now,
        }
    }
}

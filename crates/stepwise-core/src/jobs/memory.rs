//! In-memory job queue.
//!
//! Jobs are held in a `BTreeMap` keyed by id behind an async mutex. Nothing
//! survives a restart; use the SQLite queue for durable scheduling.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use stepwise_types::job::{Job, JobStatus, ScheduledJob};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};

use super::scheduler::{JobQueue, JobScheduler, SchedulerError};

/// Process-local `JobQueue`. Clones share the same jobs.
#[derive(Clone)]
pub struct InMemoryJobQueue {
    jobs: Arc<Mutex<BTreeMap<Uuid, ScheduledJob>>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Use `clock` as the enqueue time source.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(BTreeMap::new())),
            clock,
        }
    }

    /// Snapshot of every job, in id (creation) order.
    pub async fn jobs(&self) -> Vec<ScheduledJob> {
        self.jobs.lock().await.values().cloned().collect()
    }

    async fn insert(&self, job: Job, run_at: DateTime<Utc>) -> Uuid {
        let record = ScheduledJob::new(job, run_at, self.clock.now());
        let id = record.id;
        self.jobs.lock().await.insert(id, record);
        id
    }

    async fn set_status(
        &self,
        id: &Uuid,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<(), SchedulerError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| SchedulerError::Storage(format!("job {id} not found")))?;
        job.status = status;
        if let Some(error) = error {
            job.last_error = Some(error.to_string());
        }
        Ok(())
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryJobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryJobQueue").finish_non_exhaustive()
    }
}

impl JobScheduler for InMemoryJobQueue {
    async fn enqueue(&self, job: Job) -> Result<Uuid, SchedulerError> {
        let now = self.clock.now();
        Ok(self.insert(job, now).await)
    }

    async fn schedule(&self, job: Job, run_at: DateTime<Utc>) -> Result<Uuid, SchedulerError> {
        Ok(self.insert(job, run_at).await)
    }
}

impl JobQueue for InMemoryJobQueue {
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<ScheduledJob>, SchedulerError> {
        let mut jobs = self.jobs.lock().await;
        let mut due: Vec<&mut ScheduledJob> = jobs
            .values_mut()
            .filter(|j| j.status == JobStatus::Pending && j.run_at <= now)
            .collect();
        due.sort_by_key(|j| (j.run_at, j.id));

        Ok(due
            .into_iter()
            .take(limit as usize)
            .map(|job| {
                job.status = JobStatus::Running;
                job.attempts += 1;
                job.claimed_at = Some(now);
                job.clone()
            })
            .collect())
    }

    async fn complete(&self, id: &Uuid) -> Result<(), SchedulerError> {
        self.set_status(id, JobStatus::Completed, None).await
    }

    async fn fail(&self, id: &Uuid, error: &str) -> Result<(), SchedulerError> {
        self.set_status(id, JobStatus::Failed, Some(error)).await
    }

    async fn requeue_stale(&self, claimed_before: DateTime<Utc>) -> Result<u64, SchedulerError> {
        let mut jobs = self.jobs.lock().await;
        let mut count = 0;
        for job in jobs.values_mut().filter(|j| {
            j.status == JobStatus::Running && j.claimed_at.is_some_and(|t| t < claimed_before)
        }) {
            job.status = JobStatus::Pending;
            job.claimed_at = None;
            count += 1;
        }
        Ok(count)
    }

    async fn pending_count(&self) -> Result<u64, SchedulerError> {
        let jobs = self.jobs.lock().await;
        Ok(jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .count() as u64)
    }
}

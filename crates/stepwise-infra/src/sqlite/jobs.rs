//! SQLite-backed durable job queue.
//!
//! Jobs live in the `scheduled_jobs` table with their `Job` payload encoded
//! as JSON. Claiming is a single `UPDATE ... RETURNING`, so two workers
//! sharing one database never claim the same job.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use stepwise_core::clock::{Clock, SystemClock};
use stepwise_core::jobs::{JobQueue, JobScheduler, SchedulerError};
use stepwise_types::job::{Job, JobStatus, ScheduledJob};
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, parse_optional_datetime, parse_uuid};

const JOB_COLUMNS: &str =
    "id, kind, payload, run_at, status, attempts, last_error, claimed_at, created_at";

/// Durable `JobQueue` stored in SQLite.
#[derive(Clone)]
pub struct SqliteJobQueue {
    pool: DatabasePool,
    clock: Arc<dyn Clock>,
}

impl SqliteJobQueue {
    pub fn new(pool: DatabasePool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    /// Use `clock` as the enqueue time source.
    pub fn with_clock(pool: DatabasePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// Look up one job by id.
    pub async fn get(&self, id: &Uuid) -> Result<Option<ScheduledJob>, SchedulerError> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM scheduled_jobs WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(storage_error)?;
        row.as_ref().map(job_from_row).transpose()
    }

    async fn insert(&self, job: Job, run_at: DateTime<Utc>) -> Result<Uuid, SchedulerError> {
        let record = ScheduledJob::new(job, run_at, self.clock.now());
        let payload = serde_json::to_string(&record.job)
            .map_err(|e| SchedulerError::InvalidJob(e.to_string()))?;

        sqlx::query(
            "INSERT INTO scheduled_jobs (id, kind, payload, run_at, status, attempts, created_at)
             VALUES (?, ?, ?, ?, ?, 0, ?)",
        )
        .bind(record.id.to_string())
        .bind(record.job.kind())
        .bind(payload)
        .bind(format_datetime(&record.run_at))
        .bind(JobStatus::Pending.to_string())
        .bind(format_datetime(&record.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(storage_error)?;

        tracing::debug!(job_id = %record.id, job = %record.job, run_at = %record.run_at, "job stored");
        Ok(record.id)
    }

    async fn finish(
        &self,
        id: &Uuid,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<(), SchedulerError> {
        let result = sqlx::query(
            "UPDATE scheduled_jobs SET status = ?, last_error = COALESCE(?, last_error) WHERE id = ?",
        )
        .bind(status.to_string())
        .bind(error)
        .bind(id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::Storage(format!("job {id} not found")));
        }
        Ok(())
    }
}

impl std::fmt::Debug for SqliteJobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteJobQueue").finish_non_exhaustive()
    }
}

fn storage_error(e: sqlx::Error) -> SchedulerError {
    SchedulerError::Storage(e.to_string())
}

fn job_from_row(row: &SqliteRow) -> Result<ScheduledJob, SchedulerError> {
    let get_str = |name: &str| -> Result<String, SchedulerError> {
        row.try_get(name).map_err(storage_error)
    };
    let invalid = |e: stepwise_types::error::RepositoryError| SchedulerError::InvalidJob(e.to_string());

    let payload = get_str("payload")?;
    let job: Job = serde_json::from_str(&payload)
        .map_err(|e| SchedulerError::InvalidJob(format!("payload: {e}")))?;
    let status = get_str("status")?
        .parse::<JobStatus>()
        .map_err(SchedulerError::InvalidJob)?;
    let attempts: i64 = row.try_get("attempts").map_err(storage_error)?;

    Ok(ScheduledJob {
        id: parse_uuid(&get_str("id")?).map_err(invalid)?,
        job,
        run_at: parse_datetime(&get_str("run_at")?).map_err(invalid)?,
        status,
        attempts: attempts as u32,
        last_error: row.try_get("last_error").map_err(storage_error)?,
        claimed_at: parse_optional_datetime(row.try_get("claimed_at").map_err(storage_error)?)
            .map_err(invalid)?,
        created_at: parse_datetime(&get_str("created_at")?).map_err(invalid)?,
    })
}

impl JobScheduler for SqliteJobQueue {
    async fn enqueue(&self, job: Job) -> Result<Uuid, SchedulerError> {
        let now = self.clock.now();
        self.insert(job, now).await
    }

    async fn schedule(&self, job: Job, run_at: DateTime<Utc>) -> Result<Uuid, SchedulerError> {
        self.insert(job, run_at).await
    }
}

impl JobQueue for SqliteJobQueue {
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<ScheduledJob>, SchedulerError> {
        let sql = format!(
            "UPDATE scheduled_jobs
             SET status = 'running', attempts = attempts + 1, claimed_at = ?1
             WHERE id IN (
                 SELECT id FROM scheduled_jobs
                 WHERE status = 'pending' AND run_at <= ?1
                 ORDER BY run_at ASC, id ASC
                 LIMIT ?2
             )
             RETURNING {JOB_COLUMNS}"
        );
        let rows = sqlx::query(&sql)
            .bind(format_datetime(&now))
            .bind(limit as i64)
            .fetch_all(&self.pool.writer)
            .await
            .map_err(storage_error)?;

        // RETURNING order is unspecified.
        let mut jobs = rows.iter().map(job_from_row).collect::<Result<Vec<_>, _>>()?;
        jobs.sort_by_key(|j| (j.run_at, j.id));
        Ok(jobs)
    }

    async fn complete(&self, id: &Uuid) -> Result<(), SchedulerError> {
        self.finish(id, JobStatus::Completed, None).await
    }

    async fn fail(&self, id: &Uuid, error: &str) -> Result<(), SchedulerError> {
        self.finish(id, JobStatus::Failed, Some(error)).await
    }

    async fn requeue_stale(&self, claimed_before: DateTime<Utc>) -> Result<u64, SchedulerError> {
        let result = sqlx::query(
            "UPDATE scheduled_jobs SET status = 'pending', claimed_at = NULL
             WHERE status = 'running' AND claimed_at < ?",
        )
        .bind(format_datetime(&claimed_before))
        .execute(&self.pool.writer)
        .await
        .map_err(storage_error)?;

        let count = result.rows_affected();
        if count > 0 {
            tracing::warn!(count, "requeued stale jobs");
        }
        Ok(count)
    }

    async fn pending_count(&self) -> Result<u64, SchedulerError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM scheduled_jobs WHERE status = 'pending'")
                .fetch_one(&self.pool.reader)
                .await
                .map_err(storage_error)?;
        Ok(count as u64)
    }
}

//! Job worker: polls a `JobQueue` and dispatches due jobs to a handler.
//!
//! Jobs run concurrently in a `JoinSet`, bounded by a semaphore sized from
//! `WorkerConfig::max_concurrent_jobs`. A handler error marks the job Failed;
//! there is no queue-level retry (steps carry their own retry policy).

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use stepwise_types::config::WorkerConfig;
use stepwise_types::job::{Job, ScheduledJob};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::clock::{Clock, SystemClock};

use super::scheduler::{JobQueue, SchedulerError};

/// Executes jobs claimed by a `JobWorker`.
pub trait JobHandler: Send + Sync + 'static {
    type Error: std::fmt::Display + Send;

    fn handle(&self, job: Job) -> impl std::future::Future<Output = Result<(), Self::Error>> + Send;
}

/// Polling worker over a `JobQueue`.
pub struct JobWorker<Q: JobQueue, H: JobHandler> {
    queue: Arc<Q>,
    handler: Arc<H>,
    config: WorkerConfig,
    clock: Arc<dyn Clock>,
}

impl<Q: JobQueue + 'static, H: JobHandler> JobWorker<Q, H> {
    pub fn new(queue: Arc<Q>, handler: Arc<H>, config: WorkerConfig) -> Self {
        Self {
            queue,
            handler,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Use `clock` to decide which jobs are due.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Poll until `cancel` fires, then wait for in-flight jobs.
    ///
    /// Jobs left Running by a previous process are requeued first.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), SchedulerError> {
        self.recover_stale().await?;

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms.max(1));
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_jobs.max(1)));
        let mut tasks: JoinSet<()> = JoinSet::new();

        tracing::info!(
            poll_interval_ms = self.config.poll_interval_ms,
            max_concurrent_jobs = self.config.max_concurrent_jobs,
            "job worker started"
        );

        while !cancel.is_cancelled() {
            while let Some(result) = tasks.try_join_next() {
                if let Err(e) = result {
                    tracing::error!(error = %e, "job task panicked");
                }
            }

            let capacity = semaphore.available_permits().min(self.config.batch_size as usize);
            if capacity > 0 {
                match self.queue.claim_due(self.clock.now(), capacity as u32).await {
                    Ok(jobs) => {
                        for job in jobs {
                            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                                break;
                            };
                            let queue = Arc::clone(&self.queue);
                            let handler = Arc::clone(&self.handler);
                            tasks.spawn(async move {
                                execute_job(queue.as_ref(), handler.as_ref(), job).await;
                                drop(permit);
                            });
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "failed to claim due jobs"),
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }

        tracing::info!(in_flight = tasks.len(), "job worker stopping");
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "job task panicked");
            }
        }
        Ok(())
    }

    /// Run every job due at the clock's current time, one at a time, until
    /// none remain. Jobs enqueued by handlers are picked up in the same call.
    /// Returns the number of jobs executed.
    pub async fn run_due(&self) -> Result<usize, SchedulerError> {
        let mut executed = 0;
        loop {
            let jobs = self
                .queue
                .claim_due(self.clock.now(), self.config.batch_size.max(1))
                .await?;
            if jobs.is_empty() {
                return Ok(executed);
            }
            for job in jobs {
                execute_job(self.queue.as_ref(), self.handler.as_ref(), job).await;
                executed += 1;
            }
        }
    }

    async fn recover_stale(&self) -> Result<(), SchedulerError> {
        let timeout = ChronoDuration::seconds(self.config.stale_job_timeout_secs as i64);
        let requeued = self.queue.requeue_stale(self.clock.now() - timeout).await?;
        if requeued > 0 {
            tracing::warn!(requeued, "requeued jobs orphaned by a previous worker");
        }
        Ok(())
    }
}

async fn execute_job<Q: JobQueue, H: JobHandler>(queue: &Q, handler: &H, scheduled: ScheduledJob) {
    let job_id = scheduled.id;
    tracing::debug!(job_id = %job_id, job = %scheduled.job, attempts = scheduled.attempts, "running job");

    let ack = match handler.handle(scheduled.job).await {
        Ok(()) => queue.complete(&job_id).await,
        Err(e) => {
            let message = e.to_string();
            tracing::error!(job_id = %job_id, job = %scheduled.job, error = %message, "job failed");
            queue.fail(&job_id, &message).await
        }
    };
    if let Err(e) = ack {
        tracing::warn!(job_id = %job_id, error = %e, "failed to record job outcome");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::jobs::memory::InMemoryJobQueue;
    use crate::jobs::scheduler::JobScheduler;
    use chrono::Utc;
    use std::sync::Mutex;
    use stepwise_types::job::JobStatus;
    use uuid::Uuid;

    /// Records handled jobs; fails any job targeting `poison`. The first
    /// job it sees enqueues one follow-up job.
    struct RecordingHandler {
        seen: Mutex<Vec<Job>>,
        poison: Option<Uuid>,
        follow_up: Mutex<Option<(InMemoryJobQueue, Job)>>,
    }

    impl RecordingHandler {
        fn new(poison: Option<Uuid>) -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
                poison,
                follow_up: Mutex::new(None),
            }
        }

        fn seen(&self) -> Vec<Job> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl JobHandler for RecordingHandler {
        type Error = String;

        async fn handle(&self, job: Job) -> Result<(), String> {
            self.seen.lock().unwrap().push(job);
            let follow_up = self.follow_up.lock().unwrap().take();
            if let Some((queue, next)) = follow_up {
                queue.enqueue(next).await.map_err(|e| e.to_string())?;
            }
            if Some(job.target_id()) == self.poison {
                return Err("poisoned".to_string());
            }
            Ok(())
        }
    }

    fn config() -> WorkerConfig {
        WorkerConfig {
            poll_interval_ms: 10,
            batch_size: 4,
            max_concurrent_jobs: 2,
            stale_job_timeout_secs: 60,
        }
    }

    #[tokio::test]
    async fn run_due_drains_follow_up_jobs() {
        let clock = ManualClock::new(Utc::now());
        let queue = InMemoryJobQueue::with_clock(Arc::new(clock.clone()));
        let first = Job::ProcessWorkflow {
            execution_id: Uuid::now_v7(),
        };
        let second = Job::ProcessStep {
            step_execution_id: Uuid::now_v7(),
        };
        queue.enqueue(first).await.unwrap();

        let handler = Arc::new(RecordingHandler::new(None));
        *handler.follow_up.lock().unwrap() = Some((queue.clone(), second));

        let worker = JobWorker::new(Arc::new(queue.clone()), Arc::clone(&handler), config())
            .with_clock(Arc::new(clock));
        assert_eq!(worker.run_due().await.unwrap(), 2);
        assert_eq!(handler.seen(), vec![first, second]);
        assert!(queue.jobs().await.iter().all(|j| j.status == JobStatus::Completed));
    }

    #[tokio::test]
    async fn run_due_waits_for_future_jobs() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        let queue = InMemoryJobQueue::with_clock(Arc::new(clock.clone()));
        let job = Job::ProcessWorkflow {
            execution_id: Uuid::now_v7(),
        };
        queue
            .schedule(job, start + ChronoDuration::minutes(2))
            .await
            .unwrap();

        let handler = Arc::new(RecordingHandler::new(None));
        let worker = JobWorker::new(Arc::new(queue), Arc::clone(&handler), config())
            .with_clock(Arc::new(clock.clone()));

        assert_eq!(worker.run_due().await.unwrap(), 0);
        clock.advance(ChronoDuration::minutes(2));
        assert_eq!(worker.run_due().await.unwrap(), 1);
        assert_eq!(handler.seen(), vec![job]);
    }

    #[tokio::test]
    async fn handler_error_marks_job_failed() {
        let target = Uuid::now_v7();
        let queue = InMemoryJobQueue::new();
        queue
            .schedule(Job::ProcessWorkflow { execution_id: target }, Utc::now())
            .await
            .unwrap();

        let worker = JobWorker::new(
            Arc::new(queue.clone()),
            Arc::new(RecordingHandler::new(Some(target))),
            config(),
        );
        worker.run_due().await.unwrap();

        let jobs = queue.jobs().await;
        assert_eq!(jobs[0].status, JobStatus::Failed);
        assert_eq!(jobs[0].last_error.as_deref(), Some("poisoned"));
    }

    #[tokio::test]
    async fn run_stops_on_cancel_after_processing() {
        let queue = InMemoryJobQueue::new();
        for _ in 0..3 {
            queue
                .schedule(
                    Job::ProcessWorkflow {
                        execution_id: Uuid::now_v7(),
                    },
                    Utc::now(),
                )
                .await
                .unwrap();
        }
        let handler = Arc::new(RecordingHandler::new(None));
        let worker = Arc::new(JobWorker::new(
            Arc::new(queue.clone()),
            Arc::clone(&handler),
            config(),
        ));

        let cancel = CancellationToken::new();
        let task = {
            let worker = Arc::clone(&worker);
            let cancel = cancel.clone();
            tokio::spawn(async move { worker.run(cancel).await })
        };

        for _ in 0..200 {
            if handler.seen().len() == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.cancel();
        task.await.unwrap().unwrap();

        assert_eq!(handler.seen().len(), 3);
        assert_eq!(queue.pending_count().await.unwrap(), 0);
    }
}

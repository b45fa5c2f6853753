//! Application state wiring the engine to a backend.
//!
//! `AppState` holds the engine, the job queue its worker drains and the event
//! bus its notifications go to. It is generic over the repository and queue so
//! the same commands run against SQLite or the in-memory `--ephemeral`
//! backend.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use stepwise_core::event::EventBus;
use stepwise_core::jobs::{InMemoryJobQueue, JobQueue, JobWorker};
use stepwise_core::repository::{InMemoryWorkflowRepository, WorkflowRepository};
use stepwise_core::step::StepRegistry;
use stepwise_core::workflow::{EventBusSink, WorkflowEngine, demo_workflow};
use stepwise_infra::sqlite::jobs::SqliteJobQueue;
use stepwise_infra::sqlite::pool::{DatabasePool, database_url_in};
use stepwise_infra::sqlite::workflow::SqliteWorkflowRepository;
use stepwise_types::config::GlobalConfig;

/// Capacity of the notification broadcast channel.
const EVENT_BUS_CAPACITY: usize = 256;

pub type SqliteState = AppState<SqliteWorkflowRepository, SqliteJobQueue>;
pub type EphemeralState = AppState<InMemoryWorkflowRepository, InMemoryJobQueue>;

/// Shared application state for CLI commands.
pub struct AppState<R: WorkflowRepository, Q: JobQueue> {
    pub engine: Arc<WorkflowEngine<R, Q>>,
    pub queue: Arc<Q>,
    pub events: EventBus,
    pub config: GlobalConfig,
}

impl<R, Q> AppState<R, Q>
where
    R: WorkflowRepository + 'static,
    Q: JobQueue + Clone + 'static,
{
    fn wire(repo: R, queue: Q, config: GlobalConfig) -> Self {
        let events = EventBus::new(EVENT_BUS_CAPACITY);
        let engine = WorkflowEngine::new(repo, queue.clone(), StepRegistry::with_builtin_steps())
            .with_notifier(Arc::new(EventBusSink::new(events.clone())))
            .with_config(config.engine.clone());

        Self {
            engine: Arc::new(engine),
            queue: Arc::new(queue),
            events,
            config,
        }
    }

    pub fn repo(&self) -> &R {
        self.engine.repository()
    }

    /// A worker draining this state's queue into its engine.
    pub fn worker(&self) -> JobWorker<Q, WorkflowEngine<R, Q>> {
        JobWorker::new(
            Arc::clone(&self.queue),
            Arc::clone(&self.engine),
            self.config.worker.clone(),
        )
    }
}

impl SqliteState {
    /// Open (creating if needed) the SQLite database for `data_dir`.
    pub async fn open(data_dir: &Path, config: GlobalConfig) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(data_dir)
            .await
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

        let db_url = config
            .database_url
            .clone()
            .unwrap_or_else(|| database_url_in(data_dir));
        let pool = DatabasePool::new(&db_url)
            .await
            .with_context(|| format!("Failed to open database {db_url}"))?;
        tracing::debug!(database = %db_url, "opened database");

        Ok(Self::wire(
            SqliteWorkflowRepository::new(pool.clone()),
            SqliteJobQueue::new(pool),
            config,
        ))
    }
}

impl EphemeralState {
    /// In-memory store and queue, seeded with the demo workflow so a single
    /// invocation has something to run.
    pub async fn ephemeral(config: GlobalConfig) -> anyhow::Result<Self> {
        let state = Self::wire(InMemoryWorkflowRepository::new(), InMemoryJobQueue::new(), config);
        demo_workflow()
            .save(state.repo())
            .await
            .context("Failed to seed the demo workflow")?;
        Ok(state)
    }
}

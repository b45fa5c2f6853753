//! The workflow engine: shared state, error type and job dispatch.
//!
//! `WorkflowEngine` ties a repository, a job scheduler, the step registry and
//! a notification sink together. Its behaviour is split across sibling
//! modules:
//! - `lifecycle` -- start, status, cancel, pause, resume
//! - `driver` -- advances an execution by at most one step per invocation
//! - `processor` -- runs one step execution
//!
//! The engine holds no per-execution state in memory. Every invocation reads
//! fresh rows at entry and writes them back before returning, so any process
//! can pick up any job after a restart.

use std::sync::Arc;

use stepwise_types::config::EngineConfig;
use stepwise_types::error::RepositoryError;
use stepwise_types::execution::{StepExecution, WorkflowExecution};
use stepwise_types::job::Job;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::jobs::{JobHandler, JobScheduler, SchedulerError};
use crate::repository::WorkflowRepository;
use crate::step::StepRegistry;

use super::notify::{NoopNotificationSink, NotificationSink, NotifyError};

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

/// Errors surfaced by engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Missing or inactive workflow definition.
    #[error("workflow definition {0} not found or inactive")]
    WorkflowNotFound(Uuid),

    #[error("workflow execution {0} not found")]
    ExecutionNotFound(Uuid),

    #[error("step execution {0} not found")]
    StepExecutionNotFound(Uuid),

    #[error("unknown step type '{0}'")]
    UnknownStepType(String),

    #[error("invalid workflow definition: {0}")]
    InvalidDefinition(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl EngineError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EngineError::WorkflowNotFound(_)
                | EngineError::ExecutionNotFound(_)
                | EngineError::StepExecutionNotFound(_)
                | EngineError::Repository(RepositoryError::NotFound)
        )
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Serialization(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// WorkflowEngine
// ---------------------------------------------------------------------------

/// Durable workflow engine.
///
/// Generic over `R: WorkflowRepository` and `J: JobScheduler` for storage
/// and scheduling flexibility.
pub struct WorkflowEngine<R: WorkflowRepository, J: JobScheduler> {
    pub(super) repo: R,
    pub(super) scheduler: J,
    pub(super) registry: Arc<StepRegistry>,
    pub(super) notifier: Arc<dyn NotificationSink>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) config: EngineConfig,
}

impl<R: WorkflowRepository, J: JobScheduler> WorkflowEngine<R, J> {
    /// Engine with no notification sink, the system clock and default config.
    pub fn new(repo: R, scheduler: J, registry: StepRegistry) -> Self {
        Self {
            repo,
            scheduler,
            registry: Arc::new(registry),
            notifier: Arc::new(NoopNotificationSink),
            clock: Arc::new(SystemClock),
            config: EngineConfig::default(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn scheduler(&self) -> &J {
        &self.scheduler
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    // -----------------------------------------------------------------------
    // Notification helpers (failures logged, never propagated)
    // -----------------------------------------------------------------------

    fn notify(&self, event: &'static str, result: Result<(), NotifyError>) {
        if let Err(e) = result {
            tracing::warn!(event, error = %e, "notification failed");
        }
    }

    pub(super) fn notify_started(&self, execution: &WorkflowExecution, workflow_name: &str) {
        self.notify(
            "execution_started",
            self.notifier.execution_started(execution, workflow_name),
        );
    }

    pub(super) fn notify_status(&self, execution: &WorkflowExecution) {
        self.notify(
            "workflow_status_changed",
            self.notifier.workflow_status_changed(execution),
        );
    }

    pub(super) fn notify_step(&self, step: &StepExecution, step_name: &str) {
        self.notify(
            "step_status_changed",
            self.notifier.step_status_changed(step, step_name),
        );
    }

    pub(super) fn notify_completed(&self, execution: &WorkflowExecution) {
        self.notify(
            "execution_completed",
            self.notifier.execution_completed(execution),
        );
    }
}

// ---------------------------------------------------------------------------
// Job dispatch
// ---------------------------------------------------------------------------

impl<R, J> JobHandler for WorkflowEngine<R, J>
where
    R: WorkflowRepository + 'static,
    J: JobScheduler + 'static,
{
    type Error = EngineError;

    /// Route a job to the driver or the processor.
    ///
    /// A step callback that changed its step's state is followed by a driver
    /// job, so executions keep advancing after delayed starts and retries.
    async fn handle(&self, job: Job) -> Result<(), EngineError> {
        match job {
            Job::ProcessWorkflow { execution_id } => {
                self.process_workflow(execution_id).await;
            }
            Job::ProcessStep { step_execution_id } => {
                let disposition = self.process_step(step_execution_id).await;
                if let Some(execution_id) = disposition.advanced_execution() {
                    self.scheduler
                        .enqueue(Job::ProcessWorkflow { execution_id })
                        .await?;
                }
            }
        }
        Ok(())
    }
}

//! Execution lifecycle operations: start, status, cancel, pause, resume.
//!
//! These are the synchronous entry points. None of them runs a step; they
//! create or flip persisted state and hand the actual work to the job
//! scheduler. Cancel and pause are cooperative: jobs already queued will see
//! the new status when they fire and do nothing.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use stepwise_types::execution::{
    ExecutionView, StepExecution, WorkflowExecution, WorkflowExecutionStatus,
};
use stepwise_types::job::Job;
use uuid::Uuid;

use crate::jobs::JobScheduler;
use crate::repository::WorkflowRepository;

use super::engine::{EngineError, WorkflowEngine};

impl<R: WorkflowRepository, J: JobScheduler> WorkflowEngine<R, J> {
    /// Create an execution of an active workflow definition and schedule its driver.
    ///
    /// With a future `scheduled_time` the execution starts Pending and the
    /// driver fires at that time; otherwise it starts Running and the driver
    /// is enqueued immediately. Each step's scheduled time is the execution's
    /// scheduled time plus the step's delay, or unset without a schedule.
    pub async fn start(
        &self,
        workflow_definition_id: Uuid,
        input_data: Option<Value>,
        scheduled_time: Option<DateTime<Utc>>,
    ) -> Result<Uuid, EngineError> {
        let graph = self
            .repo
            .get_workflow_graph(&workflow_definition_id)
            .await?
            .filter(|g| g.definition.is_active)
            .ok_or(EngineError::WorkflowNotFound(workflow_definition_id))?;

        let now = self.clock.now();
        let status = match scheduled_time {
            Some(at) if at > now => WorkflowExecutionStatus::Pending,
            _ => WorkflowExecutionStatus::Running,
        };
        let mut execution = WorkflowExecution::new(
            workflow_definition_id,
            status,
            input_data,
            scheduled_time,
            now,
        );
        if status == WorkflowExecutionStatus::Running {
            execution.started_time = Some(now);
        }

        let steps: Vec<StepExecution> = graph
            .steps
            .iter()
            .map(|detail| {
                StepExecution::pending(
                    execution.id,
                    detail.step.id,
                    scheduled_time.map(|at| at + Duration::minutes(detail.step.delay_minutes as i64)),
                    self.config.default_max_retries,
                    now,
                )
            })
            .collect();

        self.repo.create_execution(&execution, &steps).await?;

        let job = Job::ProcessWorkflow {
            execution_id: execution.id,
        };
        match scheduled_time {
            Some(at) => self.scheduler.schedule(job, at).await?,
            None => self.scheduler.enqueue(job).await?,
        };

        tracing::info!(
            workflow_definition_id = %workflow_definition_id,
            execution_id = %execution.id,
            status = %execution.status,
            steps = steps.len(),
            "started workflow execution"
        );
        self.notify_started(&execution, &graph.definition.name);

        Ok(execution.id)
    }

    /// Current state of an execution with its steps in order.
    pub async fn get_status(&self, execution_id: Uuid) -> Result<ExecutionView, EngineError> {
        let graph = self
            .repo
            .load_execution_graph(&execution_id)
            .await?
            .ok_or(EngineError::ExecutionNotFound(execution_id))?;
        Ok(ExecutionView::from(&graph))
    }

    /// Cancel a non-terminal execution. Returns `false` if it is absent or
    /// already Completed, Failed or Cancelled.
    pub async fn cancel(&self, execution_id: Uuid) -> Result<bool, EngineError> {
        let Some(mut execution) = self.repo.get_execution(&execution_id).await? else {
            return Ok(false);
        };
        if execution.status.is_terminal() {
            return Ok(false);
        }

        let loaded = execution.status;
        execution.status = WorkflowExecutionStatus::Cancelled;
        execution.completed_time = Some(self.clock.now());
        if !self.repo.update_execution_if(&execution, loaded).await? {
            return Ok(false);
        }

        tracing::info!(execution_id = %execution_id, "cancelled workflow execution");
        self.notify_status(&execution);
        Ok(true)
    }

    /// Pause a Running execution. Returns `false` for any other status.
    pub async fn pause(&self, execution_id: Uuid) -> Result<bool, EngineError> {
        self.transition(
            execution_id,
            WorkflowExecutionStatus::Running,
            WorkflowExecutionStatus::Paused,
        )
        .await
    }

    /// Resume a Paused execution and enqueue its driver. Returns `false` for
    /// any other status.
    pub async fn resume(&self, execution_id: Uuid) -> Result<bool, EngineError> {
        let resumed = self
            .transition(
                execution_id,
                WorkflowExecutionStatus::Paused,
                WorkflowExecutionStatus::Running,
            )
            .await?;
        if resumed {
            self.scheduler
                .enqueue(Job::ProcessWorkflow { execution_id })
                .await?;
        }
        Ok(resumed)
    }

    async fn transition(
        &self,
        execution_id: Uuid,
        from: WorkflowExecutionStatus,
        to: WorkflowExecutionStatus,
    ) -> Result<bool, EngineError> {
        let Some(mut execution) = self.repo.get_execution(&execution_id).await? else {
            return Ok(false);
        };
        if execution.status != from {
            return Ok(false);
        }

        execution.status = to;
        if !self.repo.update_execution_if(&execution, from).await? {
            return Ok(false);
        }

        tracing::info!(execution_id = %execution_id, %from, %to, "workflow execution status changed");
        self.notify_status(&execution);
        Ok(true)
    }
}

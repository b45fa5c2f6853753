//! Workflow driver: advances one execution by at most one step.
//!
//! Each invocation loads the execution fresh, picks the lowest-order step
//! that has not finished, and either runs it (then enqueues its own
//! continuation), defers it to the step's scheduled time, or waits. When
//! every step has finished the execution is closed as Completed or Failed.
//! One step per invocation keeps every step boundary durable in the job
//! queue.
//!
//! Execution writes are guarded by the status the driver loaded, so a
//! concurrent cancel or pause is never overwritten.

use chrono::DateTime;
use chrono::Utc;
use serde_json::{Map, Value};
use stepwise_types::execution::{
    StepExecutionDetail, StepExecutionStatus, WorkflowExecution, WorkflowExecutionStatus,
};
use stepwise_types::job::Job;
use uuid::Uuid;

use crate::jobs::JobScheduler;
use crate::repository::WorkflowRepository;

use super::engine::{EngineError, WorkflowEngine};

/// What a driver invocation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverOutcome {
    /// The execution does not exist.
    Missing,
    /// Terminal or paused; nothing was touched.
    Inactive,
    /// The next step is running or otherwise in flight.
    Waiting,
    /// The next step is Pending but not due yet; a step callback was scheduled.
    Deferred {
        step_execution_id: Uuid,
        run_at: DateTime<Utc>,
    },
    /// One step was processed and the driver re-enqueued.
    Advanced { step_execution_id: Uuid },
    Completed,
    Failed,
}

impl<R: WorkflowRepository, J: JobScheduler> WorkflowEngine<R, J> {
    /// Advance an execution. Never returns an error: failures inside the
    /// invocation mark the execution Failed.
    pub async fn process_workflow(&self, execution_id: Uuid) -> DriverOutcome {
        match self.drive(execution_id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(execution_id = %execution_id, error = %e, "workflow driver failed");
                self.fail_execution(execution_id, &e.to_string()).await;
                DriverOutcome::Failed
            }
        }
    }

    async fn drive(&self, execution_id: Uuid) -> Result<DriverOutcome, EngineError> {
        let Some(graph) = self.repo.load_execution_graph(&execution_id).await? else {
            tracing::warn!(execution_id = %execution_id, "workflow execution not found");
            return Ok(DriverOutcome::Missing);
        };
        let mut execution = graph.execution;

        match execution.status {
            WorkflowExecutionStatus::Completed
            | WorkflowExecutionStatus::Failed
            | WorkflowExecutionStatus::Cancelled
            | WorkflowExecutionStatus::Paused => {
                tracing::debug!(execution_id = %execution_id, status = %execution.status, "execution inactive, skipping");
                return Ok(DriverOutcome::Inactive);
            }
            WorkflowExecutionStatus::Pending => {
                execution.status = WorkflowExecutionStatus::Running;
                execution.started_time = Some(self.clock.now());
                if !self
                    .repo
                    .update_execution_if(&execution, WorkflowExecutionStatus::Pending)
                    .await?
                {
                    tracing::debug!(execution_id = %execution_id, "execution changed before start, skipping");
                    return Ok(DriverOutcome::Inactive);
                }
                self.notify_status(&execution);
            }
            WorkflowExecutionStatus::Running => {}
        }

        let next = graph
            .steps
            .iter()
            .filter(|s| !s.execution.status.is_terminal())
            .min_by_key(|s| s.step.order);

        let Some(next) = next else {
            return self.finish(execution, &graph.steps).await;
        };

        let step_execution_id = next.execution.id;
        if !next.execution.status.is_runnable() {
            tracing::debug!(
                execution_id = %execution_id,
                step_execution_id = %step_execution_id,
                status = %next.execution.status,
                "next step in flight, waiting"
            );
            return Ok(DriverOutcome::Waiting);
        }

        let now = self.clock.now();
        if let Some(run_at) = next.execution.scheduled_time.filter(|at| *at > now) {
            if next.execution.status == StepExecutionStatus::Retrying {
                // The processor scheduled this retry's callback when it failed.
                tracing::debug!(
                    execution_id = %execution_id,
                    step_execution_id = %step_execution_id,
                    run_at = %run_at,
                    "step retry not due, waiting"
                );
                return Ok(DriverOutcome::Waiting);
            }
            self.scheduler
                .schedule(Job::ProcessStep { step_execution_id }, run_at)
                .await?;
            tracing::debug!(
                execution_id = %execution_id,
                step_execution_id = %step_execution_id,
                run_at = %run_at,
                "step not due, callback scheduled"
            );
            return Ok(DriverOutcome::Deferred {
                step_execution_id,
                run_at,
            });
        }

        self.process_step(step_execution_id).await;
        self.scheduler
            .enqueue(Job::ProcessWorkflow { execution_id })
            .await?;
        Ok(DriverOutcome::Advanced { step_execution_id })
    }

    /// Close an execution whose steps have all finished.
    async fn finish(
        &self,
        mut execution: WorkflowExecution,
        steps: &[StepExecutionDetail],
    ) -> Result<DriverOutcome, EngineError> {
        let all_succeeded = steps.iter().all(|s| {
            matches!(
                s.execution.status,
                StepExecutionStatus::Completed | StepExecutionStatus::Skipped
            )
        });
        let failed: Vec<&str> = steps
            .iter()
            .filter(|s| s.execution.status == StepExecutionStatus::Failed)
            .map(|s| s.definition.name.as_str())
            .collect();

        let now = self.clock.now();
        if all_succeeded {
            let mut output = Map::new();
            let mut ordered: Vec<&StepExecutionDetail> = steps.iter().collect();
            ordered.sort_by_key(|s| s.step.order);
            for step in ordered {
                if step.execution.status != StepExecutionStatus::Completed {
                    continue;
                }
                if let Some(data) = &step.execution.output_data {
                    output.insert(step.definition.name.clone(), data.clone());
                }
            }

            execution.status = WorkflowExecutionStatus::Completed;
            execution.completed_time = Some(now);
            execution.output_data = Some(Value::Object(output));
            if !self.close(&execution).await? {
                return Ok(DriverOutcome::Inactive);
            }

            tracing::info!(execution_id = %execution.id, steps = steps.len(), "workflow execution completed");
            self.notify_completed(&execution);
            self.notify_status(&execution);
            return Ok(DriverOutcome::Completed);
        }

        if !failed.is_empty() {
            execution.status = WorkflowExecutionStatus::Failed;
            execution.completed_time = Some(now);
            execution.error_message = Some(failed.join(", "));
            if !self.close(&execution).await? {
                return Ok(DriverOutcome::Inactive);
            }

            tracing::warn!(
                execution_id = %execution.id,
                failed_steps = %failed.join(", "),
                "workflow execution failed"
            );
            self.notify_completed(&execution);
            self.notify_status(&execution);
            return Ok(DriverOutcome::Failed);
        }

        Ok(DriverOutcome::Waiting)
    }

    /// Write a finished execution unless it left Running meanwhile.
    async fn close(&self, execution: &WorkflowExecution) -> Result<bool, EngineError> {
        let closed = self
            .repo
            .update_execution_if(execution, WorkflowExecutionStatus::Running)
            .await?;
        if !closed {
            tracing::debug!(execution_id = %execution.id, "execution changed before close, skipping");
        }
        Ok(closed)
    }

    /// Best-effort: record a driver failure on the execution.
    async fn fail_execution(&self, execution_id: Uuid, error: &str) {
        let mut execution = match self.repo.get_execution(&execution_id).await {
            Ok(Some(execution)) => execution,
            Ok(None) => return,
            Err(e) => {
                tracing::error!(execution_id = %execution_id, error = %e, "could not load execution to record failure");
                return;
            }
        };
        if execution.status.is_terminal() {
            return;
        }

        let loaded = execution.status;
        execution.status = WorkflowExecutionStatus::Failed;
        execution.completed_time = Some(self.clock.now());
        execution.error_message = Some(error.to_string());
        match self.repo.update_execution_if(&execution, loaded).await {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                tracing::error!(execution_id = %execution_id, error = %e, "could not record execution failure");
                return;
            }
        }
        self.notify_completed(&execution);
        self.notify_status(&execution);
    }
}

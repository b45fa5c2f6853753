//! Step processor: runs a single step execution.
//!
//! Gate, validate, check preconditions, execute, then record the result:
//! Completed, Skipped, Failed, or Retrying with a scheduled callback. Any
//! error or panic after the step is marked Running fails the step; nothing
//! is propagated to the job scheduler.

use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use stepwise_types::execution::{
    StepExecution, StepExecutionGraph, StepExecutionStatus, WorkflowExecutionStatus,
};
use stepwise_types::job::Job;
use uuid::Uuid;

use crate::jobs::JobScheduler;
use crate::repository::WorkflowRepository;
use crate::step::StepOutcome;

use super::context::build_step_context;
use super::engine::{EngineError, WorkflowEngine};
use super::retry::{RetryDecision, RetryPolicy};

/// What a processor invocation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDisposition {
    /// The step execution (or its parent) does not exist, or could not be loaded.
    Missing,
    /// Already handled, not due yet, or the parent is not running.
    Ignored,
    /// The step ran and was left in `status`.
    Finished {
        execution_id: Uuid,
        status: StepExecutionStatus,
    },
}

impl StepDisposition {
    /// The owning execution, if this invocation changed step state.
    pub fn advanced_execution(&self) -> Option<Uuid> {
        match self {
            StepDisposition::Finished { execution_id, .. } => Some(*execution_id),
            _ => None,
        }
    }
}

impl<R: WorkflowRepository, J: JobScheduler> WorkflowEngine<R, J> {
    /// Run one step execution if it is runnable.
    pub async fn process_step(&self, step_execution_id: Uuid) -> StepDisposition {
        let graph = match self.repo.load_step_graph(&step_execution_id).await {
            Ok(Some(graph)) => graph,
            Ok(None) => {
                tracing::warn!(step_execution_id = %step_execution_id, "step execution not found");
                return StepDisposition::Missing;
            }
            Err(e) => {
                tracing::error!(step_execution_id = %step_execution_id, error = %e, "failed to load step execution");
                return StepDisposition::Missing;
            }
        };

        let mut step = graph.step.execution.clone();
        let step_name = graph.step.definition.name.clone();
        let execution_id = graph.parent.id;

        if !step.status.is_runnable() {
            tracing::debug!(step_execution_id = %step.id, status = %step.status, "step not runnable, skipping");
            return StepDisposition::Ignored;
        }
        if graph.parent.status == WorkflowExecutionStatus::Paused || graph.parent.status.is_terminal() {
            tracing::debug!(
                step_execution_id = %step.id,
                execution_status = %graph.parent.status,
                "execution not running, skipping step"
            );
            return StepDisposition::Ignored;
        }
        let now = self.clock.now();
        if step.scheduled_time.is_some_and(|at| at > now) {
            tracing::debug!(step_execution_id = %step.id, "step not due yet, skipping");
            return StepDisposition::Ignored;
        }

        // Claim the step: only the delivery that moves it out of its loaded
        // status runs the handler.
        let loaded = step.status;
        step.status = StepExecutionStatus::Running;
        step.started_time = Some(now);
        match self.repo.update_step_execution_if(&step, loaded).await {
            Ok(true) => self.notify_step(&step, &step_name),
            Ok(false) => {
                tracing::debug!(step_execution_id = %step.id, "step claimed by another delivery, skipping");
                return StepDisposition::Ignored;
            }
            Err(e) => {
                tracing::error!(step_execution_id = %step.id, error = %e, "failed to mark step running");
                return StepDisposition::Missing;
            }
        }

        let run = AssertUnwindSafe(self.run_step(&graph, &mut step, &step_name))
            .catch_unwind()
            .await;
        let failure = match run {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(panic) => Some(panic_message(panic.as_ref())),
        };

        if let Some(error) = failure {
            tracing::error!(step_execution_id = %step.id, step = %step_name, error = %error, "step failed unexpectedly");
            step.status = StepExecutionStatus::Failed;
            step.completed_time = Some(self.clock.now());
            step.output_data = None;
            step.error_message = Some(error);
            if let Err(e) = self.save_step(&step, &step_name).await {
                tracing::error!(step_execution_id = %step.id, error = %e, "failed to record step failure");
            }
        }

        StepDisposition::Finished {
            execution_id,
            status: step.status,
        }
    }

    /// Resolve the handler, build the context, run it and persist the result.
    async fn run_step(
        &self,
        graph: &StepExecutionGraph,
        step: &mut StepExecution,
        step_name: &str,
    ) -> Result<(), EngineError> {
        let step_type = &graph.step.definition.step_type;
        let handler = self
            .registry
            .create(step_type)
            .ok_or_else(|| EngineError::UnknownStepType(step_type.clone()))?;

        let prior = self
            .repo
            .list_prior_outputs(&graph.parent.id, graph.step.order())
            .await?;
        let ctx = build_step_context(&graph.parent, &graph.step, &prior);

        if let Err(e) = handler.validate_input(&ctx).await {
            step.status = StepExecutionStatus::Failed;
            step.completed_time = Some(self.clock.now());
            step.error_message = Some(format!("Input validation failed: {e}"));
            tracing::warn!(step_execution_id = %step.id, step = step_name, error = %e, "step input invalid");
            return self.save_step(step, step_name).await;
        }

        if !handler.can_execute(&ctx).await {
            step.status = StepExecutionStatus::Skipped;
            step.completed_time = Some(self.clock.now());
            step.error_message = Some("Step conditions not met".to_string());
            tracing::info!(step_execution_id = %step.id, step = step_name, "step skipped");
            return self.save_step(step, step_name).await;
        }

        match handler.execute(&ctx).await {
            StepOutcome::Success { output } => {
                step.status = StepExecutionStatus::Completed;
                step.completed_time = Some(self.clock.now());
                step.output_data = output;
                step.error_message = None;
                tracing::info!(step_execution_id = %step.id, step = step_name, step_type = %step_type, "step completed");
                self.save_step(step, step_name).await
            }
            StepOutcome::Failure {
                error,
                retry,
                retry_delay,
            } => {
                let now = self.clock.now();
                match RetryPolicy::decide(retry, step.retry_count, step.max_retries, retry_delay, now) {
                    RetryDecision::Retry {
                        retry_count,
                        scheduled_time,
                    } => {
                        step.status = StepExecutionStatus::Retrying;
                        step.retry_count = retry_count;
                        step.scheduled_time = Some(scheduled_time);
                        step.error_message = Some(error);
                        self.save_step(step, step_name).await?;
                        self.scheduler
                            .schedule(
                                Job::ProcessStep {
                                    step_execution_id: step.id,
                                },
                                scheduled_time,
                            )
                            .await?;
                        tracing::warn!(
                            step_execution_id = %step.id,
                            step = step_name,
                            retry_count,
                            max_retries = step.max_retries,
                            scheduled_time = %scheduled_time,
                            "step failed, retry scheduled"
                        );
                        Ok(())
                    }
                    RetryDecision::Fail => {
                        step.status = StepExecutionStatus::Failed;
                        step.completed_time = Some(now);
                        step.error_message = Some(error);
                        tracing::warn!(
                            step_execution_id = %step.id,
                            step = step_name,
                            retry_count = step.retry_count,
                            "step failed"
                        );
                        self.save_step(step, step_name).await
                    }
                }
            }
        }
    }

    async fn save_step(&self, step: &StepExecution, step_name: &str) -> Result<(), EngineError> {
        self.repo.update_step_execution(step).await?;
        self.notify_step(step, step_name);
        Ok(())
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("step panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("step panicked: {s}")
    } else {
        "step panicked".to_string()
    }
}

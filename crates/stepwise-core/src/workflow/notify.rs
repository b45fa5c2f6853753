//! Notification sink: best-effort observers of execution progress.
//!
//! Calls are synchronous and must not block. The engine logs and discards
//! any error a sink returns; notifications never affect execution state.

use chrono::Utc;
use stepwise_types::event::WorkflowEvent;
use stepwise_types::execution::{StepExecution, WorkflowExecution};

use crate::event::EventBus;

/// Errors a sink may report. Always swallowed by the engine.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// One method per lifecycle event.
pub trait NotificationSink: Send + Sync {
    fn execution_started(
        &self,
        execution: &WorkflowExecution,
        workflow_name: &str,
    ) -> Result<(), NotifyError>;

    fn workflow_status_changed(&self, execution: &WorkflowExecution) -> Result<(), NotifyError>;

    fn step_status_changed(
        &self,
        step: &StepExecution,
        step_name: &str,
    ) -> Result<(), NotifyError>;

    /// Called when an execution reaches Completed or Failed.
    fn execution_completed(&self, execution: &WorkflowExecution) -> Result<(), NotifyError>;
}

/// Sink used when nobody is listening.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotificationSink;

impl NotificationSink for NoopNotificationSink {
    fn execution_started(&self, _: &WorkflowExecution, _: &str) -> Result<(), NotifyError> {
        Ok(())
    }

    fn workflow_status_changed(&self, _: &WorkflowExecution) -> Result<(), NotifyError> {
        Ok(())
    }

    fn step_status_changed(&self, _: &StepExecution, _: &str) -> Result<(), NotifyError> {
        Ok(())
    }

    fn execution_completed(&self, _: &WorkflowExecution) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Publishes every notification as a `WorkflowEvent` on an `EventBus`.
#[derive(Debug, Clone)]
pub struct EventBusSink {
    bus: EventBus,
}

impl EventBusSink {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }
}

impl NotificationSink for EventBusSink {
    fn execution_started(
        &self,
        execution: &WorkflowExecution,
        workflow_name: &str,
    ) -> Result<(), NotifyError> {
        self.bus.publish(WorkflowEvent::ExecutionStarted {
            execution_id: execution.id,
            workflow_definition_id: execution.workflow_definition_id,
            workflow_name: workflow_name.to_string(),
            status: execution.status,
            scheduled_time: execution.scheduled_time,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    fn workflow_status_changed(&self, execution: &WorkflowExecution) -> Result<(), NotifyError> {
        self.bus.publish(WorkflowEvent::WorkflowStatusChanged {
            execution_id: execution.id,
            status: execution.status,
            error_message: execution.error_message.clone(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    fn step_status_changed(
        &self,
        step: &StepExecution,
        step_name: &str,
    ) -> Result<(), NotifyError> {
        self.bus.publish(WorkflowEvent::StepStatusChanged {
            execution_id: step.workflow_execution_id,
            step_execution_id: step.id,
            step_name: step_name.to_string(),
            status: step.status,
            retry_count: step.retry_count,
            error_message: step.error_message.clone(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    fn execution_completed(&self, execution: &WorkflowExecution) -> Result<(), NotifyError> {
        let duration_ms = match (execution.started_time, execution.completed_time) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        };
        self.bus.publish(WorkflowEvent::ExecutionCompleted {
            execution_id: execution.id,
            status: execution.status,
            duration_ms,
            error_message: execution.error_message.clone(),
            timestamp: Utc::now(),
        });
        Ok(())
    }
}

//! Notification events emitted by the engine.
//!
//! `WorkflowEvent` is broadcast to observers as executions move through their
//! lifecycle. All variants are Clone + Send + Sync for use with tokio
//! broadcast channels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::execution::{StepExecutionStatus, WorkflowExecutionStatus};

/// Events emitted while executions progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// A new execution has been created.
    ExecutionStarted {
        execution_id: Uuid,
        workflow_definition_id: Uuid,
        workflow_name: String,
        status: WorkflowExecutionStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scheduled_time: Option<DateTime<Utc>>,
        timestamp: DateTime<Utc>,
    },

    /// An execution moved to a new status.
    WorkflowStatusChanged {
        execution_id: Uuid,
        status: WorkflowExecutionStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_message: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// A step execution moved to a new status.
    StepStatusChanged {
        execution_id: Uuid,
        step_execution_id: Uuid,
        step_name: String,
        status: StepExecutionStatus,
        retry_count: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_message: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// An execution reached Completed or Failed.
    ExecutionCompleted {
        execution_id: Uuid,
        status: WorkflowExecutionStatus,
        /// Wall time between start and completion, when both are known.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_message: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

impl WorkflowEvent {
    /// The execution this event concerns.
    pub fn execution_id(&self) -> Uuid {
        match self {
            WorkflowEvent::ExecutionStarted { execution_id, .. }
            | WorkflowEvent::WorkflowStatusChanged { execution_id, .. }
            | WorkflowEvent::StepStatusChanged { execution_id, .. }
            | WorkflowEvent::ExecutionCompleted { execution_id, .. } => *execution_id,
        }
    }
}

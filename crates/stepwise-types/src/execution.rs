//! Execution tracking types.
//!
//! A `WorkflowExecution` is one run of a workflow definition. It owns one
//! `StepExecution` per workflow step, created up front when the run starts.
//! Steps advance strictly in ascending `order`; the joined graph types below
//! are what the engine loads in a single read.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::workflow::{StepDefinition, WorkflowStep};

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

/// Lifecycle state of a workflow execution.
///
/// Completed, Failed and Cancelled are terminal. Paused is left only through
/// an explicit resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Paused,
}

impl WorkflowExecutionStatus {
    pub const ALL: [WorkflowExecutionStatus; 6] = [
        WorkflowExecutionStatus::Pending,
        WorkflowExecutionStatus::Running,
        WorkflowExecutionStatus::Completed,
        WorkflowExecutionStatus::Failed,
        WorkflowExecutionStatus::Cancelled,
        WorkflowExecutionStatus::Paused,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowExecutionStatus::Completed
                | WorkflowExecutionStatus::Failed
                | WorkflowExecutionStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowExecutionStatus::Pending => "pending",
            WorkflowExecutionStatus::Running => "running",
            WorkflowExecutionStatus::Completed => "completed",
            WorkflowExecutionStatus::Failed => "failed",
            WorkflowExecutionStatus::Cancelled => "cancelled",
            WorkflowExecutionStatus::Paused => "paused",
        }
    }
}

impl fmt::Display for WorkflowExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(WorkflowExecutionStatus::Pending),
            "running" => Ok(WorkflowExecutionStatus::Running),
            "completed" => Ok(WorkflowExecutionStatus::Completed),
            "failed" => Ok(WorkflowExecutionStatus::Failed),
            "cancelled" => Ok(WorkflowExecutionStatus::Cancelled),
            "paused" => Ok(WorkflowExecutionStatus::Paused),
            other => Err(format!("invalid workflow execution status: '{other}'")),
        }
    }
}

/// Lifecycle state of a single step execution.
///
/// Completed, Failed and Skipped are terminal. Retrying means a retry has
/// been scheduled for a later time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
    Retrying,
}

impl StepExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StepExecutionStatus::Completed
                | StepExecutionStatus::Failed
                | StepExecutionStatus::Skipped
        )
    }

    /// Pending or Retrying: the step is waiting for its turn to run.
    pub fn is_runnable(self) -> bool {
        matches!(
            self,
            StepExecutionStatus::Pending | StepExecutionStatus::Retrying
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StepExecutionStatus::Pending => "pending",
            StepExecutionStatus::Running => "running",
            StepExecutionStatus::Completed => "completed",
            StepExecutionStatus::Failed => "failed",
            StepExecutionStatus::Skipped => "skipped",
            StepExecutionStatus::Retrying => "retrying",
        }
    }
}

impl fmt::Display for StepExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(StepExecutionStatus::Pending),
            "running" => Ok(StepExecutionStatus::Running),
            "completed" => Ok(StepExecutionStatus::Completed),
            "failed" => Ok(StepExecutionStatus::Failed),
            "skipped" => Ok(StepExecutionStatus::Skipped),
            "retrying" => Ok(StepExecutionStatus::Retrying),
            other => Err(format!("invalid step execution status: '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Execution records
// ---------------------------------------------------------------------------

/// One run of a workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: Uuid,
    pub workflow_definition_id: Uuid,
    pub status: WorkflowExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_data: Option<serde_json::Value>,
    /// Output of the last completed step, set when the run completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl WorkflowExecution {
    pub fn new(
        workflow_definition_id: Uuid,
        status: WorkflowExecutionStatus,
        input_data: Option<serde_json::Value>,
        scheduled_time: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            workflow_definition_id,
            status,
            input_data,
            output_data: None,
            scheduled_time,
            started_time: None,
            completed_time: None,
            error_message: None,
            created_at: now,
        }
    }
}

/// One step of one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecution {
    pub id: Uuid,
    pub workflow_execution_id: Uuid,
    pub workflow_step_id: Uuid,
    pub status: StepExecutionStatus,
    /// The step's own input document, passed through to its handler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_data: Option<serde_json::Value>,
    /// Earliest time this step may run. Unset means "as soon as it is next".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
}

impl StepExecution {
    /// A fresh Pending step execution.
    pub fn pending(
        workflow_execution_id: Uuid,
        workflow_step_id: Uuid,
        scheduled_time: Option<DateTime<Utc>>,
        max_retries: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            workflow_execution_id,
            workflow_step_id,
            status: StepExecutionStatus::Pending,
            input_data: None,
            output_data: None,
            scheduled_time,
            started_time: None,
            completed_time: None,
            error_message: None,
            retry_count: 0,
            max_retries,
            created_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Joined graphs (single-read loads)
// ---------------------------------------------------------------------------

/// A step execution with its workflow step and step definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecutionDetail {
    pub execution: StepExecution,
    pub step: WorkflowStep,
    pub definition: StepDefinition,
}

impl StepExecutionDetail {
    pub fn order(&self) -> i32 {
        self.step.order
    }
}

/// An execution with every step execution, ascending by step order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionGraph {
    pub execution: WorkflowExecution,
    pub workflow_name: String,
    pub steps: Vec<StepExecutionDetail>,
}

/// A single step execution together with its parent execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecutionGraph {
    pub parent: WorkflowExecution,
    pub step: StepExecutionDetail,
}

/// Output of a completed earlier step, keyed by its step definition name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorStepOutput {
    pub step_name: String,
    pub order: i32,
    pub output: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Status views
// ---------------------------------------------------------------------------

/// Read-only projection of an execution returned by status queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionView {
    pub execution_id: Uuid,
    pub workflow_definition_id: Uuid,
    pub workflow_name: String,
    pub status: WorkflowExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub steps: Vec<StepExecutionView>,
}

/// Per-step part of an `ExecutionView`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecutionView {
    pub step_execution_id: Uuid,
    pub step_name: String,
    pub step_type: String,
    pub order: i32,
    pub status: StepExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
}

impl From<&StepExecutionDetail> for StepExecutionView {
    fn from(detail: &StepExecutionDetail) -> Self {
        let exec = &detail.execution;
        Self {
            step_execution_id: exec.id,
            step_name: detail.definition.name.clone(),
            step_type: detail.definition.step_type.clone(),
            order: detail.step.order,
            status: exec.status,
            input_data: exec.input_data.clone(),
            output_data: exec.output_data.clone(),
            scheduled_time: exec.scheduled_time,
            started_time: exec.started_time,
            completed_time: exec.completed_time,
            error_message: exec.error_message.clone(),
            retry_count: exec.retry_count,
            max_retries: exec.max_retries,
        }
    }
}

impl From<&ExecutionGraph> for ExecutionView {
    fn from(graph: &ExecutionGraph) -> Self {
        let exec = &graph.execution;
        let mut steps: Vec<StepExecutionView> =
            graph.steps.iter().map(StepExecutionView::from).collect();
        steps.sort_by_key(|s| s.order);
        Self {
            execution_id: exec.id,
            workflow_definition_id: exec.workflow_definition_id,
            workflow_name: graph.workflow_name.clone(),
            status: exec.status,
            input_data: exec.input_data.clone(),
            output_data: exec.output_data.clone(),
            scheduled_time: exec.scheduled_time,
            started_time: exec.started_time,
            completed_time: exec.completed_time,
            error_message: exec.error_message.clone(),
            steps,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

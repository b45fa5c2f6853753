//! Monitoring DTOs: paged execution listings and the dashboard summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::execution::WorkflowExecutionStatus;

/// Filter for execution listings. Unset fields do not filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<WorkflowExecutionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_definition_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_after: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_before: Option<DateTime<Utc>>,
}

impl ExecutionFilter {
    pub fn matches(&self, summary: &ExecutionSummary) -> bool {
        self.status.is_none_or(|s| s == summary.status)
            && self
                .workflow_definition_id
                .is_none_or(|id| id == summary.workflow_definition_id)
            && self.created_after.is_none_or(|t| summary.created_at >= t)
            && self.created_before.is_none_or(|t| summary.created_at <= t)
    }
}

/// One row of an execution listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub execution_id: Uuid,
    pub workflow_definition_id: Uuid,
    pub workflow_name: String,
    pub status: WorkflowExecutionStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub total_steps: u32,
    pub completed_steps: u32,
    pub failed_steps: u32,
}

impl ExecutionSummary {
    /// Minutes between start and completion, if both are set.
    pub fn duration_minutes(&self) -> Option<f64> {
        match (self.started_time, self.completed_time) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds() as f64 / 60_000.0),
            _ => None,
        }
    }
}

/// A page of execution summaries, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPage {
    pub executions: Vec<ExecutionSummary>,
    pub total_count: u64,
    /// 1-based page number.
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

/// Count of executions in one status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusCount {
    pub status: WorkflowExecutionStatus,
    pub count: u64,
    /// Share of all executions, 0-100.
    pub percentage: f64,
}

/// Throughput and outcome figures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub average_execution_minutes: f64,
    pub executions_last_24h: u64,
    pub executions_last_7d: u64,
    /// Percentage of finished executions that completed.
    pub success_rate: f64,
    /// Percentage of finished executions that failed.
    pub failure_rate: f64,
    /// Pending, Running or Paused executions.
    pub active_executions: u64,
}

/// Snapshot shown by the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    /// Active workflow definitions.
    pub total_workflows: u64,
    pub total_executions: u64,
    pub executions_by_status: Vec<StatusCount>,
    pub recent_executions: Vec<ExecutionSummary>,
    pub performance: PerformanceMetrics,
    pub generated_at: DateTime<Utc>,
}

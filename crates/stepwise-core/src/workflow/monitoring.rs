//! Read-only monitoring queries over a workflow repository.

use chrono::{DateTime, Duration, Utc};
use stepwise_types::execution::WorkflowExecutionStatus;
use stepwise_types::monitoring::{
    DashboardSummary, ExecutionFilter, ExecutionPage, PerformanceMetrics, StatusCount,
};

use crate::repository::WorkflowRepository;

use super::engine::EngineError;

const RECENT_EXECUTIONS: usize = 10;
const MAX_PAGE_SIZE: u32 = 100;

/// Execution listings and the dashboard summary.
pub struct MonitoringService<'a, R: WorkflowRepository> {
    repo: &'a R,
}

impl<'a, R: WorkflowRepository> MonitoringService<'a, R> {
    pub fn new(repo: &'a R) -> Self {
        Self { repo }
    }

    /// One page of matching executions, newest first. `page` is 1-based;
    /// `page_size` is clamped to 1..=100.
    pub async fn list_executions(
        &self,
        filter: &ExecutionFilter,
        page: u32,
        page_size: u32,
    ) -> Result<ExecutionPage, EngineError> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);

        let all = self.repo.list_execution_summaries(filter).await?;
        let total_count = all.len() as u64;
        let total_pages = total_count.div_ceil(page_size as u64) as u32;
        let executions = all
            .into_iter()
            .skip(((page - 1) * page_size) as usize)
            .take(page_size as usize)
            .collect();

        Ok(ExecutionPage {
            executions,
            total_count,
            page,
            page_size,
            total_pages,
        })
    }

    pub async fn dashboard(&self, now: DateTime<Utc>) -> Result<DashboardSummary, EngineError> {
        let total_workflows = self.repo.count_active_definitions().await?;
        let summaries = self
            .repo
            .list_execution_summaries(&ExecutionFilter::default())
            .await?;
        let total_executions = summaries.len() as u64;

        let count_of = |status: WorkflowExecutionStatus| {
            summaries.iter().filter(|s| s.status == status).count() as u64
        };

        let executions_by_status = WorkflowExecutionStatus::ALL
            .iter()
            .map(|&status| (status, count_of(status)))
            .filter(|(_, count)| *count > 0)
            .map(|(status, count)| StatusCount {
                status,
                count,
                percentage: percent(count, total_executions),
            })
            .collect();

        let completed = count_of(WorkflowExecutionStatus::Completed);
        let failed = count_of(WorkflowExecutionStatus::Failed);
        let finished = completed + failed;

        let durations: Vec<f64> = summaries.iter().filter_map(|s| s.duration_minutes()).collect();
        let average_execution_minutes = if durations.is_empty() {
            0.0
        } else {
            round2(durations.iter().sum::<f64>() / durations.len() as f64)
        };

        let performance = PerformanceMetrics {
            average_execution_minutes,
            executions_last_24h: self
                .repo
                .count_executions_since(now - Duration::hours(24))
                .await?,
            executions_last_7d: self
                .repo
                .count_executions_since(now - Duration::days(7))
                .await?,
            success_rate: percent(completed, finished),
            failure_rate: percent(failed, finished),
            active_executions: summaries.iter().filter(|s| !s.status.is_terminal()).count() as u64,
        };

        Ok(DashboardSummary {
            total_workflows,
            total_executions,
            executions_by_status,
            recent_executions: summaries.into_iter().take(RECENT_EXECUTIONS).collect(),
            performance,
            generated_at: now,
        })
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round2(part as f64 / whole as f64 * 100.0)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

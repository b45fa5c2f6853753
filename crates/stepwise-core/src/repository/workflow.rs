//! Workflow repository trait definition.
//!
//! Defines the storage interface for workflow definitions, executions and
//! step executions. The infrastructure layer (stepwise-infra) implements this
//! trait with SQLite persistence; `InMemoryWorkflowRepository` implements it
//! in process.

use chrono::{DateTime, Utc};
use stepwise_types::error::RepositoryError;
use stepwise_types::execution::{
    ExecutionGraph, PriorStepOutput, StepExecution, StepExecutionGraph, StepExecutionStatus,
    WorkflowExecution, WorkflowExecutionStatus,
};
use stepwise_types::monitoring::{ExecutionFilter, ExecutionSummary};
use stepwise_types::workflow::{StepDefinition, WorkflowDefinition, WorkflowGraph, WorkflowStep};
use uuid::Uuid;

/// Repository trait for workflow persistence.
///
/// Covers two entity families:
/// - **Definitions:** workflow definitions, step definitions and the
///   ordered workflow steps linking them.
/// - **Executions:** workflow executions and their step executions.
///
/// Multi-row writes (`create_workflow_definition`, `create_execution`) are
/// atomic. Updates of a missing row fail with `RepositoryError::NotFound`.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait WorkflowRepository: Send + Sync {
    // -----------------------------------------------------------------------
    // Definitions
    // -----------------------------------------------------------------------

    /// Insert or replace a step definition.
    fn save_step_definition(
        &self,
        def: &StepDefinition,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Insert a workflow definition and its steps in one transaction.
    ///
    /// Fails with `Conflict` on a duplicate name or a duplicate step order.
    fn create_workflow_definition(
        &self,
        def: &WorkflowDefinition,
        steps: &[WorkflowStep],
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Load a definition with its steps (joined to step definitions), ascending by order.
    fn get_workflow_graph(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowGraph>, RepositoryError>> + Send;

    /// Get a workflow definition by its unique name.
    fn get_definition_by_name(
        &self,
        name: &str,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowDefinition>, RepositoryError>> + Send;

    /// List workflow definitions ordered by name.
    fn list_definitions(
        &self,
        active_only: bool,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowDefinition>, RepositoryError>> + Send;

    /// Flip a definition's active flag. Returns `true` if it existed.
    fn set_definition_active(
        &self,
        id: &Uuid,
        active: bool,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    fn count_active_definitions(
        &self,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Executions
    // -----------------------------------------------------------------------

    /// Insert an execution and all of its step executions in one transaction.
    fn create_execution(
        &self,
        execution: &WorkflowExecution,
        steps: &[StepExecution],
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get_execution(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowExecution>, RepositoryError>> + Send;

    /// Persist every mutable field of an execution.
    fn update_execution(
        &self,
        execution: &WorkflowExecution,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Persist an execution only if its stored status is still `expected`.
    /// Returns `false` when the row is missing or has moved on.
    fn update_execution_if(
        &self,
        execution: &WorkflowExecution,
        expected: WorkflowExecutionStatus,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Load an execution with all step executions, their workflow steps and
    /// step definitions, ascending by order.
    fn load_execution_graph(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<ExecutionGraph>, RepositoryError>> + Send;

    /// Load one step execution with its workflow step, step definition and
    /// parent execution.
    fn load_step_graph(
        &self,
        step_execution_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<StepExecutionGraph>, RepositoryError>> + Send;

    /// Persist every mutable field of a step execution.
    fn update_step_execution(
        &self,
        step: &StepExecution,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Persist a step execution only if its stored status is still `expected`.
    /// The processor claims a step with this, so only one delivery runs it.
    fn update_step_execution_if(
        &self,
        step: &StepExecution,
        expected: StepExecutionStatus,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Outputs of Completed steps ordered before `before_order`, ascending by order.
    /// Steps without an output are omitted.
    fn list_prior_outputs(
        &self,
        execution_id: &Uuid,
        before_order: i32,
    ) -> impl std::future::Future<Output = Result<Vec<PriorStepOutput>, RepositoryError>> + Send;

    /// Execution summaries matching the filter, newest first.
    fn list_execution_summaries(
        &self,
        filter: &ExecutionFilter,
    ) -> impl std::future::Future<Output = Result<Vec<ExecutionSummary>, RepositoryError>> + Send;

    /// Executions created at or after `since` (all statuses).
    fn count_executions_since(
        &self,
        since: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;
}

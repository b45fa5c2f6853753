//! In-memory `WorkflowRepository`.
//!
//! Mirrors the SQLite repository's semantics (unique names, unique step
//! orders, all-or-nothing multi-row writes) behind a single async mutex.
//! Used by engine tests and by the CLI's `--ephemeral` mode.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use stepwise_types::error::RepositoryError;
use stepwise_types::execution::{
    ExecutionGraph, PriorStepOutput, StepExecution, StepExecutionDetail, StepExecutionGraph,
    StepExecutionStatus, WorkflowExecution, WorkflowExecutionStatus,
};
use stepwise_types::monitoring::{ExecutionFilter, ExecutionSummary};
use stepwise_types::workflow::{
    StepDefinition, WorkflowDefinition, WorkflowGraph, WorkflowStep, WorkflowStepDetail,
};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::workflow::WorkflowRepository;

#[derive(Debug, Default)]
struct State {
    definitions: HashMap<Uuid, WorkflowDefinition>,
    step_definitions: HashMap<Uuid, StepDefinition>,
    workflow_steps: HashMap<Uuid, WorkflowStep>,
    executions: HashMap<Uuid, WorkflowExecution>,
    step_executions: HashMap<Uuid, StepExecution>,
}

impl State {
    fn step_detail(&self, exec: &StepExecution) -> Result<StepExecutionDetail, RepositoryError> {
        let step = self
            .workflow_steps
            .get(&exec.workflow_step_id)
            .ok_or_else(|| {
                RepositoryError::Query(format!("dangling workflow step {}", exec.workflow_step_id))
            })?;
        let definition = self
            .step_definitions
            .get(&step.step_definition_id)
            .ok_or_else(|| {
                RepositoryError::Query(format!(
                    "dangling step definition {}",
                    step.step_definition_id
                ))
            })?;
        Ok(StepExecutionDetail {
            execution: exec.clone(),
            step: step.clone(),
            definition: definition.clone(),
        })
    }

    fn steps_of(&self, execution_id: &Uuid) -> Result<Vec<StepExecutionDetail>, RepositoryError> {
        let mut steps = self
            .step_executions
            .values()
            .filter(|s| s.workflow_execution_id == *execution_id)
            .map(|s| self.step_detail(s))
            .collect::<Result<Vec<_>, _>>()?;
        steps.sort_by_key(|d| d.step.order);
        Ok(steps)
    }

    fn summary(&self, exec: &WorkflowExecution) -> ExecutionSummary {
        let mut total = 0;
        let mut completed = 0;
        let mut failed = 0;
        for step in self
            .step_executions
            .values()
            .filter(|s| s.workflow_execution_id == exec.id)
        {
            total += 1;
            match step.status {
                StepExecutionStatus::Completed => completed += 1,
                StepExecutionStatus::Failed => failed += 1,
                _ => {}
            }
        }
        ExecutionSummary {
            execution_id: exec.id,
            workflow_definition_id: exec.workflow_definition_id,
            workflow_name: self
                .definitions
                .get(&exec.workflow_definition_id)
                .map(|d| d.name.clone())
                .unwrap_or_default(),
            status: exec.status,
            created_at: exec.created_at,
            started_time: exec.started_time,
            completed_time: exec.completed_time,
            error_message: exec.error_message.clone(),
            total_steps: total,
            completed_steps: completed,
            failed_steps: failed,
        }
    }
}

/// Process-local workflow store. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryWorkflowRepository {
    state: Arc<Mutex<State>>,
}

impl InMemoryWorkflowRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn save_step_definition(&self, def: &StepDefinition) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        state.step_definitions.insert(def.id, def.clone());
        Ok(())
    }

    async fn create_workflow_definition(
        &self,
        def: &WorkflowDefinition,
        steps: &[WorkflowStep],
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;

        if state.definitions.values().any(|d| d.name == def.name) {
            return Err(RepositoryError::Conflict(format!(
                "workflow name '{}' already exists",
                def.name
            )));
        }
        if state.definitions.contains_key(&def.id) {
            return Err(RepositoryError::Conflict(format!(
                "workflow {} already exists",
                def.id
            )));
        }
        let mut orders = HashSet::new();
        for step in steps {
            if !orders.insert(step.order) {
                return Err(RepositoryError::Conflict(format!(
                    "duplicate step order {} in workflow '{}'",
                    step.order, def.name
                )));
            }
            if !state.step_definitions.contains_key(&step.step_definition_id) {
                return Err(RepositoryError::Query(format!(
                    "unknown step definition {}",
                    step.step_definition_id
                )));
            }
        }

        state.definitions.insert(def.id, def.clone());
        for step in steps {
            let mut step = step.clone();
            step.workflow_definition_id = def.id;
            state.workflow_steps.insert(step.id, step);
        }
        Ok(())
    }

    async fn get_workflow_graph(&self, id: &Uuid) -> Result<Option<WorkflowGraph>, RepositoryError> {
        let state = self.state.lock().await;
        let Some(definition) = state.definitions.get(id) else {
            return Ok(None);
        };
        let mut steps = Vec::new();
        for step in state
            .workflow_steps
            .values()
            .filter(|s| s.workflow_definition_id == *id)
        {
            let Some(step_def) = state.step_definitions.get(&step.step_definition_id) else {
                return Err(RepositoryError::Query(format!(
                    "dangling step definition {}",
                    step.step_definition_id
                )));
            };
            steps.push(WorkflowStepDetail {
                step: step.clone(),
                definition: step_def.clone(),
            });
        }
        steps.sort_by_key(|d| d.step.order);
        Ok(Some(WorkflowGraph {
            definition: definition.clone(),
            steps,
        }))
    }

    async fn get_definition_by_name(
        &self,
        name: &str,
    ) -> Result<Option<WorkflowDefinition>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.definitions.values().find(|d| d.name == name).cloned())
    }

    async fn list_definitions(
        &self,
        active_only: bool,
    ) -> Result<Vec<WorkflowDefinition>, RepositoryError> {
        let state = self.state.lock().await;
        let mut defs: Vec<WorkflowDefinition> = state
            .definitions
            .values()
            .filter(|d| !active_only || d.is_active)
            .cloned()
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(defs)
    }

    async fn set_definition_active(&self, id: &Uuid, active: bool) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock().await;
        match state.definitions.get_mut(id) {
            Some(def) => {
                def.is_active = active;
                def.updated_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count_active_definitions(&self) -> Result<u64, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.definitions.values().filter(|d| d.is_active).count() as u64)
    }

    async fn create_execution(
        &self,
        execution: &WorkflowExecution,
        steps: &[StepExecution],
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        if !state
            .definitions
            .contains_key(&execution.workflow_definition_id)
        {
            return Err(RepositoryError::Query(format!(
                "unknown workflow definition {}",
                execution.workflow_definition_id
            )));
        }
        if state.executions.contains_key(&execution.id) {
            return Err(RepositoryError::Conflict(format!(
                "execution {} already exists",
                execution.id
            )));
        }
        if let Some(step) = steps
            .iter()
            .find(|s| !state.workflow_steps.contains_key(&s.workflow_step_id))
        {
            return Err(RepositoryError::Query(format!(
                "unknown workflow step {}",
                step.workflow_step_id
            )));
        }

        state.executions.insert(execution.id, execution.clone());
        for step in steps {
            state.step_executions.insert(step.id, step.clone());
        }
        Ok(())
    }

    async fn get_execution(&self, id: &Uuid) -> Result<Option<WorkflowExecution>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.executions.get(id).cloned())
    }

    async fn update_execution(&self, execution: &WorkflowExecution) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        match state.executions.get_mut(&execution.id) {
            Some(existing) => {
                *existing = execution.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn update_execution_if(
        &self,
        execution: &WorkflowExecution,
        expected: WorkflowExecutionStatus,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock().await;
        match state.executions.get_mut(&execution.id) {
            Some(existing) if existing.status == expected => {
                *existing = execution.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn load_execution_graph(&self, id: &Uuid) -> Result<Option<ExecutionGraph>, RepositoryError> {
        let state = self.state.lock().await;
        let Some(execution) = state.executions.get(id) else {
            return Ok(None);
        };
        let workflow_name = state
            .definitions
            .get(&execution.workflow_definition_id)
            .map(|d| d.name.clone())
            .unwrap_or_default();
        Ok(Some(ExecutionGraph {
            execution: execution.clone(),
            workflow_name,
            steps: state.steps_of(id)?,
        }))
    }

    async fn load_step_graph(
        &self,
        step_execution_id: &Uuid,
    ) -> Result<Option<StepExecutionGraph>, RepositoryError> {
        let state = self.state.lock().await;
        let Some(exec) = state.step_executions.get(step_execution_id) else {
            return Ok(None);
        };
        let Some(parent) = state.executions.get(&exec.workflow_execution_id) else {
            return Ok(None);
        };
        Ok(Some(StepExecutionGraph {
            parent: parent.clone(),
            step: state.step_detail(exec)?,
        }))
    }

    async fn update_step_execution(&self, step: &StepExecution) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        match state.step_executions.get_mut(&step.id) {
            Some(existing) => {
                *existing = step.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn update_step_execution_if(
        &self,
        step: &StepExecution,
        expected: StepExecutionStatus,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock().await;
        match state.step_executions.get_mut(&step.id) {
            Some(existing) if existing.status == expected => {
                *existing = step.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_prior_outputs(
        &self,
        execution_id: &Uuid,
        before_order: i32,
    ) -> Result<Vec<PriorStepOutput>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .steps_of(execution_id)?
            .into_iter()
            .filter(|d| {
                d.step.order < before_order
                    && d.execution.status == StepExecutionStatus::Completed
            })
            .filter_map(|d| {
                d.execution.output_data.map(|output| PriorStepOutput {
                    step_name: d.definition.name,
                    order: d.step.order,
                    output,
                })
            })
            .collect())
    }

    async fn list_execution_summaries(
        &self,
        filter: &ExecutionFilter,
    ) -> Result<Vec<ExecutionSummary>, RepositoryError> {
        let state = self.state.lock().await;
        let mut summaries: Vec<ExecutionSummary> = state
            .executions
            .values()
            .map(|e| state.summary(e))
            .filter(|s| filter.matches(s))
            .collect();
        summaries.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.execution_id.cmp(&a.execution_id))
        });
        Ok(summaries)
    }

    async fn count_executions_since(&self, since: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .executions
            .values()
            .filter(|e| e.created_at >= since)
            .count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn seed(repo: &InMemoryWorkflowRepository, name: &str) -> WorkflowGraph {
        let def = WorkflowDefinition::new(name, None);
        let mut steps = Vec::new();
        for (order, step_name) in ["first", "second", "third"].iter().enumerate() {
            let step_def = StepDefinition::new(*step_name, "LogStep", None);
            repo.save_step_definition(&step_def).await.unwrap();
            steps.push(WorkflowStep {
                id: Uuid::now_v7(),
                workflow_definition_id: def.id,
                step_definition_id: step_def.id,
                order: order as i32,
                condition_rules: None,
                delay_minutes: 0,
                configuration: None,
                created_at: Utc::now(),
            });
        }
        // Insert out of order to prove the graph is sorted.
        steps.reverse();
        repo.create_workflow_definition(&def, &steps).await.unwrap();
        repo.get_workflow_graph(&def.id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn graph_steps_sorted_by_order() {
        let repo = InMemoryWorkflowRepository::new();
        let graph = seed(&repo, "w").await;
        let orders: Vec<i32> = graph.steps.iter().map(|s| s.step.order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
        assert_eq!(graph.steps[0].definition.name, "first");
    }

    #[tokio::test]
    async fn duplicate_name_conflicts() {
        let repo = InMemoryWorkflowRepository::new();
        seed(&repo, "dup").await;
        let err = repo
            .create_workflow_definition(&WorkflowDefinition::new("dup", None), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn prior_outputs_filter_order_status_and_output() {
        let repo = InMemoryWorkflowRepository::new();
        let graph = seed(&repo, "w").await;
        let now = Utc::now();
        let exec = WorkflowExecution::new(
            graph.definition.id,
            WorkflowExecutionStatus::Running,
            None,
            None,
            now,
        );
        let mut steps: Vec<StepExecution> = graph
            .steps
            .iter()
            .map(|d| StepExecution::pending(exec.id, d.step.id, None, 3, now))
            .collect();
        steps[0].status = StepExecutionStatus::Completed;
        steps[0].output_data = Some(json!({"a": 1}));
        steps[1].status = StepExecutionStatus::Completed;
        steps[1].output_data = Some(json!({"b": 2}));
        repo.create_execution(&exec, &steps).await.unwrap();

        let prior = repo.list_prior_outputs(&exec.id, 1).await.unwrap();
        assert_eq!(prior.len(), 1);
        assert_eq!(prior[0].step_name, "first");

        let prior = repo.list_prior_outputs(&exec.id, 2).await.unwrap();
        assert_eq!(prior.len(), 2);

        steps[1].output_data = None;
        repo.update_step_execution(&steps[1]).await.unwrap();
        let prior = repo.list_prior_outputs(&exec.id, 3).await.unwrap();
        assert_eq!(prior.len(), 1);
    }

    #[tokio::test]
    async fn update_missing_rows_is_not_found() {
        let repo = InMemoryWorkflowRepository::new();
        let exec = WorkflowExecution::new(
            Uuid::now_v7(),
            WorkflowExecutionStatus::Pending,
            None,
            None,
            Utc::now(),
        );
        assert!(matches!(
            repo.update_execution(&exec).await,
            Err(RepositoryError::NotFound)
        ));
        let step = StepExecution::pending(exec.id, Uuid::now_v7(), None, 3, Utc::now());
        assert!(matches!(
            repo.update_step_execution(&step).await,
            Err(RepositoryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn guarded_updates_only_apply_to_expected_status() {
        let repo = InMemoryWorkflowRepository::new();
        let graph = seed(&repo, "w").await;
        let now = Utc::now();
        let mut exec = WorkflowExecution::new(
            graph.definition.id,
            WorkflowExecutionStatus::Running,
            None,
            None,
            now,
        );
        let mut step = StepExecution::pending(exec.id, graph.steps[0].step.id, None, 3, now);
        repo.create_execution(&exec, std::slice::from_ref(&step)).await.unwrap();

        step.status = StepExecutionStatus::Running;
        assert!(
            repo.update_step_execution_if(&step, StepExecutionStatus::Pending)
                .await
                .unwrap()
        );
        // A second claim of the same delivery loses.
        assert!(
            !repo
                .update_step_execution_if(&step, StepExecutionStatus::Pending)
                .await
                .unwrap()
        );

        exec.status = WorkflowExecutionStatus::Cancelled;
        repo.update_execution(&exec).await.unwrap();
        let mut stale = exec.clone();
        stale.status = WorkflowExecutionStatus::Completed;
        assert!(
            !repo
                .update_execution_if(&stale, WorkflowExecutionStatus::Running)
                .await
                .unwrap()
        );
        let stored = repo.get_execution(&exec.id).await.unwrap().unwrap();
        assert_eq!(stored.status, WorkflowExecutionStatus::Cancelled);
    }
}

//! SQLite workflow repository implementation.
//!
//! Implements `WorkflowRepository` from `stepwise-core` using sqlx with split
//! read/write pools. Documents (configuration, input, output) are stored as
//! JSON text. Joined reads alias every column with a table prefix
//! (`wd_`, `sd_`, `ws_`, `we_`, `se_`) so one row can be decoded into several
//! entities.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use stepwise_core::repository::WorkflowRepository;
use stepwise_types::error::RepositoryError;
use stepwise_types::execution::{
    ExecutionGraph, PriorStepOutput, StepExecution, StepExecutionDetail, StepExecutionGraph,
    StepExecutionStatus, WorkflowExecution, WorkflowExecutionStatus,
};
use stepwise_types::monitoring::{ExecutionFilter, ExecutionSummary};
use stepwise_types::workflow::{
    StepDefinition, WorkflowDefinition, WorkflowGraph, WorkflowStep, WorkflowStepDetail,
};
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{
    format_datetime, parse_datetime, parse_json, parse_optional_datetime, parse_uuid, query_error,
    to_json, write_error,
};

/// SQLite-backed implementation of `WorkflowRepository`.
#[derive(Clone)]
pub struct SqliteWorkflowRepository {
    pool: DatabasePool,
}

impl SqliteWorkflowRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Column lists
// ---------------------------------------------------------------------------

const DEFINITION_COLUMNS: &str = "wd.id AS wd_id, wd.name AS wd_name, \
    wd.description AS wd_description, wd.is_active AS wd_is_active, \
    wd.created_at AS wd_created_at, wd.updated_at AS wd_updated_at";

const STEP_DEFINITION_COLUMNS: &str = "sd.id AS sd_id, sd.name AS sd_name, \
    sd.step_type AS sd_step_type, sd.description AS sd_description, \
    sd.configuration AS sd_configuration, sd.input_schema AS sd_input_schema, \
    sd.output_schema AS sd_output_schema, sd.is_active AS sd_is_active, \
    sd.created_at AS sd_created_at, sd.updated_at AS sd_updated_at";

const WORKFLOW_STEP_COLUMNS: &str = "ws.id AS ws_id, \
    ws.workflow_definition_id AS ws_workflow_definition_id, \
    ws.step_definition_id AS ws_step_definition_id, ws.\"order\" AS ws_order, \
    ws.condition_rules AS ws_condition_rules, ws.delay_minutes AS ws_delay_minutes, \
    ws.configuration AS ws_configuration, ws.created_at AS ws_created_at";

const EXECUTION_COLUMNS: &str = "we.id AS we_id, \
    we.workflow_definition_id AS we_workflow_definition_id, we.status AS we_status, \
    we.input_data AS we_input_data, we.output_data AS we_output_data, \
    we.scheduled_time AS we_scheduled_time, we.started_time AS we_started_time, \
    we.completed_time AS we_completed_time, we.error_message AS we_error_message, \
    we.created_at AS we_created_at";

const STEP_EXECUTION_COLUMNS: &str = "se.id AS se_id, \
    se.workflow_execution_id AS se_workflow_execution_id, \
    se.workflow_step_id AS se_workflow_step_id, se.status AS se_status, \
    se.input_data AS se_input_data, se.output_data AS se_output_data, \
    se.scheduled_time AS se_scheduled_time, se.started_time AS se_started_time, \
    se.completed_time AS se_completed_time, se.error_message AS se_error_message, \
    se.retry_count AS se_retry_count, se.max_retries AS se_max_retries, \
    se.created_at AS se_created_at";

const STEP_JOINS: &str = "FROM step_executions se \
    JOIN workflow_steps ws ON ws.id = se.workflow_step_id \
    JOIN step_definitions sd ON sd.id = ws.step_definition_id";

// ---------------------------------------------------------------------------
// Row decoding
// ---------------------------------------------------------------------------

fn col<'r, T>(row: &'r SqliteRow, prefix: &str, name: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(format!("{prefix}{name}").as_str())
        .map_err(query_error)
}

fn uuid_col(row: &SqliteRow, prefix: &str, name: &str) -> Result<Uuid, RepositoryError> {
    parse_uuid(&col::<String>(row, prefix, name)?)
}

fn datetime_col(row: &SqliteRow, prefix: &str, name: &str) -> Result<DateTime<Utc>, RepositoryError> {
    parse_datetime(&col::<String>(row, prefix, name)?)
}

fn optional_datetime_col(
    row: &SqliteRow,
    prefix: &str,
    name: &str,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    parse_optional_datetime(col(row, prefix, name)?)
}

fn json_col(
    row: &SqliteRow,
    prefix: &str,
    name: &str,
) -> Result<Option<serde_json::Value>, RepositoryError> {
    parse_json(col(row, prefix, name)?, name)
}

fn definition_from_row(row: &SqliteRow) -> Result<WorkflowDefinition, RepositoryError> {
    let p = "wd_";
    Ok(WorkflowDefinition {
        id: uuid_col(row, p, "id")?,
        name: col(row, p, "name")?,
        description: col(row, p, "description")?,
        is_active: col(row, p, "is_active")?,
        created_at: datetime_col(row, p, "created_at")?,
        updated_at: optional_datetime_col(row, p, "updated_at")?,
    })
}

fn step_definition_from_row(row: &SqliteRow) -> Result<StepDefinition, RepositoryError> {
    let p = "sd_";
    Ok(StepDefinition {
        id: uuid_col(row, p, "id")?,
        name: col(row, p, "name")?,
        step_type: col(row, p, "step_type")?,
        description: col(row, p, "description")?,
        configuration: json_col(row, p, "configuration")?,
        input_schema: json_col(row, p, "input_schema")?,
        output_schema: json_col(row, p, "output_schema")?,
        is_active: col(row, p, "is_active")?,
        created_at: datetime_col(row, p, "created_at")?,
        updated_at: optional_datetime_col(row, p, "updated_at")?,
    })
}

fn workflow_step_from_row(row: &SqliteRow) -> Result<WorkflowStep, RepositoryError> {
    let p = "ws_";
    Ok(WorkflowStep {
        id: uuid_col(row, p, "id")?,
        workflow_definition_id: uuid_col(row, p, "workflow_definition_id")?,
        step_definition_id: uuid_col(row, p, "step_definition_id")?,
        order: col::<i64>(row, p, "order")? as i32,
        condition_rules: col(row, p, "condition_rules")?,
        delay_minutes: col::<i64>(row, p, "delay_minutes")? as u32,
        configuration: json_col(row, p, "configuration")?,
        created_at: datetime_col(row, p, "created_at")?,
    })
}

fn execution_from_row(row: &SqliteRow) -> Result<WorkflowExecution, RepositoryError> {
    let p = "we_";
    let status: String = col(row, p, "status")?;
    Ok(WorkflowExecution {
        id: uuid_col(row, p, "id")?,
        workflow_definition_id: uuid_col(row, p, "workflow_definition_id")?,
        status: status
            .parse::<WorkflowExecutionStatus>()
            .map_err(RepositoryError::Query)?,
        input_data: json_col(row, p, "input_data")?,
        output_data: json_col(row, p, "output_data")?,
        scheduled_time: optional_datetime_col(row, p, "scheduled_time")?,
        started_time: optional_datetime_col(row, p, "started_time")?,
        completed_time: optional_datetime_col(row, p, "completed_time")?,
        error_message: col(row, p, "error_message")?,
        created_at: datetime_col(row, p, "created_at")?,
    })
}

fn step_execution_from_row(row: &SqliteRow) -> Result<StepExecution, RepositoryError> {
    let p = "se_";
    let status: String = col(row, p, "status")?;
    Ok(StepExecution {
        id: uuid_col(row, p, "id")?,
        workflow_execution_id: uuid_col(row, p, "workflow_execution_id")?,
        workflow_step_id: uuid_col(row, p, "workflow_step_id")?,
        status: status
            .parse::<StepExecutionStatus>()
            .map_err(RepositoryError::Query)?,
        input_data: json_col(row, p, "input_data")?,
        output_data: json_col(row, p, "output_data")?,
        scheduled_time: optional_datetime_col(row, p, "scheduled_time")?,
        started_time: optional_datetime_col(row, p, "started_time")?,
        completed_time: optional_datetime_col(row, p, "completed_time")?,
        error_message: col(row, p, "error_message")?,
        retry_count: col::<i64>(row, p, "retry_count")? as u32,
        max_retries: col::<i64>(row, p, "max_retries")? as u32,
        created_at: datetime_col(row, p, "created_at")?,
    })
}

fn step_detail_from_row(row: &SqliteRow) -> Result<StepExecutionDetail, RepositoryError> {
    Ok(StepExecutionDetail {
        execution: step_execution_from_row(row)?,
        step: workflow_step_from_row(row)?,
        definition: step_definition_from_row(row)?,
    })
}

fn summary_from_row(row: &SqliteRow) -> Result<ExecutionSummary, RepositoryError> {
    let execution = execution_from_row(row)?;
    Ok(ExecutionSummary {
        execution_id: execution.id,
        workflow_definition_id: execution.workflow_definition_id,
        workflow_name: col(row, "", "workflow_name")?,
        status: execution.status,
        created_at: execution.created_at,
        started_time: execution.started_time,
        completed_time: execution.completed_time,
        error_message: execution.error_message,
        total_steps: col::<i64>(row, "", "total_steps")? as u32,
        completed_steps: col::<i64>(row, "", "completed_steps")? as u32,
        failed_steps: col::<i64>(row, "", "failed_steps")? as u32,
    })
}

// ---------------------------------------------------------------------------
// WorkflowRepository impl
// ---------------------------------------------------------------------------

impl WorkflowRepository for SqliteWorkflowRepository {
    async fn save_step_definition(&self, def: &StepDefinition) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO step_definitions
               (id, name, step_type, description, configuration, input_schema, output_schema,
                is_active, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 step_type = excluded.step_type,
                 description = excluded.description,
                 configuration = excluded.configuration,
                 input_schema = excluded.input_schema,
                 output_schema = excluded.output_schema,
                 is_active = excluded.is_active,
                 updated_at = excluded.updated_at"#,
        )
        .bind(def.id.to_string())
        .bind(&def.name)
        .bind(&def.step_type)
        .bind(&def.description)
        .bind(to_json(def.configuration.as_ref())?)
        .bind(to_json(def.input_schema.as_ref())?)
        .bind(to_json(def.output_schema.as_ref())?)
        .bind(def.is_active)
        .bind(format_datetime(&def.created_at))
        .bind(def.updated_at.as_ref().map(format_datetime))
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn create_workflow_definition(
        &self,
        def: &WorkflowDefinition,
        steps: &[WorkflowStep],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;

        sqlx::query(
            "INSERT INTO workflow_definitions (id, name, description, is_active, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(def.id.to_string())
        .bind(&def.name)
        .bind(&def.description)
        .bind(def.is_active)
        .bind(format_datetime(&def.created_at))
        .bind(def.updated_at.as_ref().map(format_datetime))
        .execute(&mut *tx)
        .await
        .map_err(|e| write_error(e, || format!("workflow name '{}' already exists", def.name)))?;

        for step in steps {
            sqlx::query(
                r#"INSERT INTO workflow_steps
                   (id, workflow_definition_id, step_definition_id, "order", condition_rules,
                    delay_minutes, configuration, created_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(step.id.to_string())
            .bind(def.id.to_string())
            .bind(step.step_definition_id.to_string())
            .bind(step.order as i64)
            .bind(&step.condition_rules)
            .bind(step.delay_minutes as i64)
            .bind(to_json(step.configuration.as_ref())?)
            .bind(format_datetime(&step.created_at))
            .execute(&mut *tx)
            .await
            .map_err(|e| write_error(e, || format!("duplicate step order {}", step.order)))?;
        }

        tx.commit().await.map_err(query_error)?;
        Ok(())
    }

    async fn get_workflow_graph(&self, id: &Uuid) -> Result<Option<WorkflowGraph>, RepositoryError> {
        let sql = format!("SELECT {DEFINITION_COLUMNS} FROM workflow_definitions wd WHERE wd.id = ?");
        let Some(row) = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?
        else {
            return Ok(None);
        };
        let definition = definition_from_row(&row)?;

        let sql = format!(
            "SELECT {WORKFLOW_STEP_COLUMNS}, {STEP_DEFINITION_COLUMNS}
             FROM workflow_steps ws
             JOIN step_definitions sd ON sd.id = ws.step_definition_id
             WHERE ws.workflow_definition_id = ?
             ORDER BY ws.\"order\" ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        let mut steps = Vec::with_capacity(rows.len());
        for row in &rows {
            steps.push(WorkflowStepDetail {
                step: workflow_step_from_row(row)?,
                definition: step_definition_from_row(row)?,
            });
        }
        Ok(Some(WorkflowGraph { definition, steps }))
    }

    async fn get_definition_by_name(
        &self,
        name: &str,
    ) -> Result<Option<WorkflowDefinition>, RepositoryError> {
        let sql = format!("SELECT {DEFINITION_COLUMNS} FROM workflow_definitions wd WHERE wd.name = ?");
        let row = sqlx::query(&sql)
            .bind(name)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        row.as_ref().map(definition_from_row).transpose()
    }

    async fn list_definitions(
        &self,
        active_only: bool,
    ) -> Result<Vec<WorkflowDefinition>, RepositoryError> {
        let sql = format!(
            "SELECT {DEFINITION_COLUMNS} FROM workflow_definitions wd
             WHERE (? = 0 OR wd.is_active = 1)
             ORDER BY wd.name ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(active_only)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        rows.iter().map(definition_from_row).collect()
    }

    async fn set_definition_active(&self, id: &Uuid, active: bool) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("UPDATE workflow_definitions SET is_active = ?, updated_at = ? WHERE id = ?")
                .bind(active)
                .bind(format_datetime(&Utc::now()))
                .bind(id.to_string())
                .execute(&self.pool.writer)
                .await
                .map_err(query_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_active_definitions(&self) -> Result<u64, RepositoryError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM workflow_definitions WHERE is_active = 1")
                .fetch_one(&self.pool.reader)
                .await
                .map_err(query_error)?;
        Ok(count as u64)
    }

    async fn create_execution(
        &self,
        execution: &WorkflowExecution,
        steps: &[StepExecution],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;

        sqlx::query(
            r#"INSERT INTO workflow_executions
               (id, workflow_definition_id, status, input_data, output_data, scheduled_time,
                started_time, completed_time, error_message, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(execution.id.to_string())
        .bind(execution.workflow_definition_id.to_string())
        .bind(execution.status.as_str())
        .bind(to_json(execution.input_data.as_ref())?)
        .bind(to_json(execution.output_data.as_ref())?)
        .bind(execution.scheduled_time.as_ref().map(format_datetime))
        .bind(execution.started_time.as_ref().map(format_datetime))
        .bind(execution.completed_time.as_ref().map(format_datetime))
        .bind(&execution.error_message)
        .bind(format_datetime(&execution.created_at))
        .execute(&mut *tx)
        .await
        .map_err(|e| write_error(e, || format!("execution {} already exists", execution.id)))?;

        for step in steps {
            sqlx::query(
                r#"INSERT INTO step_executions
                   (id, workflow_execution_id, workflow_step_id, status, input_data, output_data,
                    scheduled_time, started_time, completed_time, error_message, retry_count,
                    max_retries, created_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(step.id.to_string())
            .bind(step.workflow_execution_id.to_string())
            .bind(step.workflow_step_id.to_string())
            .bind(step.status.as_str())
            .bind(to_json(step.input_data.as_ref())?)
            .bind(to_json(step.output_data.as_ref())?)
            .bind(step.scheduled_time.as_ref().map(format_datetime))
            .bind(step.started_time.as_ref().map(format_datetime))
            .bind(step.completed_time.as_ref().map(format_datetime))
            .bind(&step.error_message)
            .bind(step.retry_count as i64)
            .bind(step.max_retries as i64)
            .bind(format_datetime(&step.created_at))
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;
        }

        tx.commit().await.map_err(query_error)?;
        Ok(())
    }

    async fn get_execution(&self, id: &Uuid) -> Result<Option<WorkflowExecution>, RepositoryError> {
        let sql = format!("SELECT {EXECUTION_COLUMNS} FROM workflow_executions we WHERE we.id = ?");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        row.as_ref().map(execution_from_row).transpose()
    }

    async fn update_execution(&self, execution: &WorkflowExecution) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE workflow_executions SET
                 status = ?, input_data = ?, output_data = ?, scheduled_time = ?,
                 started_time = ?, completed_time = ?, error_message = ?
               WHERE id = ?"#,
        )
        .bind(execution.status.as_str())
        .bind(to_json(execution.input_data.as_ref())?)
        .bind(to_json(execution.output_data.as_ref())?)
        .bind(execution.scheduled_time.as_ref().map(format_datetime))
        .bind(execution.started_time.as_ref().map(format_datetime))
        .bind(execution.completed_time.as_ref().map(format_datetime))
        .bind(&execution.error_message)
        .bind(execution.id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn update_execution_if(
        &self,
        execution: &WorkflowExecution,
        expected: WorkflowExecutionStatus,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE workflow_executions SET
                 status = ?, input_data = ?, output_data = ?, scheduled_time = ?,
                 started_time = ?, completed_time = ?, error_message = ?
               WHERE id = ? AND status = ?"#,
        )
        .bind(execution.status.as_str())
        .bind(to_json(execution.input_data.as_ref())?)
        .bind(to_json(execution.output_data.as_ref())?)
        .bind(execution.scheduled_time.as_ref().map(format_datetime))
        .bind(execution.started_time.as_ref().map(format_datetime))
        .bind(execution.completed_time.as_ref().map(format_datetime))
        .bind(&execution.error_message)
        .bind(execution.id.to_string())
        .bind(expected.as_str())
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn load_execution_graph(&self, id: &Uuid) -> Result<Option<ExecutionGraph>, RepositoryError> {
        let sql = format!(
            "SELECT {EXECUTION_COLUMNS}, wd.name AS workflow_name
             FROM workflow_executions we
             JOIN workflow_definitions wd ON wd.id = we.workflow_definition_id
             WHERE we.id = ?"
        );
        let Some(row) = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?
        else {
            return Ok(None);
        };
        let execution = execution_from_row(&row)?;
        let workflow_name: String = col(&row, "", "workflow_name")?;

        let sql = format!(
            "SELECT {STEP_EXECUTION_COLUMNS}, {WORKFLOW_STEP_COLUMNS}, {STEP_DEFINITION_COLUMNS}
             {STEP_JOINS}
             WHERE se.workflow_execution_id = ?
             ORDER BY ws.\"order\" ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;
        let steps = rows
            .iter()
            .map(step_detail_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(ExecutionGraph {
            execution,
            workflow_name,
            steps,
        }))
    }

    async fn load_step_graph(
        &self,
        step_execution_id: &Uuid,
    ) -> Result<Option<StepExecutionGraph>, RepositoryError> {
        let sql = format!(
            "SELECT {STEP_EXECUTION_COLUMNS}, {WORKFLOW_STEP_COLUMNS}, {STEP_DEFINITION_COLUMNS},
                    {EXECUTION_COLUMNS}
             {STEP_JOINS}
             JOIN workflow_executions we ON we.id = se.workflow_execution_id
             WHERE se.id = ?"
        );
        let row = sqlx::query(&sql)
            .bind(step_execution_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        row.as_ref()
            .map(|row| {
                Ok(StepExecutionGraph {
                    parent: execution_from_row(row)?,
                    step: step_detail_from_row(row)?,
                })
            })
            .transpose()
    }

    async fn update_step_execution(&self, step: &StepExecution) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE step_executions SET
                 status = ?, input_data = ?, output_data = ?, scheduled_time = ?,
                 started_time = ?, completed_time = ?, error_message = ?, retry_count = ?,
                 max_retries = ?
               WHERE id = ?"#,
        )
        .bind(step.status.as_str())
        .bind(to_json(step.input_data.as_ref())?)
        .bind(to_json(step.output_data.as_ref())?)
        .bind(step.scheduled_time.as_ref().map(format_datetime))
        .bind(step.started_time.as_ref().map(format_datetime))
        .bind(step.completed_time.as_ref().map(format_datetime))
        .bind(&step.error_message)
        .bind(step.retry_count as i64)
        .bind(step.max_retries as i64)
        .bind(step.id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn update_step_execution_if(
        &self,
        step: &StepExecution,
        expected: StepExecutionStatus,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE step_executions SET
                 status = ?, input_data = ?, output_data = ?, scheduled_time = ?,
                 started_time = ?, completed_time = ?, error_message = ?, retry_count = ?,
                 max_retries = ?
               WHERE id = ? AND status = ?"#,
        )
        .bind(step.status.as_str())
        .bind(to_json(step.input_data.as_ref())?)
        .bind(to_json(step.output_data.as_ref())?)
        .bind(step.scheduled_time.as_ref().map(format_datetime))
        .bind(step.started_time.as_ref().map(format_datetime))
        .bind(step.completed_time.as_ref().map(format_datetime))
        .bind(&step.error_message)
        .bind(step.retry_count as i64)
        .bind(step.max_retries as i64)
        .bind(step.id.to_string())
        .bind(expected.as_str())
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_prior_outputs(
        &self,
        execution_id: &Uuid,
        before_order: i32,
    ) -> Result<Vec<PriorStepOutput>, RepositoryError> {
        let sql = format!(
            "SELECT sd.name AS step_name, ws.\"order\" AS step_order, se.output_data AS output
             {STEP_JOINS}
             WHERE se.workflow_execution_id = ?
               AND ws.\"order\" < ?
               AND se.status = ?
               AND se.output_data IS NOT NULL
             ORDER BY ws.\"order\" ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(execution_id.to_string())
            .bind(before_order as i64)
            .bind(StepExecutionStatus::Completed.as_str())
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        let mut outputs = Vec::with_capacity(rows.len());
        for row in &rows {
            let Some(output) = json_col(row, "", "output")? else {
                continue;
            };
            outputs.push(PriorStepOutput {
                step_name: col(row, "", "step_name")?,
                order: col::<i64>(row, "", "step_order")? as i32,
                output,
            });
        }
        Ok(outputs)
    }

    async fn list_execution_summaries(
        &self,
        filter: &ExecutionFilter,
    ) -> Result<Vec<ExecutionSummary>, RepositoryError> {
        let sql = format!(
            "SELECT {EXECUTION_COLUMNS}, wd.name AS workflow_name,
                    (SELECT COUNT(*) FROM step_executions s
                      WHERE s.workflow_execution_id = we.id) AS total_steps,
                    (SELECT COUNT(*) FROM step_executions s
                      WHERE s.workflow_execution_id = we.id AND s.status = 'completed') AS completed_steps,
                    (SELECT COUNT(*) FROM step_executions s
                      WHERE s.workflow_execution_id = we.id AND s.status = 'failed') AS failed_steps
             FROM workflow_executions we
             JOIN workflow_definitions wd ON wd.id = we.workflow_definition_id
             WHERE (?1 IS NULL OR we.status = ?1)
               AND (?2 IS NULL OR we.workflow_definition_id = ?2)
               AND (?3 IS NULL OR we.created_at >= ?3)
               AND (?4 IS NULL OR we.created_at <= ?4)
             ORDER BY we.created_at DESC, we.id DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.workflow_definition_id.map(|id| id.to_string()))
            .bind(filter.created_after.as_ref().map(format_datetime))
            .bind(filter.created_before.as_ref().map(format_datetime))
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        rows.iter().map(summary_from_row).collect()
    }

    async fn count_executions_since(&self, since: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM workflow_executions WHERE created_at >= ?")
                .bind(format_datetime(&since))
                .fetch_one(&self.pool.reader)
                .await
                .map_err(query_error)?;
        Ok(count as u64)
    }
}

//! CLI execution subcommands.
//!
//! Start, inspect, cancel, pause, resume and list workflow executions.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde_json::Value;
use uuid::Uuid;

use stepwise_core::jobs::JobQueue;
use stepwise_core::repository::WorkflowRepository;
use stepwise_core::workflow::MonitoringService;
use stepwise_types::execution::{ExecutionView, WorkflowExecutionStatus};
use stepwise_types::monitoring::ExecutionFilter;

use crate::state::AppState;

use super::{
    execution_status_cell, format_time, parse_execution_id, resolve_definition, short_id,
    step_status_cell, worker,
};

const DEFAULT_PAGE_SIZE: u32 = 20;

/// Execution subcommands.
#[derive(Subcommand)]
pub enum RunCommand {
    /// Start an execution of a workflow.
    Start {
        /// Workflow UUID or name.
        workflow: String,

        /// JSON input document for the execution.
        #[arg(long)]
        input: Option<String>,

        /// Start at this RFC 3339 time instead of now.
        #[arg(long)]
        at: Option<String>,

        /// Run the job worker in this process until the execution finishes.
        #[arg(long)]
        wait: bool,
    },

    /// Show an execution and its steps.
    Status {
        /// Execution UUID.
        execution_id: String,
    },

    /// Cancel a pending, running or paused execution.
    Cancel {
        /// Execution UUID.
        execution_id: String,
    },

    /// Pause a running execution.
    Pause {
        /// Execution UUID.
        execution_id: String,
    },

    /// Resume a paused execution.
    Resume {
        /// Execution UUID.
        execution_id: String,
    },

    /// List executions, newest first.
    List {
        /// Only executions with this status.
        #[arg(long)]
        status: Option<WorkflowExecutionStatus>,

        /// Only executions of this workflow (UUID or name).
        #[arg(long)]
        workflow: Option<String>,

        /// 1-based page number.
        #[arg(long, default_value = "1")]
        page: u32,

        /// Executions per page (max 100).
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: u32,
    },
}

/// Handle an execution subcommand.
pub async fn handle_run_command<R, Q>(
    cmd: RunCommand,
    state: &AppState<R, Q>,
    json: bool,
) -> Result<()>
where
    R: WorkflowRepository + 'static,
    Q: JobQueue + Clone + 'static,
{
    match cmd {
        RunCommand::Start {
            workflow,
            input,
            at,
            wait,
        } => handle_start(state, &workflow, input.as_deref(), at.as_deref(), wait, json).await,
        RunCommand::Status { execution_id } => {
            let view = state
                .engine
                .get_status(parse_execution_id(&execution_id)?)
                .await?;
            display_execution(&view, json)
        }
        RunCommand::Cancel { execution_id } => {
            let id = parse_execution_id(&execution_id)?;
            let changed = state.engine.cancel(id).await?;
            report_transition(id, "cancel", changed, json)
        }
        RunCommand::Pause { execution_id } => {
            let id = parse_execution_id(&execution_id)?;
            let changed = state.engine.pause(id).await?;
            report_transition(id, "pause", changed, json)
        }
        RunCommand::Resume { execution_id } => {
            let id = parse_execution_id(&execution_id)?;
            let changed = state.engine.resume(id).await?;
            report_transition(id, "resume", changed, json)
        }
        RunCommand::List {
            status,
            workflow,
            page,
            page_size,
        } => handle_list(state.repo(), status, workflow.as_deref(), page, page_size, json).await,
    }
}

// ---------------------------------------------------------------------------
// Start
// ---------------------------------------------------------------------------

fn parse_input(raw: Option<&str>) -> Result<Option<Value>> {
    raw.map(|raw| serde_json::from_str::<Value>(raw).context("Invalid JSON input"))
        .transpose()
}

fn parse_start_time(raw: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    raw.map(|raw| {
        DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .with_context(|| format!("Invalid start time '{raw}': expected RFC 3339"))
    })
    .transpose()
}

async fn handle_start<R, Q>(
    state: &AppState<R, Q>,
    workflow: &str,
    input: Option<&str>,
    at: Option<&str>,
    wait: bool,
    json: bool,
) -> Result<()>
where
    R: WorkflowRepository + 'static,
    Q: JobQueue + Clone + 'static,
{
    let definition = resolve_definition(state.repo(), workflow).await?;
    let input = parse_input(input)?;
    let scheduled_time = parse_start_time(at)?;

    let execution_id = state
        .engine
        .start(definition.id, input, scheduled_time)
        .await
        .with_context(|| format!("Failed to start workflow '{}'", definition.name))?;

    if wait {
        worker::run_until_finished(state, execution_id).await?;
        let view = state.engine.get_status(execution_id).await?;
        return display_execution(&view, json);
    }

    if json {
        let out = serde_json::json!({
            "execution_id": execution_id.to_string(),
            "workflow_name": definition.name,
            "scheduled_time": scheduled_time.map(|t| t.to_rfc3339()),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!();
        println!(
            "  {} Started workflow '{}'",
            style("*").green().bold(),
            style(&definition.name).cyan()
        );
        println!("  Execution ID: {execution_id}");
        if let Some(t) = scheduled_time {
            println!("  Scheduled for: {}", format_time(Some(t)));
        }
        println!();
        println!(
            "  Steps run when a worker is active: {}",
            style("stepwise worker").dim()
        );
        println!(
            "  Check progress: {}",
            style(format!("stepwise run status {execution_id}")).dim()
        );
        println!();
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

fn display_execution(view: &ExecutionView, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(view)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {} ({})",
        style("Execution:").bold(),
        style(short_id(&view.execution_id)).cyan(),
        style(&view.workflow_name).cyan()
    );
    println!("  Status: {}", view.status);
    println!("  Scheduled: {}", format_time(view.scheduled_time));
    println!("  Started: {}", format_time(view.started_time));
    println!("  Completed: {}", format_time(view.completed_time));
    if let Some(ref err) = view.error_message {
        println!("  Error: {}", style(err).red());
    }
    println!();

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("#").fg(Color::Cyan),
            Cell::new("Step"),
            Cell::new("Type"),
            Cell::new("Status"),
            Cell::new("Retries"),
            Cell::new("Scheduled"),
            Cell::new("Completed"),
            Cell::new("Error"),
        ]);

    for step in &view.steps {
        table.add_row(vec![
            Cell::new(step.order),
            Cell::new(&step.step_name),
            Cell::new(&step.step_type),
            step_status_cell(step.status),
            Cell::new(format!("{}/{}", step.retry_count, step.max_retries)),
            Cell::new(format_time(step.scheduled_time)),
            Cell::new(format_time(step.completed_time)),
            Cell::new(step.error_message.as_deref().unwrap_or("")),
        ]);
    }

    println!("{table}");
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// Cancel / pause / resume
// ---------------------------------------------------------------------------

fn report_transition(execution_id: Uuid, action: &str, changed: bool, json: bool) -> Result<()> {
    if json {
        let out = serde_json::json!({
            "execution_id": execution_id.to_string(),
            "action": action,
            "changed": changed,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    if changed {
        println!(
            "  {} {} applied to execution {}",
            style("*").green().bold(),
            action,
            style(short_id(&execution_id)).cyan()
        );
    } else {
        println!(
            "  {} Could not {} execution {}: not found or not in a state that allows it.",
            style("!").yellow().bold(),
            action,
            style(short_id(&execution_id)).cyan()
        );
    }
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

async fn handle_list<R: WorkflowRepository>(
    repo: &R,
    status: Option<WorkflowExecutionStatus>,
    workflow: Option<&str>,
    page: u32,
    page_size: u32,
    json: bool,
) -> Result<()> {
    let workflow_definition_id = match workflow {
        Some(target) => Some(resolve_definition(repo, target).await?.id),
        None => None,
    };
    let filter = ExecutionFilter {
        status,
        workflow_definition_id,
        ..Default::default()
    };

    let result = MonitoringService::new(repo)
        .list_executions(&filter, page, page_size)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if result.executions.is_empty() {
        println!();
        println!("  No executions found.");
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Execution").fg(Color::Cyan),
            Cell::new("Workflow"),
            Cell::new("Status"),
            Cell::new("Steps"),
            Cell::new("Created"),
            Cell::new("Completed"),
        ]);

    for e in &result.executions {
        table.add_row(vec![
            Cell::new(short_id(&e.execution_id)),
            Cell::new(&e.workflow_name),
            execution_status_cell(e.status),
            Cell::new(format!(
                "{}/{} ({} failed)",
                e.completed_steps, e.total_steps, e.failed_steps
            )),
            Cell::new(format_time(Some(e.created_at))),
            Cell::new(format_time(e.completed_time)),
        ]);
    }

    println!();
    println!("{table}");
    println!(
        "  Page {} of {} ({} executions)",
        result.page,
        result.total_pages.max(1),
        result.total_count
    );
    println!();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_input_accepts_any_json() {
        assert_eq!(parse_input(None).unwrap(), None);
        assert_eq!(
            parse_input(Some(r#"{"a":1}"#)).unwrap(),
            Some(serde_json::json!({"a": 1}))
        );
        assert_eq!(parse_input(Some("42")).unwrap(), Some(serde_json::json!(42)));
        assert!(parse_input(Some("{oops")).is_err());
    }

    #[test]
    fn parse_start_time_normalizes_to_utc() {
        let t = parse_start_time(Some("2026-10-18T12:00:00+02:00"))
            .unwrap()
            .unwrap();
        assert_eq!(t.to_rfc3339(), "2026-10-18T10:00:00+00:00");
        assert!(parse_start_time(Some("tomorrow")).is_err());
        assert!(parse_start_time(None).unwrap().is_none());
    }
}

//! CLI command definitions and dispatch for the `stepwise` binary.
//!
//! Uses clap derive macros for argument parsing. Commands are grouped by
//! noun (`stepwise workflow list`, `stepwise run start`).

pub mod dashboard;
pub mod run;
pub mod worker;
pub mod workflow;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use comfy_table::{Cell, Color};
use stepwise_core::repository::WorkflowRepository;
use stepwise_types::execution::{StepExecutionStatus, WorkflowExecutionStatus};
use stepwise_types::workflow::WorkflowDefinition;
use uuid::Uuid;

/// Run durable, step-by-step workflows.
#[derive(Parser)]
#[command(name = "stepwise", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Use an in-memory store and queue (seeded with the demo workflow)
    /// instead of the SQLite database.
    #[arg(long, global = true)]
    pub ephemeral: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage workflow definitions.
    #[command(alias = "wf")]
    Workflow {
        #[command(subcommand)]
        action: workflow::WorkflowCommand,
    },

    /// Start and control workflow executions.
    Run {
        #[command(subcommand)]
        action: run::RunCommand,
    },

    /// Run the job worker until Ctrl+C.
    Worker {
        /// Run every job that is due now, then exit.
        #[arg(long)]
        until_idle: bool,
    },

    /// Show execution counts, rates and recent executions.
    Dashboard,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Resolve a workflow definition from a UUID or a unique name.
pub async fn resolve_definition(
    repo: &impl WorkflowRepository,
    target: &str,
) -> anyhow::Result<WorkflowDefinition> {
    if let Ok(id) = target.parse::<Uuid>() {
        if let Some(graph) = repo.get_workflow_graph(&id).await? {
            return Ok(graph.definition);
        }
    }
    repo.get_definition_by_name(target)
        .await?
        .ok_or_else(|| anyhow::anyhow!("No workflow found for '{target}'. Try a UUID or workflow name."))
}

/// Parse an execution id argument.
pub fn parse_execution_id(raw: &str) -> anyhow::Result<Uuid> {
    raw.parse::<Uuid>()
        .map_err(|_| anyhow::anyhow!("Invalid execution ID '{raw}': expected a UUID"))
}

pub fn short_id(id: &Uuid) -> String {
    id.to_string().chars().take(8).collect()
}

pub fn format_time(t: Option<DateTime<Utc>>) -> String {
    t.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Colored table cell for an execution status.
pub fn execution_status_cell(status: WorkflowExecutionStatus) -> Cell {
    let color = match status {
        WorkflowExecutionStatus::Pending => Color::DarkGrey,
        WorkflowExecutionStatus::Running => Color::Yellow,
        WorkflowExecutionStatus::Paused => Color::Blue,
        WorkflowExecutionStatus::Completed => Color::Green,
        WorkflowExecutionStatus::Failed => Color::Red,
        WorkflowExecutionStatus::Cancelled => Color::Magenta,
    };
    Cell::new(status).fg(color)
}

/// Colored table cell for a step status.
pub fn step_status_cell(status: StepExecutionStatus) -> Cell {
    let color = match status {
        StepExecutionStatus::Pending => Color::DarkGrey,
        StepExecutionStatus::Running => Color::Yellow,
        StepExecutionStatus::Retrying => Color::DarkYellow,
        StepExecutionStatus::Completed => Color::Green,
        StepExecutionStatus::Failed => Color::Red,
        StepExecutionStatus::Skipped => Color::Cyan,
    };
    Cell::new(status).fg(color)
}

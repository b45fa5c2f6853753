//! CLI workflow definition subcommands.
//!
//! Provides create, demo, list, show and deactivate operations for workflow
//! definitions.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use stepwise_core::jobs::JobQueue;
use stepwise_core::repository::WorkflowRepository;
use stepwise_core::step::StepRegistry;
use stepwise_core::workflow::{WorkflowBuilder, demo_workflow};
use stepwise_types::workflow::WorkflowDefinitionModel;

use crate::state::AppState;

use super::{format_time, resolve_definition, short_id};

/// Workflow definition subcommands.
#[derive(Subcommand)]
pub enum WorkflowCommand {
    /// Create a workflow from a JSON definition file.
    Create {
        /// Path to the workflow JSON file.
        file: PathBuf,
    },

    /// Create the four-step demo workflow.
    Demo,

    /// List workflow definitions.
    List {
        /// Include inactive definitions.
        #[arg(long)]
        all: bool,
    },

    /// Show a workflow definition and its steps.
    Show {
        /// Workflow UUID or name.
        target: String,
    },

    /// Deactivate a workflow so it can no longer be started.
    Deactivate {
        /// Workflow UUID or name.
        target: String,
    },
}

/// Handle a workflow subcommand.
pub async fn handle_workflow_command<R, Q>(
    cmd: WorkflowCommand,
    state: &AppState<R, Q>,
    json: bool,
) -> Result<()>
where
    R: WorkflowRepository + 'static,
    Q: JobQueue + Clone + 'static,
{
    let repo = state.repo();
    match cmd {
        WorkflowCommand::Create { file } => {
            let builder = WorkflowBuilder::from_model(load_model(&file).await?);
            handle_create(builder, state.engine.registry(), repo, json).await
        }
        WorkflowCommand::Demo => {
            handle_create(demo_workflow(), state.engine.registry(), repo, json).await
        }
        WorkflowCommand::List { all } => handle_list(all, repo, json).await,
        WorkflowCommand::Show { target } => handle_show(&target, repo, json).await,
        WorkflowCommand::Deactivate { target } => handle_deactivate(&target, repo, json).await,
    }
}

async fn load_model(file: &Path) -> Result<WorkflowDefinitionModel> {
    let raw = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse workflow JSON in {}", file.display()))
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

async fn handle_create(
    builder: WorkflowBuilder,
    registry: &StepRegistry,
    repo: &impl WorkflowRepository,
    json: bool,
) -> Result<()> {
    let model = builder.clone().build()?;
    for step in &model.steps {
        if !registry.contains(&step.step_type) {
            bail!(
                "Step '{}' uses unknown step type '{}'. Known types: {}",
                step.name,
                step.step_type,
                registry.list_types().join(", ")
            );
        }
    }

    let id = builder
        .save(repo)
        .await
        .with_context(|| format!("Failed to save workflow '{}'", model.name))?;

    if json {
        let out = serde_json::json!({
            "id": id.to_string(),
            "name": model.name,
            "steps": model.steps.len(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!();
        println!(
            "  {} Created workflow '{}'",
            style("*").green().bold(),
            style(&model.name).cyan()
        );
        println!("  ID: {id}");
        println!("  Steps: {}", model.steps.len());
        println!();
        println!(
            "  Start it with: {}",
            style(format!("stepwise run start {id}")).dim()
        );
        println!();
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

async fn handle_list(all: bool, repo: &impl WorkflowRepository, json: bool) -> Result<()> {
    let defs = repo
        .list_definitions(!all)
        .await
        .context("Failed to list workflows")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&defs)?);
        return Ok(());
    }

    if defs.is_empty() {
        println!();
        println!("  No workflows registered.");
        println!(
            "  Create one with: {}",
            style("stepwise workflow create <file.json>").dim()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Name").fg(Color::Cyan),
            Cell::new("ID"),
            Cell::new("Active"),
            Cell::new("Created"),
            Cell::new("Description"),
        ]);

    for d in &defs {
        table.add_row(vec![
            Cell::new(&d.name),
            Cell::new(short_id(&d.id)),
            if d.is_active {
                Cell::new("yes").fg(Color::Green)
            } else {
                Cell::new("no").fg(Color::DarkGrey)
            },
            Cell::new(format_time(Some(d.created_at))),
            Cell::new(d.description.as_deref().unwrap_or("")),
        ]);
    }

    println!();
    println!("{table}");
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// Show
// ---------------------------------------------------------------------------

async fn handle_show(target: &str, repo: &impl WorkflowRepository, json: bool) -> Result<()> {
    let definition = resolve_definition(repo, target).await?;
    let graph = repo
        .get_workflow_graph(&definition.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Workflow '{target}' disappeared"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&graph)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {}",
        style("Workflow:").bold(),
        style(&graph.definition.name).cyan()
    );
    println!("  ID: {}", graph.definition.id);
    if let Some(ref description) = graph.definition.description {
        println!("  Description: {description}");
    }
    println!(
        "  Active: {}",
        if graph.definition.is_active { "yes" } else { "no" }
    );
    println!();

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("#").fg(Color::Cyan),
            Cell::new("Name"),
            Cell::new("Type"),
            Cell::new("Delay (min)"),
            Cell::new("Configuration"),
        ]);

    for detail in &graph.steps {
        let config = detail
            .step
            .configuration
            .as_ref()
            .or(detail.definition.configuration.as_ref())
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            Cell::new(detail.step.order),
            Cell::new(&detail.definition.name),
            Cell::new(&detail.definition.step_type),
            Cell::new(detail.step.delay_minutes),
            Cell::new(config),
        ]);
    }

    println!("{table}");
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// Deactivate
// ---------------------------------------------------------------------------

async fn handle_deactivate(target: &str, repo: &impl WorkflowRepository, json: bool) -> Result<()> {
    let definition = resolve_definition(repo, target).await?;
    repo.set_definition_active(&definition.id, false)
        .await
        .context("Failed to deactivate workflow")?;

    if json {
        let out = serde_json::json!({
            "id": definition.id.to_string(),
            "name": definition.name,
            "is_active": false,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!();
        println!(
            "  {} Deactivated workflow '{}'",
            style("*").green().bold(),
            style(&definition.name).cyan()
        );
        println!();
    }

    Ok(())
}

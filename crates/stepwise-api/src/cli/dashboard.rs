//! `stepwise dashboard`: counts, rates and recent executions.

use anyhow::Result;
use chrono::Utc;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use stepwise_core::repository::WorkflowRepository;
use stepwise_core::workflow::MonitoringService;

use super::{execution_status_cell, format_time, short_id};

pub async fn dashboard(repo: &impl WorkflowRepository, json: bool) -> Result<()> {
    let summary = MonitoringService::new(repo).dashboard(Utc::now()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let perf = &summary.performance;
    println!();
    println!("  {}", style("Stepwise Dashboard").bold());
    println!();
    println!(
        "  Workflows: {}    Executions: {}    Active: {}",
        style(summary.total_workflows).cyan(),
        style(summary.total_executions).cyan(),
        style(perf.active_executions).yellow()
    );
    println!(
        "  Last 24h: {}    Last 7d: {}    Avg duration: {:.2} min",
        perf.executions_last_24h, perf.executions_last_7d, perf.average_execution_minutes
    );
    println!(
        "  Success rate: {}    Failure rate: {}",
        style(format!("{:.2}%", perf.success_rate)).green(),
        style(format!("{:.2}%", perf.failure_rate)).red()
    );
    println!();

    if !summary.executions_by_status.is_empty() {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("Status").fg(Color::Cyan),
                Cell::new("Count"),
                Cell::new("Share"),
            ]);
        for s in &summary.executions_by_status {
            table.add_row(vec![
                execution_status_cell(s.status),
                Cell::new(s.count),
                Cell::new(format!("{:.2}%", s.percentage)),
            ]);
        }
        println!("{table}");
        println!();
    }

    if summary.recent_executions.is_empty() {
        println!("  No executions yet.");
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Recent").fg(Color::Cyan),
            Cell::new("Workflow"),
            Cell::new("Status"),
            Cell::new("Created"),
        ]);
    for e in &summary.recent_executions {
        table.add_row(vec![
            Cell::new(short_id(&e.execution_id)),
            Cell::new(&e.workflow_name),
            execution_status_cell(e.status),
            Cell::new(format_time(Some(e.created_at))),
        ]);
    }
    println!("{table}");
    println!();

    Ok(())
}

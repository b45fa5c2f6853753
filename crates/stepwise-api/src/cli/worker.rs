//! Job worker commands.
//!
//! `stepwise worker` drains the job queue into the engine until Ctrl+C (or,
//! with `--until-idle`, until nothing is due). `run start --wait` reuses the
//! same worker to follow a single execution to its end.

use std::time::Duration;

use anyhow::Result;
use console::style;
use stepwise_core::jobs::JobQueue;
use stepwise_core::repository::WorkflowRepository;
use stepwise_types::event::WorkflowEvent;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::state::AppState;

use super::short_id;

/// Run the worker until Ctrl+C, or once over every due job with `until_idle`.
pub async fn handle_worker<R, Q>(state: &AppState<R, Q>, until_idle: bool, json: bool) -> Result<()>
where
    R: WorkflowRepository + 'static,
    Q: JobQueue + Clone + 'static,
{
    let printer = (!json).then(|| spawn_event_printer(state.events.subscribe(), None));
    let worker = state.worker();

    if until_idle {
        let executed = worker.run_due().await?;
        let pending = state.queue.pending_count().await?;
        if json {
            let out = serde_json::json!({ "executed": executed, "pending": pending });
            println!("{}", serde_json::to_string_pretty(&out)?);
        } else {
            println!();
            println!(
                "  {} Ran {executed} job(s); {pending} scheduled for later.",
                style("*").green().bold()
            );
            println!();
        }
    } else {
        if !json {
            println!();
            println!("  {} Worker running", style("*").green().bold());
            println!("  {}", style("Press Ctrl+C to stop").dim());
            println!();
        }
        let cancel = CancellationToken::new();
        let stop = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            stop.cancel();
        });
        worker.run(cancel).await?;
        if !json {
            println!("\n  Worker stopped.");
        }
    }

    if let Some(printer) = printer {
        printer.abort();
    }
    Ok(())
}

/// Drive the queue in-process until `execution_id` is terminal or Ctrl+C.
pub async fn run_until_finished<R, Q>(state: &AppState<R, Q>, execution_id: Uuid) -> Result<()>
where
    R: WorkflowRepository + 'static,
    Q: JobQueue + Clone + 'static,
{
    let printer = spawn_event_printer(state.events.subscribe(), Some(execution_id));
    let worker = state.worker();
    let poll_interval = Duration::from_millis(state.config.worker.poll_interval_ms.max(1));

    let result = async {
        loop {
            worker.run_due().await?;
            if state.engine.get_status(execution_id).await?.status.is_terminal() {
                return Ok::<_, anyhow::Error>(());
            }
            tokio::select! {
                _ = shutdown_signal() => {
                    tracing::info!(execution_id = %execution_id, "stopped waiting; execution continues with the next worker");
                    return Ok(());
                }
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
    }
    .await;

    printer.abort();
    result
}

/// Print step and workflow transitions as they happen. With `only`, events
/// of other executions are ignored.
fn spawn_event_printer(
    mut events: broadcast::Receiver<WorkflowEvent>,
    only: Option<Uuid>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event printer lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            if only.is_some_and(|id| id != event.execution_id()) {
                continue;
            }
            if let Some(line) = describe_event(&event) {
                eprintln!("  {line}");
            }
        }
    })
}

fn describe_event(event: &WorkflowEvent) -> Option<String> {
    match event {
        WorkflowEvent::StepStatusChanged {
            execution_id,
            step_name,
            status,
            retry_count,
            error_message,
            ..
        } => {
            let mut line = format!(
                "{} step {} -> {}",
                style(short_id(execution_id)).dim(),
                style(step_name).cyan(),
                status
            );
            if *retry_count > 0 {
                line.push_str(&format!(" (retry {retry_count})"));
            }
            if let Some(err) = error_message {
                line.push_str(&format!(": {}", style(err).red()));
            }
            Some(line)
        }
        WorkflowEvent::ExecutionCompleted {
            execution_id,
            status,
            duration_ms,
            ..
        } => Some(format!(
            "{} execution {}{}",
            style(short_id(execution_id)).dim(),
            style(status).bold(),
            duration_ms
                .map(|ms| format!(" in {:.1}s", ms as f64 / 1000.0))
                .unwrap_or_default()
        )),
        WorkflowEvent::ExecutionStarted { .. } | WorkflowEvent::WorkflowStatusChanged { .. } => None,
    }
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

//! Stepwise CLI entry point.
//!
//! Binary name: `stepwise`
//!
//! Parses CLI arguments, loads configuration, opens the SQLite (or in-memory)
//! backend, then dispatches to the command handler.

mod cli;
mod state;

use anyhow::Result;
use clap::Parser;
use clap_complete::generate;

use stepwise_core::jobs::JobQueue;
use stepwise_core::repository::WorkflowRepository;
use stepwise_infra::config::{load_global_config, resolve_data_dir};
use stepwise_observe::tracing_setup::{TracingOptions, init_tracing, shutdown_tracing};

use cli::{Cli, Commands};
use state::{AppState, EphemeralState, SqliteState};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Shell completions don't need config or a backend
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "stepwise", &mut std::io::stdout());
        return Ok(());
    }

    let data_dir = resolve_data_dir();
    let config = load_global_config(&data_dir).await;

    let tracing_options = TracingOptions {
        json: config.logging.json,
        otel: config.logging.otel,
        ..TracingOptions::from_verbosity(cli.verbose, cli.quiet)
    };
    if let Err(e) = init_tracing(&tracing_options) {
        eprintln!("Warning: failed to initialize tracing: {e}");
    }

    let result = if cli.ephemeral {
        let state = EphemeralState::ephemeral(config).await?;
        dispatch(cli, &state).await
    } else {
        let state = SqliteState::open(&data_dir, config).await?;
        dispatch(cli, &state).await
    };

    shutdown_tracing();
    result
}

async fn dispatch<R, Q>(cli: Cli, state: &AppState<R, Q>) -> Result<()>
where
    R: WorkflowRepository + 'static,
    Q: JobQueue + Clone + 'static,
{
    match cli.command {
        Commands::Workflow { action } => {
            cli::workflow::handle_workflow_command(action, state, cli.json).await
        }
        Commands::Run { action } => cli::run::handle_run_command(action, state, cli.json).await,
        Commands::Worker { until_idle } => {
            cli::worker::handle_worker(state, until_idle, cli.json).await
        }
        Commands::Dashboard => cli::dashboard::dashboard(state.repo(), cli.json).await,
        Commands::Completions { .. } => unreachable!("handled above"),
    }
}

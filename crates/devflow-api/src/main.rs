//! devflow CLI entry point.
//!
//! Binary name: `devflow`
//!
//! Parses CLI arguments, initializes tracing and application state, then
//! dispatches to the command handler.

mod cli;
mod state;

use clap::Parser;
use devflow_infra::config::resolve_data_dir;
use devflow_observe::{LogFormat, TracingOptions, init_tracing, shutdown_tracing};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = TracingOptions {
        format: if cli.json {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        },
        default_level: TracingOptions::level_for_verbosity(cli.verbose).to_string(),
        enable_otel: cli.otel,
    };
    init_tracing(&options).map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = dispatch(cli).await;
    shutdown_tracing();
    result
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => resolve_data_dir()?,
    };
    let state = AppState::init(data_dir).await?;
    tracing::debug!(
        data_dir = %state.data_dir.display(),
        backoff = ?state.config.retry_backoff,
        "application state ready"
    );

    match cli.command {
        Commands::Templates => cli::template::list_templates(&state, cli.json),
        Commands::Template { id, output } => {
            cli::template::export_template(&state, &id, output.as_deref(), cli.json)
        }
        Commands::Tools { category } => {
            cli::tools::list_tools(&state, category.as_deref(), cli.json)
        }
        Commands::Validate { file } => cli::workflow::validate_workflow(&state, &file, cli.json),
        Commands::Run(args) => cli::workflow::run_workflow(&state, args, cli.json).await,
    }
}

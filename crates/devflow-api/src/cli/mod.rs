//! CLI command definitions using clap derive.

pub mod template;
pub mod tools;
pub mod workflow;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use devflow_types::workflow::TriggerType;

/// devflow - run development workflows as dependency graphs of tool steps.
#[derive(Parser)]
#[command(name = "devflow", version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format (for scripting). Also switches logs to JSON.
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    /// Data directory holding config.toml and the default workspace.
    #[arg(long, global = true, env = "DEVFLOW_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the built-in workflow templates.
    Templates,

    /// Export a template as a workflow document.
    Template {
        /// Template ID (see `devflow templates`).
        id: String,

        /// Write to this file instead of stdout (.json or .yaml).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List registered tools.
    Tools {
        /// Only show tools in this category (e.g. git, file_system).
        #[arg(long)]
        category: Option<String>,
    },

    /// Validate a workflow document without running it.
    Validate {
        /// Path to a .yaml, .yml or .json workflow document.
        file: PathBuf,
    },

    /// Run a workflow to completion.
    Run(RunArgs),
}

/// Arguments for `devflow run`.
#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Workflow document to run.
    #[arg(required_unless_present = "template", conflicts_with = "template")]
    pub file: Option<PathBuf>,

    /// Run a built-in template instead of a file.
    #[arg(long)]
    pub template: Option<String>,

    /// Override the workflow name (templates only).
    #[arg(long, requires = "template")]
    pub name: Option<String>,

    /// Initial run context as a JSON object.
    #[arg(long)]
    pub context: Option<String>,

    /// Trigger to attribute the run to.
    #[arg(long, value_enum)]
    pub trigger: Option<TriggerArg>,
}

/// CLI spelling of [`TriggerType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TriggerArg {
    Manual,
    Scheduled,
    Webhook,
    Event,
}

impl From<TriggerArg> for TriggerType {
    fn from(arg: TriggerArg) -> Self {
        match arg {
            TriggerArg::Manual => TriggerType::Manual,
            TriggerArg::Scheduled => TriggerType::Scheduled,
            TriggerArg::Webhook => TriggerType::Webhook,
            TriggerArg::Event => TriggerType::Event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_accepts_file_or_template() {
        let cli = Cli::try_parse_from(["devflow", "run", "flow.yaml"]).unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.file, Some(PathBuf::from("flow.yaml")));

        let cli = Cli::try_parse_from([
            "devflow",
            "run",
            "--template",
            "capy_development",
            "--trigger",
            "webhook",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.template.as_deref(), Some("capy_development"));
        assert_eq!(args.trigger.map(TriggerType::from), Some(TriggerType::Webhook));
    }

    #[test]
    fn run_requires_exactly_one_source() {
        assert!(Cli::try_parse_from(["devflow", "run"]).is_err());
        assert!(
            Cli::try_parse_from(["devflow", "run", "flow.yaml", "--template", "x"]).is_err()
        );
    }
}

//! ciprov CLI tool.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{ConnectionArgs, SetupArgs};

#[derive(Parser)]
#[command(name = "ciprov")]
#[command(about = "Provision a Jenkins orchestrator: plugins, credentials and pipeline jobs", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install required plugins
    Plugins {
        #[command(flatten)]
        connection: ConnectionArgs,
        /// Plugin to install (repeatable; defaults to the standard pipeline set)
        #[arg(long = "plugin")]
        plugins: Vec<String>,
        /// Pause after each accepted install, in milliseconds
        #[arg(long, default_value = "2000")]
        delay_ms: u64,
    },
    /// Add the workspace credential and create the pipeline job
    Setup {
        #[command(flatten)]
        connection: ConnectionArgs,
        #[command(flatten)]
        args: SetupArgs,
    },
    /// Reconcile everything declared in a desired-state file
    Apply {
        #[command(flatten)]
        connection: ConnectionArgs,
        /// Path to the desired-state file
        #[arg(default_value = "ciprov.kdl")]
        path: String,
    },
    /// Validate a desired-state file without contacting the orchestrator
    Validate {
        /// Path to the desired-state file
        #[arg(default_value = "ciprov.kdl")]
        path: String,
    },
    /// Check that a workspace access token is valid
    VerifyToken {
        /// Workspace host, e.g. https://example.cloud.databricks.com
        #[arg(long, env = "CIPROV_WORKSPACE_HOST")]
        host: String,
        /// Personal access token (prompted for if omitted)
        #[arg(long, env = "CIPROV_WORKSPACE_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };

    // Logs go to stderr; stdout carries the report.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let success = match cli.command {
        Commands::Plugins {
            connection,
            plugins,
            delay_ms,
        } => commands::plugins::run(&connection, plugins, delay_ms).await?,
        Commands::Setup { connection, args } => commands::setup::run(&connection, args).await?,
        Commands::Apply { connection, path } => commands::apply::run(&connection, &path).await?,
        Commands::Validate { path } => commands::apply::validate(&path),
        Commands::VerifyToken { host, token } => commands::token::run(&host, token).await?,
    };

    if !success {
        std::process::exit(1);
    }

    Ok(())
}

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;

use shipyard::config::ShipyardToml;
use shipyard::logging::{self, LogOptions};

mod cmd;

#[derive(Parser)]
#[command(name = "shipyard")]
#[command(version, about = "Ideate, build, verify and fix generated apps against acceptance checks")]
pub struct Cli {
    /// Path to shipyard.toml (defaults to ./shipyard.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the campaign API and build-complete webhook
    Serve {
        /// Port to serve on (overrides [server] port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Database path (overrides [server] db_path)
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Enable dev mode (bind all interfaces, permissive CORS)
        #[arg(long)]
        dev: bool,
    },
    /// Run one campaign in-process and print the final run
    Run {
        /// JSON file with the campaign criteria
        #[arg(long)]
        criteria: PathBuf,
    },
    /// Evaluate a spec's acceptance checks against a preview
    Qa {
        /// JSON file with the app spec
        #[arg(long)]
        spec: PathBuf,

        /// Preview location to evaluate
        #[arg(long)]
        url: String,
    },
    /// View or initialize configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Write a default shipyard.toml
    Init,
    /// Check configuration values
    Validate,
}

/// Load configuration and install logging. Keep the guard alive for the
/// whole command.
fn bootstrap(cli_config: Option<&Path>, verbose: bool, log_json: bool) -> Result<(ShipyardToml, Option<WorkerGuard>)> {
    let config = ShipyardToml::load_or_default(cli_config)?;
    let guard = logging::init(&LogOptions {
        verbose,
        json: log_json || config.logging.json,
        dir: config.logging.dir.clone(),
    })?;
    Ok((config, guard))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let boot = || bootstrap(cli.config.as_deref(), cli.verbose, cli.log_json);

    match &cli.command {
        Commands::Serve { port, db_path, dev } => {
            let (config, _log_guard) = boot()?;
            cmd::cmd_serve(config, *port, db_path.clone(), *dev).await?;
        }
        Commands::Run { criteria } => {
            let (config, _log_guard) = boot()?;
            cmd::cmd_run(config, criteria).await?;
        }
        Commands::Qa { spec, url } => {
            let (config, _log_guard) = boot()?;
            cmd::cmd_qa(&config, spec, url).await?;
        }
        Commands::Config { command } => cmd::cmd_config(cli.config.as_deref(), command.clone())?,
    }

    Ok(())
}

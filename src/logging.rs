//! Tracing subscriber setup.
//!
//! `SHIPYARD_LOG` takes an `EnvFilter` directive and wins over `--verbose`.
//! Stderr gets a human or JSON formatter; when a log directory is configured
//! a daily-rolling JSON file is written alongside.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

pub const LOG_ENV: &str = "SHIPYARD_LOG";

#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub verbose: bool,
    pub json: bool,
    pub dir: Option<PathBuf>,
}

fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "shipyard=debug,tower_http=debug,info"
    } else {
        "info"
    }
}

/// Install the global subscriber. Keep the returned guard alive for the
/// process lifetime or buffered file output is lost.
pub fn init(options: &LogOptions) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directive(options.verbose)));

    let stderr_json = options
        .json
        .then(|| fmt::layer().json().with_writer(std::io::stderr));
    let stderr_text = (!options.json).then(|| {
        fmt::layer()
            .with_target(options.verbose)
            .with_writer(std::io::stderr)
    });

    let (file_layer, guard) = match &options.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "shipyard.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().json().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_json)
        .with(stderr_text)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;
    Ok(guard)
}

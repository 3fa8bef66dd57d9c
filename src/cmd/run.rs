//! One campaign in-process: `shipyard run`.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use shipyard::app::build_controller;
use shipyard::campaign::{InlineCompletion, RunStore, criteria_from_value};
use shipyard::config::{CompletionMode, ShipyardToml};
use shipyard::db::SqliteRunStore;
use shipyard_common::RunStatus;
use tracing::warn;

use super::read_json;

pub async fn cmd_run(config: ShipyardToml, criteria_path: &Path) -> Result<()> {
    let criteria = criteria_from_value(
        read_json(criteria_path)?,
        config.campaign.default_max_iterations,
    )
    .with_context(|| format!("{} does not describe valid criteria", criteria_path.display()))?;

    let store: Arc<dyn RunStore> = Arc::new(
        SqliteRunStore::open(&config.server.db_path)
            .context("Failed to initialize run database")?,
    );
    let mut controller = build_controller(&config, store)?;
    if config.campaign.completion == CompletionMode::Callback {
        // No webhook listener in this process.
        warn!("callback completion is unavailable for `run`, completing inline");
        controller = controller.with_completion(Arc::new(InlineCompletion::immediate()));
    }

    let run_id = controller.start_campaign(criteria).await?;
    let run = controller
        .registry()
        .get(&run_id)
        .context("Run vanished from the registry")?;

    println!("{}", serde_json::to_string_pretty(&run)?);
    match run.status {
        RunStatus::Passed => Ok(()),
        status => anyhow::bail!("run {} finished as {}", run_id, status),
    }
}

//! Campaign API server command: `shipyard serve`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use shipyard::app::build_controller;
use shipyard::campaign::RunStore;
use shipyard::config::ShipyardToml;
use shipyard::db::SqliteRunStore;
use shipyard::server::{AppState, ServerConfig, start_server};

pub async fn cmd_serve(
    mut config: ShipyardToml,
    port: Option<u16>,
    db_path: Option<PathBuf>,
    dev: bool,
) -> Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(db_path) = db_path {
        config.server.db_path = db_path;
    }

    let store: Arc<dyn RunStore> = Arc::new(
        SqliteRunStore::open(&config.server.db_path)
            .context("Failed to initialize run database")?,
    );
    let controller = build_controller(&config, store.clone())?;
    let state = Arc::new(AppState {
        controller: Arc::new(controller),
        store,
        default_max_iterations: config.campaign.default_max_iterations,
    });

    start_server(
        ServerConfig {
            host: config.server.host.clone(),
            port: config.server.port,
            dev_mode: dev,
        },
        state,
    )
    .await
}

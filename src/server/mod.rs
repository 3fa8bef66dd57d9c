//! HTTP front door: campaign API and the builder's build-complete webhook.
//!
//! ```text
//! POST /api/campaigns ───────▶ CampaignController::start_campaign
//! GET  /api/campaigns[/{id}] ─▶ RunRegistry, then RunStore
//! POST /webhooks/builds/complete ─▶ spawned on_build_complete
//! ```

pub mod api;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub use api::{AppState, SharedState, api_router};

/// Configuration for the campaign server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub dev_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3141,
            dev_mode: false,
        }
    }
}

/// Build the full application router.
pub fn build_router(state: SharedState, dev_mode: bool) -> Router {
    let app = api_router()
        .layer(TraceLayer::new_for_http())
        .with_state(state);
    if dev_mode {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

/// Serve until ctrl-c.
pub async fn start_server(config: ServerConfig, state: Arc<AppState>) -> Result<()> {
    let app = build_router(state, config.dev_mode);

    let host = if config.dev_mode { "0.0.0.0" } else { config.host.as_str() };
    let addr = format!("{}:{}", host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    info!(%local_addr, dev_mode = config.dev_mode, "shipyard listening");
    println!("Shipyard running at http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    println!("Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    println!("\nShutting down...");
}

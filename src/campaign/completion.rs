//! How the controller learns that a build finished.
//!
//! `InlineCompletion` synthesizes the build-complete event in-process right
//! after create/update returns (optionally once the preview answers HTTP);
//! `CallbackCompletion` returns nothing and waits for the builder's webhook.
//! The controller handles both events the same way.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use shipyard_common::BuildComplete;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::poll::Poller;

/// What the controller knows right after a create or update returned.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildTicket {
    pub run_id: Uuid,
    pub external_id: String,
    pub preview_location: Option<String>,
}

impl BuildTicket {
    pub fn into_event(self) -> BuildComplete {
        BuildComplete {
            run_id: self.run_id,
            external_id: Some(self.external_id),
            preview_location: self.preview_location,
        }
    }
}

#[async_trait]
pub trait CompletionSource: Send + Sync {
    fn mode(&self) -> &'static str;

    /// `Some` to process the completion now, `None` to wait for a callback.
    async fn after_build(&self, ticket: BuildTicket) -> Option<BuildComplete>;
}

/// Polls the preview location until it answers with a success status.
pub struct ReadinessProbe {
    client: Client,
    poller: Poller,
}

impl ReadinessProbe {
    pub fn new(poller: Poller) -> Self {
        Self {
            client: Client::new(),
            poller,
        }
    }

    pub async fn wait_ready(&self, location: &str) -> bool {
        let client = &self.client;
        let result = self
            .poller
            .until(|| async move {
                match client.get(location).send().await {
                    Ok(resp) if resp.status().is_success() => Some(()),
                    Ok(resp) => {
                        debug!(location, status = %resp.status(), "preview not ready");
                        None
                    }
                    Err(e) => {
                        debug!(location, error = %e, "preview not reachable yet");
                        None
                    }
                }
            })
            .await;
        result.is_ok()
    }
}

#[derive(Default)]
pub struct InlineCompletion {
    probe: Option<ReadinessProbe>,
}

impl InlineCompletion {
    pub fn immediate() -> Self {
        Self { probe: None }
    }

    pub fn with_readiness_probe(interval: Duration, timeout: Duration) -> Self {
        Self {
            probe: Some(ReadinessProbe::new(Poller::new(interval, timeout))),
        }
    }
}

#[async_trait]
impl CompletionSource for InlineCompletion {
    fn mode(&self) -> &'static str {
        "inline"
    }

    async fn after_build(&self, ticket: BuildTicket) -> Option<BuildComplete> {
        if let (Some(probe), Some(location)) = (&self.probe, &ticket.preview_location)
            && !probe.wait_ready(location).await
        {
            // QA decides whether the preview is usable.
            warn!(run_id = %ticket.run_id, location = %location, "preview did not become ready in time");
        }
        Some(ticket.into_event())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CallbackCompletion;

#[async_trait]
impl CompletionSource for CallbackCompletion {
    fn mode(&self) -> &'static str {
        "callback"
    }

    async fn after_build(&self, ticket: BuildTicket) -> Option<BuildComplete> {
        debug!(run_id = %ticket.run_id, "awaiting build-complete callback");
        None
    }
}

use async_trait::async_trait;
use shipyard_common::ChangeRequest;
use tracing::info;
use uuid::Uuid;

use super::{BuildArtifact, BuildDriver};
use crate::errors::DriverError;

const STUB_PREVIEW_HOST: &str = "https://preview.shipyard.local";

/// Development double: every create succeeds immediately.
#[derive(Debug, Default, Clone)]
pub struct StubBuildDriver;

#[async_trait]
impl BuildDriver for StubBuildDriver {
    fn kind(&self) -> &'static str {
        "stub"
    }

    async fn create(&self, prompt: &str) -> Result<BuildArtifact, DriverError> {
        let simple = Uuid::new_v4().simple().to_string();
        let external_id = format!("app_{}", &simple[..8]);
        let preview_location = format!("{STUB_PREVIEW_HOST}/{external_id}");
        info!(%external_id, prompt_len = prompt.len(), "stub builder created app");
        Ok(BuildArtifact::new(external_id, preview_location))
    }

    async fn update(
        &self,
        external_id: &str,
        change: &ChangeRequest,
    ) -> Result<Option<String>, DriverError> {
        info!(external_id, reason = %change.reason, "stub builder updated app");
        Ok(None)
    }
}

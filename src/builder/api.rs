//! Builder HTTP API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use shipyard_common::ChangeRequest;
use tracing::info;

use super::{BuildArtifact, BuildDriver};
use crate::errors::DriverError;

const REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Deserialize)]
struct CreateResponse {
    app_id: String,
    preview_url: String,
}

#[derive(Debug, Default, Deserialize)]
struct UpdateResponse {
    #[serde(default)]
    preview_url: Option<String>,
}

pub struct ApiBuildDriver {
    client: Client,
    api_url: String,
    api_key: String,
}

impl ApiBuildDriver {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    async fn post(&self, method: &str, body: serde_json::Value) -> Result<String, DriverError> {
        let url = format!("{}/{}", self.api_url, method);
        let response = self
            .client
            .post(&url)
            .header("api_key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| DriverError::Api(format!("{method}: {e}")))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| DriverError::Api(format!("{method}: {e}")))?;
        if !status.is_success() {
            return Err(DriverError::Api(format!("{method} returned {status}: {text}")));
        }
        Ok(text)
    }
}

#[async_trait]
impl BuildDriver for ApiBuildDriver {
    fn kind(&self) -> &'static str {
        "api"
    }

    async fn create(&self, prompt: &str) -> Result<BuildArtifact, DriverError> {
        let text = self.post("apps.create", json!({ "prompt": prompt })).await?;
        let created: CreateResponse = serde_json::from_str(&text)
            .map_err(|e| DriverError::Api(format!("apps.create response: {e}")))?;
        info!(external_id = %created.app_id, "builder API created app");
        Ok(BuildArtifact::new(created.app_id, created.preview_url))
    }

    async fn update(
        &self,
        external_id: &str,
        change: &ChangeRequest,
    ) -> Result<Option<String>, DriverError> {
        let text = self
            .post(
                "apps.update",
                json!({ "app_id": external_id, "change_request": change }),
            )
            .await?;
        let updated: UpdateResponse = serde_json::from_str(&text).unwrap_or_default();
        info!(external_id, reason = %change.reason, "builder API updated app");
        Ok(updated.preview_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_response_parses() {
        let created: CreateResponse =
            serde_json::from_str(r#"{"app_id":"app_42","preview_url":"https://p/app_42"}"#)
                .unwrap();
        assert_eq!(created.app_id, "app_42");
        assert_eq!(created.preview_url, "https://p/app_42");
    }

    #[test]
    fn test_update_response_preview_is_optional() {
        let updated: UpdateResponse = serde_json::from_str("{}").unwrap();
        assert!(updated.preview_url.is_none());
    }

    #[test]
    fn test_api_url_trailing_slash_trimmed() {
        let driver = ApiBuildDriver::new("https://builder.example.com/api/", "k").unwrap();
        assert_eq!(driver.api_url, "https://builder.example.com/api");
        assert_eq!(driver.kind(), "api");
    }

    #[tokio::test]
    async fn test_unreachable_api_is_api_error() {
        let driver = ApiBuildDriver::new("http://127.0.0.1:9", "k").unwrap();
        let err = driver.create("prompt").await.unwrap_err();
        assert!(matches!(err, DriverError::Api(msg) if msg.starts_with("apps.create")));
    }
}

// OpenAI-compatible chat completions client
//
// Every call requests a JSON-object response at temperature 0. Errors are
// classified by status so callers can tell retryable failures apart; nothing
// is retried here.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use shipyard_common::{AcceptanceReport, AppSpec, ChangeRequest, Idea, MvpCriteria};
use tracing::debug;

use super::{ProductModel, parse_change_request, parse_ideas, parse_spec};
use crate::errors::LlmError;

const IDEATE_SYSTEM: &str = "You are a product ideator. Output ONLY JSON: an array of 5 items, \
     each {\"idea\": string, \"score\": number}. Wrap the array as {\"ideas\": [...]}.";
const SPEC_SYSTEM: &str = "You output ONLY valid JSON for an App spec object \
     {name, screens, interaction, theme, datasources, acceptance_tests} with \
     acceptance_tests using data-test selectors. Each test has id, method \
     (structural-assert | count-assert | range-assert | interaction-sequence) and target.";
const CRITIQUE_SYSTEM: &str = "You output ONLY valid JSON for a minimal ChangeRequest \
     {target_id, reason, changes} that makes the failing checks pass on the next QA iteration.";

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_base: String,
    pub model: String,
    pub api_key_env: String,
    pub timeout: Duration,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4.1-mini".to_string(),
            api_key_env: "LLM_API_KEY".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

pub struct OpenAiModel {
    client: Client,
    settings: LlmSettings,
}

impl OpenAiModel {
    pub fn new(settings: LlmSettings) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(settings.timeout).build()?;
        Ok(Self { client, settings })
    }

    fn api_key(&self) -> Result<String, LlmError> {
        std::env::var(&self.settings.api_key_env)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| LlmError::MissingApiKey(self.settings.api_key_env.clone()))
    }

    fn request_body(&self, system: &str, user: &str) -> Value {
        json!({
            "model": self.settings.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user }
            ],
            "response_format": { "type": "json_object" },
            "temperature": 0
        })
    }

    async fn chat_json(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let key = self.api_key()?;
        let url = format!(
            "{}/chat/completions",
            self.settings.api_base.trim_end_matches('/')
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(key)
            .json(&self.request_body(system, user))
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;
        classify_status(status, &body, &self.settings.model)?;

        let data: Value = serde_json::from_str(&body)
            .map_err(|e| LlmError::Format(format!("response is not JSON: {e}")))?;
        let content = extract_content(&data)?;
        debug!(model = %self.settings.model, chars = content.len(), "model responded");
        Ok(content)
    }
}

/// Server-supplied `error.message`, else the raw body.
fn error_detail(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

pub(crate) fn classify_status(status: u16, body: &str, model: &str) -> Result<(), LlmError> {
    match status {
        200..=299 => Ok(()),
        401 => Err(LlmError::Unauthorized),
        404 => Err(LlmError::NotFound {
            model: model.to_string(),
        }),
        400 => Err(LlmError::BadRequest(error_detail(body))),
        429 => Err(LlmError::RateLimited(error_detail(body))),
        _ => Err(LlmError::Server {
            status,
            detail: error_detail(body),
        }),
    }
}

pub(crate) fn extract_content(data: &Value) -> Result<String, LlmError> {
    let content = data
        .pointer("/choices/0/message/content")
        .ok_or_else(|| LlmError::Format(format!("unexpected response shape: {data}")))?;
    match content.as_str() {
        Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
        _ => Err(LlmError::Format("empty content from model".to_string())),
    }
}

#[async_trait]
impl ProductModel for OpenAiModel {
    async fn ideate(&self, criteria: &MvpCriteria) -> Result<Vec<Idea>, LlmError> {
        let criteria_json =
            serde_json::to_string(criteria).map_err(|e| LlmError::Format(e.to_string()))?;
        let user = format!("Propose 5 app ideas matching this criteria: {criteria_json}");
        let raw = self.chat_json(IDEATE_SYSTEM, &user).await?;
        parse_ideas(&raw)
    }

    async fn write_spec(&self, criteria: &MvpCriteria, idea: &Idea) -> Result<AppSpec, LlmError> {
        let criteria_json =
            serde_json::to_string(criteria).map_err(|e| LlmError::Format(e.to_string()))?;
        let idea_json = serde_json::to_string(idea).map_err(|e| LlmError::Format(e.to_string()))?;
        let user = format!(
            "Turn this idea and criteria into a minimal spec: criteria={criteria_json} idea={idea_json}"
        );
        let raw = self.chat_json(SPEC_SYSTEM, &user).await?;
        parse_spec(&raw)
    }

    async fn critique(
        &self,
        spec: &AppSpec,
        report: &AcceptanceReport,
    ) -> Result<ChangeRequest, LlmError> {
        let spec_json = serde_json::to_string(spec).map_err(|e| LlmError::Format(e.to_string()))?;
        let report_json =
            serde_json::to_string(report).map_err(|e| LlmError::Format(e.to_string()))?;
        let user = format!("Spec={spec_json} QA={report_json}");
        let raw = self.chat_json(CRITIQUE_SYSTEM, &user).await?;
        parse_change_request(&raw, "")
    }
}

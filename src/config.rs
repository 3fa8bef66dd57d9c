//! Configuration loaded from `shipyard.toml`.
//!
//! Layering is file → environment → CLI flags. Every key is optional; a
//! missing file yields the defaults below.
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 3141
//! db_path = ".shipyard/shipyard.db"
//!
//! [campaign]
//! default_max_iterations = 3
//! completion = "inline"        # or "callback"
//! readiness_probe = false
//! readiness_timeout_secs = 60
//!
//! [builder]
//! kind = "ui"                  # "ui" | "api" | "stub"
//! base_url = "https://app.base44.com"
//! webdriver_url = "http://localhost:4444"
//! storage_state = ".shipyard/auth/storage_state.json"
//!
//! [qa]
//! network_idle_timeout_secs = 30
//!
//! [llm]
//! model = "gpt-4.1-mini"
//! api_key_env = "LLM_API_KEY"
//!
//! [logging]
//! dir = ".shipyard/logs"
//! json = false
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::builder::UiSettings;
use crate::llm::LlmSettings;
use crate::poll::Poller;
use crate::qa::QaSettings;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "shipyard.toml";

// ── [server] ──────────────────────────────────────────────────────────

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3141
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".shipyard/shipyard.db")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            db_path: default_db_path(),
        }
    }
}

// ── [campaign] ────────────────────────────────────────────────────────

/// How the controller learns that a build finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionMode {
    /// Synthesize the event in-process after create/update returns.
    #[default]
    Inline,
    /// Wait for the builder to call the webhook.
    Callback,
}

fn default_max_iterations() -> u32 {
    3
}

fn default_readiness_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignSection {
    #[serde(default = "default_max_iterations")]
    pub default_max_iterations: u32,
    #[serde(default)]
    pub completion: CompletionMode,
    /// Inline mode only: wait for the preview to answer HTTP before QA.
    #[serde(default)]
    pub readiness_probe: bool,
    #[serde(default = "default_readiness_timeout_secs")]
    pub readiness_timeout_secs: u64,
}

impl Default for CampaignSection {
    fn default() -> Self {
        Self {
            default_max_iterations: default_max_iterations(),
            completion: CompletionMode::default(),
            readiness_probe: false,
            readiness_timeout_secs: default_readiness_timeout_secs(),
        }
    }
}

// ── [builder] ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuilderKind {
    /// Drive the builder's interactive page through WebDriver.
    #[default]
    Ui,
    /// Talk to the builder's HTTP API.
    Api,
    /// In-process double for local development.
    Stub,
}

impl BuilderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ui => "ui",
            Self::Api => "api",
            Self::Stub => "stub",
        }
    }
}

fn default_base_url() -> String {
    "https://app.base44.com".to_string()
}

fn default_webdriver_url() -> String {
    "http://localhost:4444".to_string()
}

fn default_input_placeholder() -> String {
    "Describe the app you want to create".to_string()
}

fn default_ready_timeout_secs() -> u64 {
    5
}

fn default_input_timeout_secs() -> u64 {
    15
}

fn default_submit_click_timeout_secs() -> u64 {
    5
}

fn default_preview_poll_interval_ms() -> u64 {
    1000
}

fn default_preview_timeout_secs() -> u64 {
    180
}

fn default_preview_link() -> String {
    "a[href*=\"/preview/\"]".to_string()
}

fn default_preview_url_marker() -> String {
    "/preview/".to_string()
}

fn default_update_path() -> String {
    "/apps/{id}/editor".to_string()
}

fn default_storage_state() -> Option<PathBuf> {
    Some(PathBuf::from(".shipyard/auth/storage_state.json"))
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from(".shipyard/artifacts")
}

fn default_api_url() -> String {
    "https://api.base44.com/v1".to_string()
}

fn default_builder_key_env() -> String {
    "BUILDER_API_KEY".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuilderSection {
    #[serde(default)]
    pub kind: BuilderKind,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,
    #[serde(default)]
    pub headless: bool,
    #[serde(default = "default_input_placeholder")]
    pub input_placeholder: String,
    #[serde(default = "default_ready_timeout_secs")]
    pub ready_timeout_secs: u64,
    #[serde(default = "default_input_timeout_secs")]
    pub input_timeout_secs: u64,
    #[serde(default = "default_submit_click_timeout_secs")]
    pub submit_click_timeout_secs: u64,
    #[serde(default = "default_preview_poll_interval_ms")]
    pub preview_poll_interval_ms: u64,
    #[serde(default = "default_preview_timeout_secs")]
    pub preview_timeout_secs: u64,
    #[serde(default = "default_preview_link")]
    pub preview_link: String,
    #[serde(default = "default_preview_url_marker")]
    pub preview_url_marker: String,
    #[serde(default = "default_update_path")]
    pub update_path: String,
    #[serde(default = "default_storage_state")]
    pub storage_state: Option<PathBuf>,
    /// Long-lived browser profile. Its auth state is never overwritten.
    #[serde(default)]
    pub profile_dir: Option<PathBuf>,
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_builder_key_env")]
    pub api_key_env: String,
}

impl Default for BuilderSection {
    fn default() -> Self {
        Self {
            kind: BuilderKind::default(),
            base_url: default_base_url(),
            webdriver_url: default_webdriver_url(),
            headless: false,
            input_placeholder: default_input_placeholder(),
            ready_timeout_secs: default_ready_timeout_secs(),
            input_timeout_secs: default_input_timeout_secs(),
            submit_click_timeout_secs: default_submit_click_timeout_secs(),
            preview_poll_interval_ms: default_preview_poll_interval_ms(),
            preview_timeout_secs: default_preview_timeout_secs(),
            preview_link: default_preview_link(),
            preview_url_marker: default_preview_url_marker(),
            update_path: default_update_path(),
            storage_state: default_storage_state(),
            profile_dir: None,
            artifact_dir: default_artifact_dir(),
            api_url: default_api_url(),
            api_key_env: default_builder_key_env(),
        }
    }
}

impl BuilderSection {
    /// API key for the HTTP builder, read from the configured variable.
    pub fn api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env)
            .with_context(|| format!("{} is not set", self.api_key_env))
    }
}

// ── [qa] ──────────────────────────────────────────────────────────────

fn default_network_idle_timeout_secs() -> u64 {
    30
}

fn default_quiet_window_ms() -> u64 {
    500
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaSection {
    /// Separate WebDriver endpoint for QA; falls back to the builder's.
    #[serde(default)]
    pub webdriver_url: Option<String>,
    #[serde(default = "default_network_idle_timeout_secs")]
    pub network_idle_timeout_secs: u64,
    #[serde(default = "default_quiet_window_ms")]
    pub quiet_window_ms: u64,
}

impl Default for QaSection {
    fn default() -> Self {
        Self {
            webdriver_url: None,
            network_idle_timeout_secs: default_network_idle_timeout_secs(),
            quiet_window_ms: default_quiet_window_ms(),
        }
    }
}

// ── [llm] ─────────────────────────────────────────────────────────────

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4.1-mini".to_string()
}

fn default_llm_key_env() -> String {
    "LLM_API_KEY".to_string()
}

fn default_llm_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            model: default_model(),
            api_key_env: default_llm_key_env(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

// ── [logging] ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Directory for daily-rolling log files; unset means stderr only.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default)]
    pub json: bool,
}

/// The complete shipyard.toml configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShipyardToml {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub campaign: CampaignSection,
    #[serde(default)]
    pub builder: BuilderSection,
    #[serde(default)]
    pub qa: QaSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl ShipyardToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse shipyard.toml")
    }

    /// Load from `path` when given (it must exist), else from `./shipyard.toml`
    /// when present, else defaults. Environment overrides are applied last.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None if Path::new(CONFIG_FILE).exists() => Self::load(Path::new(CONFIG_FILE))?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = self.to_toml()?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize shipyard.toml")
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(port) = lookup("SHIPYARD_PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("SHIPYARD_PORT is not a port: {}", port))?;
        }
        if let Some(db_path) = lookup("SHIPYARD_DB_PATH") {
            self.server.db_path = PathBuf::from(db_path);
        }
        if let Some(url) = lookup("SHIPYARD_BUILDER_URL") {
            self.builder.base_url = url;
        }
        if let Some(url) = lookup("SHIPYARD_WEBDRIVER_URL") {
            self.builder.webdriver_url = url;
        }
        if let Some(model) = lookup("LLM_MODEL") {
            self.llm.model = model;
        }
        Ok(())
    }

    /// Check value ranges the type system cannot express.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let ceiling = shipyard_common::criteria::MAX_ITERATIONS_CEILING;
        if self.campaign.default_max_iterations == 0
            || self.campaign.default_max_iterations > ceiling
        {
            errors.push(format!(
                "campaign.default_max_iterations must be between 1 and {}",
                ceiling
            ));
        }
        if self.builder.preview_poll_interval_ms == 0 {
            errors.push("builder.preview_poll_interval_ms must be positive".to_string());
        }
        if !self.builder.update_path.contains("{id}") {
            errors.push("builder.update_path must contain {id}".to_string());
        }
        if self.builder.preview_url_marker.is_empty() {
            errors.push("builder.preview_url_marker must not be empty".to_string());
        }
        errors
    }

    pub fn qa_webdriver_url(&self) -> &str {
        self.qa
            .webdriver_url
            .as_deref()
            .unwrap_or(&self.builder.webdriver_url)
    }

    pub fn ui_settings(&self) -> UiSettings {
        let b = &self.builder;
        UiSettings {
            base_url: b.base_url.clone(),
            headless: b.headless,
            input_placeholder: b.input_placeholder.clone(),
            ready_timeout: Duration::from_secs(b.ready_timeout_secs),
            input_timeout: Duration::from_secs(b.input_timeout_secs),
            submit_click_timeout: Duration::from_secs(b.submit_click_timeout_secs),
            preview_poll: Poller::new(
                Duration::from_millis(b.preview_poll_interval_ms),
                Duration::from_secs(b.preview_timeout_secs),
            ),
            preview_link: b.preview_link.clone(),
            preview_url_marker: b.preview_url_marker.clone(),
            update_path: b.update_path.clone(),
            storage_state: b.storage_state.clone(),
            profile_dir: b.profile_dir.clone(),
            artifact_dir: b.artifact_dir.clone(),
            ..UiSettings::default()
        }
    }

    pub fn qa_settings(&self) -> QaSettings {
        QaSettings {
            network_idle_timeout: Duration::from_secs(self.qa.network_idle_timeout_secs),
            quiet_window: Duration::from_millis(self.qa.quiet_window_ms),
        }
    }

    pub fn llm_settings(&self) -> LlmSettings {
        LlmSettings {
            api_base: self.llm.api_base.clone(),
            model: self.llm.model.clone(),
            api_key_env: self.llm.api_key_env.clone(),
            timeout: Duration::from_secs(self.llm.timeout_secs),
        }
    }
}

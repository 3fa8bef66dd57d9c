//! Typed error hierarchy for the shipyard orchestrator.
//!
//! One enum per subsystem:
//! - `BrowserError`: WebDriver transport and protocol failures
//! - `DriverError`: build driver protocol failures (auth, locate, submit, poll)
//! - `LlmError`: model collaborator failures (transport, auth, format)
//! - `QaError`: acceptance evaluator mechanics failures
//! - `CampaignError`: controller step failures, wrapping the above

use std::path::PathBuf;
use std::time::Duration;

use shipyard_common::{CriteriaError, InvalidTransition};
use thiserror::Error;
use uuid::Uuid;

/// Path of a diagnostic screenshot captured before an error was raised.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot(pub Option<PathBuf>);

impl std::fmt::Display for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Some(path) => write!(f, "{}", path.display()),
            None => f.write_str("unavailable"),
        }
    }
}

/// Errors from the browser automation layer.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("WebDriver request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("WebDriver error {status} ({error}): {message}")]
    Protocol {
        status: u16,
        error: String,
        message: String,
    },

    #[error("No element matches {locator}")]
    NoSuchElement { locator: String },

    #[error("Timed out after {waited:?} waiting for {what}")]
    Timeout { what: String, waited: Duration },

    #[error("Unexpected WebDriver response: {0}")]
    Malformed(String),
}

/// Errors from a build driver operation (create or update).
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Builder session not ready (likely not logged in). Snapshot: {snapshot}")]
    Session { snapshot: Snapshot },

    #[error("Could not locate {what}. Snapshot: {snapshot}")]
    ElementNotFound { what: String, snapshot: Snapshot },

    #[error("All {attempts} submit strategies failed. Snapshot: {snapshot}")]
    SubmitFailed { attempts: usize, snapshot: Snapshot },

    #[error("Timed out after {waited:?} waiting for a preview location")]
    ResultTimeout { waited: Duration },

    #[error("Builder API error: {0}")]
    Api(String),

    #[error(transparent)]
    Browser(#[from] BrowserError),
}

/// Errors from the model collaborator.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("{0} not set in environment")]
    MissingApiKey(String),

    #[error("Unauthorized (401): check the model API key")]
    Unauthorized,

    #[error("Network error calling model API: {0}")]
    Network(String),

    #[error("Model not found (404). model={model}")]
    NotFound { model: String },

    #[error("Bad request (400): {0}")]
    BadRequest(String),

    #[error("Rate limited (429): {0}")]
    RateLimited(String),

    #[error("Model API error {status}: {detail}")]
    Server { status: u16, detail: String },

    #[error("Unexpected model output: {0}")]
    Format(String),
}

impl LlmError {
    /// Whether a caller may reasonably retry the same request later.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::RateLimited(_) => true,
            Self::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Evaluator mechanics failures. Failing checks are not errors.
#[derive(Debug, Error)]
pub enum QaError {
    #[error("Preview {location} is unreachable: {source}")]
    Unreachable {
        location: String,
        #[source]
        source: BrowserError,
    },

    #[error(transparent)]
    Browser(#[from] BrowserError),
}

/// Errors from a campaign controller step.
#[derive(Debug, Error)]
pub enum CampaignError {
    #[error("Invalid criteria: {0}")]
    InvalidCriteria(#[from] CriteriaError),

    #[error("Ideation failed: {0}")]
    Ideation(#[source] LlmError),

    #[error("Ideation returned no usable ideas")]
    NoIdeas,

    #[error("Spec writing failed: {0}")]
    SpecWriting(#[source] LlmError),

    #[error("Critique failed: {0}")]
    Critique(#[source] LlmError),

    #[error("Build failed: {0}")]
    Build(#[from] DriverError),

    #[error("QA failed: {0}")]
    Qa(#[from] QaError),

    #[error("Run {id} has no external artifact id")]
    MissingExternalId { id: Uuid },

    #[error(transparent)]
    Transition(#[from] InvalidTransition),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

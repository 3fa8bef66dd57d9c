//! Assembles the campaign controller and its collaborators from config.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use crate::browser::WebDriverBrowser;
use crate::builder::{ApiBuildDriver, BuildDriver, StubBuildDriver, UiBuildDriver};
use crate::campaign::{
    CallbackCompletion, CampaignController, CompletionSource, InlineCompletion, RunStore,
};
use crate::config::{BuilderKind, CompletionMode, ShipyardToml};
use crate::llm::{OpenAiModel, ProductModel};
use crate::qa::{AcceptanceRunner, BrowserEvaluator};

const READINESS_INTERVAL: Duration = Duration::from_secs(2);

pub fn build_driver(config: &ShipyardToml) -> Result<Arc<dyn BuildDriver>> {
    let driver: Arc<dyn BuildDriver> = match config.builder.kind {
        BuilderKind::Ui => {
            let browser = Arc::new(WebDriverBrowser::new(config.builder.webdriver_url.clone()));
            Arc::new(UiBuildDriver::new(browser, config.ui_settings()))
        }
        BuilderKind::Api => {
            let key = config.builder.api_key()?;
            Arc::new(
                ApiBuildDriver::new(config.builder.api_url.clone(), key)
                    .context("Failed to build builder API client")?,
            )
        }
        BuilderKind::Stub => Arc::new(StubBuildDriver),
    };
    Ok(driver)
}

pub fn acceptance_runner(config: &ShipyardToml) -> Arc<dyn AcceptanceRunner> {
    let browser = Arc::new(WebDriverBrowser::new(config.qa_webdriver_url()));
    Arc::new(BrowserEvaluator::new(browser, config.qa_settings()))
}

pub fn product_model(config: &ShipyardToml) -> Result<Arc<dyn ProductModel>> {
    let model = OpenAiModel::new(config.llm_settings()).context("Failed to build model client")?;
    Ok(Arc::new(model))
}

pub fn completion_source(config: &ShipyardToml) -> Arc<dyn CompletionSource> {
    match config.campaign.completion {
        CompletionMode::Callback => Arc::new(CallbackCompletion),
        CompletionMode::Inline if config.campaign.readiness_probe => {
            Arc::new(InlineCompletion::with_readiness_probe(
                READINESS_INTERVAL,
                Duration::from_secs(config.campaign.readiness_timeout_secs),
            ))
        }
        CompletionMode::Inline => Arc::new(InlineCompletion::immediate()),
    }
}

/// Production controller: configured builder, WebDriver-backed QA and the
/// chat-completions model, persisting into `store`.
pub fn build_controller(config: &ShipyardToml, store: Arc<dyn RunStore>) -> Result<CampaignController> {
    let builder = build_driver(config)?;
    let controller = CampaignController::new(product_model(config)?, builder, acceptance_runner(config))
        .with_completion(completion_source(config))
        .with_store(store);
    info!(
        builder = config.builder.kind.as_str(),
        completion = controller.completion_mode(),
        model = %config.llm.model,
        "campaign controller ready"
    );
    Ok(controller)
}

//! Browser-driven build driver.
//!
//! The builder only exposes an interactive page, so every operation is:
//! open a session, confirm the page is usable, locate the prompt input
//! through a fallback chain, inject text, submit through a second fallback
//! chain, then poll for a preview location. Each failing step captures a
//! screenshot into the artifact directory before raising.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shipyard_common::ChangeRequest;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{BuildArtifact, BuildDriver, change_prompt};
use crate::browser::{Browser, BrowserSession, ElementRef, Key, Locator, SessionOptions, wait_visible};
use crate::errors::{BrowserError, DriverError, Snapshot};
use crate::fallback::{Strategy, run_chain};
use crate::poll::Poller;

type Session = Box<dyn BrowserSession>;

/// Nearest div/section ancestor that still contains an editable surface.
const CONTAINER_XPATH: &str = "ancestor::*[(self::div or self::section)]\
     [.//textarea or .//*[@contenteditable='true']][1]";

const ICON_CONTROLS: &str = "button:has(svg), [role='button']:has(svg), a:has(svg)";

const LOCATE_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct UiSettings {
    pub base_url: String,
    pub headless: bool,
    /// Case-insensitive substring of the prompt input's placeholder.
    pub input_placeholder: String,
    pub ready_timeout: Duration,
    pub input_timeout: Duration,
    pub submit_click_timeout: Duration,
    pub preview_poll: Poller,
    pub preview_link: String,
    pub preview_url_marker: String,
    /// Path of an existing artifact's editing surface; `{id}` is replaced.
    pub update_path: String,
    pub submit_chord: Vec<Key>,
    pub storage_state: Option<PathBuf>,
    pub profile_dir: Option<PathBuf>,
    pub artifact_dir: PathBuf,
}

impl Default for UiSettings {
    fn default() -> Self {
        let modifier = if cfg!(target_os = "macos") {
            Key::Meta
        } else {
            Key::Control
        };
        Self {
            base_url: "https://app.base44.com".to_string(),
            headless: false,
            input_placeholder: "Describe the app you want to create".to_string(),
            ready_timeout: Duration::from_secs(5),
            input_timeout: Duration::from_secs(15),
            submit_click_timeout: Duration::from_secs(5),
            preview_poll: Poller::new(Duration::from_secs(1), Duration::from_secs(180)),
            preview_link: "a[href*=\"/preview/\"]".to_string(),
            preview_url_marker: "/preview/".to_string(),
            update_path: "/apps/{id}/editor".to_string(),
            submit_chord: vec![modifier, Key::Enter],
            storage_state: None,
            profile_dir: None,
            artifact_dir: PathBuf::from("artifacts"),
        }
    }
}

/// Persisted authentication state (cookies only).
#[derive(Debug, Default, Serialize, Deserialize)]
struct StorageState {
    #[serde(default)]
    cookies: Vec<serde_json::Value>,
}

fn load_storage_state(path: &Path) -> anyhow::Result<StorageState> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn save_storage_state(path: &Path, state: &StorageState) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(state)?)?;
    Ok(())
}

/// Finds the prompt input by one locator within a bounded wait.
struct LocateInput {
    name: &'static str,
    locator: Locator,
    timeout: Duration,
}

#[async_trait]
impl<'s> Strategy<Box<dyn BrowserSession + 's>> for LocateInput {
    type Output = ElementRef;
    type Error = BrowserError;

    fn name(&self) -> &str {
        self.name
    }

    async fn attempt(
        &self,
        session: &mut Box<dyn BrowserSession + 's>,
    ) -> Result<ElementRef, BrowserError> {
        wait_visible(
            session.as_mut(),
            &self.locator,
            Poller::new(LOCATE_INTERVAL, self.timeout),
        )
        .await
    }
}

struct SubmitCtx<'a> {
    session: &'a mut Session,
    input: &'a ElementRef,
}

enum SubmitStrategy {
    /// Icon-bearing control inside the input's own container.
    ContainerIcon { click_timeout: Duration },
    /// Keyboard submit combination.
    Chord(Vec<Key>),
    /// Any icon-bearing control on the page.
    PageIcon { click_timeout: Duration },
    /// Plain confirm keystroke.
    Confirm,
}

async fn click_within(
    session: &mut Session,
    element: &ElementRef,
    timeout: Duration,
) -> Result<(), BrowserError> {
    match tokio::time::timeout(timeout, session.click(element)).await {
        Ok(result) => result,
        Err(_) => Err(BrowserError::Timeout {
            what: "submit click".to_string(),
            waited: timeout,
        }),
    }
}

fn first_or_missing(found: Vec<ElementRef>, locator: &Locator) -> Result<ElementRef, BrowserError> {
    found
        .into_iter()
        .next()
        .ok_or_else(|| BrowserError::NoSuchElement {
            locator: locator.to_string(),
        })
}

#[async_trait]
impl<'a> Strategy<SubmitCtx<'a>> for SubmitStrategy {
    type Output = ();
    type Error = BrowserError;

    fn name(&self) -> &str {
        match self {
            Self::ContainerIcon { .. } => "container-icon",
            Self::Chord(_) => "modifier-enter",
            Self::PageIcon { .. } => "page-icon",
            Self::Confirm => "enter",
        }
    }

    async fn attempt(&self, ctx: &mut SubmitCtx<'a>) -> Result<(), BrowserError> {
        match self {
            Self::ContainerIcon { click_timeout } => {
                let container_locator = Locator::xpath(CONTAINER_XPATH);
                let found = ctx.session.find_within(ctx.input, &container_locator).await?;
                let container = first_or_missing(found, &container_locator)?;
                let icon_locator = Locator::css(ICON_CONTROLS);
                let found = ctx.session.find_within(&container, &icon_locator).await?;
                let icon = first_or_missing(found, &icon_locator)?;
                click_within(ctx.session, &icon, *click_timeout).await
            }
            Self::Chord(keys) => ctx.session.press(keys).await,
            Self::PageIcon { click_timeout } => {
                let icon_locator = Locator::css(ICON_CONTROLS);
                let icon = ctx.session.find(&icon_locator).await?;
                click_within(ctx.session, &icon, *click_timeout).await
            }
            Self::Confirm => ctx.session.press(&[Key::Enter]).await,
        }
    }
}

pub struct UiBuildDriver {
    browser: Arc<dyn Browser>,
    settings: UiSettings,
    /// One builder operation at a time; sessions are never shared.
    op_lock: Mutex<()>,
}

impl UiBuildDriver {
    pub fn new(browser: Arc<dyn Browser>, settings: UiSettings) -> Self {
        Self {
            browser,
            settings,
            op_lock: Mutex::new(()),
        }
    }

    fn persists_auth(&self) -> Option<&Path> {
        if self.settings.profile_dir.is_some() {
            return None;
        }
        self.settings.storage_state.as_deref()
    }

    async fn acquire(&self) -> Result<Session, DriverError> {
        let options = SessionOptions {
            headless: self.settings.headless,
            profile_dir: self.settings.profile_dir.clone(),
        };
        let mut session = self.browser.open(&options).await?;
        if let Some(path) = self.persists_auth()
            && path.exists()
        {
            if let Err(e) = self.restore_auth(&mut session, path).await {
                warn!(path = %path.display(), error = %e, "could not restore builder auth state");
            }
        }
        Ok(session)
    }

    async fn restore_auth(&self, session: &mut Session, path: &Path) -> anyhow::Result<()> {
        let state = load_storage_state(path)?;
        if state.cookies.is_empty() {
            return Ok(());
        }
        // Cookies can only be set for the origin currently loaded.
        session.goto(&self.settings.base_url).await?;
        session.add_cookies(&state.cookies).await?;
        debug!(count = state.cookies.len(), "restored builder cookies");
        Ok(())
    }

    async fn release(&self, mut session: Session) {
        if let Some(path) = self.persists_auth() {
            match session.cookies().await {
                Ok(cookies) => {
                    if let Err(e) = save_storage_state(path, &StorageState { cookies }) {
                        warn!(path = %path.display(), error = %e, "could not persist builder auth state");
                    }
                }
                Err(e) => warn!(error = %e, "could not read builder cookies"),
            }
        }
        if let Err(e) = session.close().await {
            warn!(error = %e, "failed to close builder session");
        }
    }

    async fn snapshot(&self, session: &mut Session, label: &str) -> Snapshot {
        let png = match session.screenshot().await {
            Ok(png) => png,
            Err(e) => {
                warn!(label, error = %e, "diagnostic screenshot failed");
                return Snapshot(None);
            }
        };
        let path = self.settings.artifact_dir.join(format!(
            "{label}_{}.png",
            chrono::Utc::now().format("%Y%m%dT%H%M%S%.3f")
        ));
        let written = std::fs::create_dir_all(&self.settings.artifact_dir)
            .and_then(|_| std::fs::write(&path, png));
        match written {
            Ok(()) => {
                info!(path = %path.display(), "diagnostic screenshot saved");
                Snapshot(Some(path))
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not write diagnostic screenshot");
                Snapshot(None)
            }
        }
    }

    fn input_chain(&self, timeout: Duration) -> [LocateInput; 2] {
        [
            LocateInput {
                name: "placeholder",
                locator: Locator::Placeholder(self.settings.input_placeholder.clone()),
                timeout,
            },
            LocateInput {
                name: "editable-surface",
                locator: Locator::EditableSurface,
                timeout,
            },
        ]
    }

    fn submit_chain(&self) -> [SubmitStrategy; 4] {
        let click_timeout = self.settings.submit_click_timeout;
        [
            SubmitStrategy::ContainerIcon { click_timeout },
            SubmitStrategy::Chord(self.settings.submit_chord.clone()),
            SubmitStrategy::PageIcon { click_timeout },
            SubmitStrategy::Confirm,
        ]
    }

    /// Navigate and confirm the builder surface shows up within the ready
    /// timeout; anything else means the session is not authenticated.
    async fn ensure_ready(&self, session: &mut Session, url: &str) -> Result<(), DriverError> {
        session.goto(url).await?;
        let chain = self.input_chain(self.settings.ready_timeout);
        if let Err(exhausted) = run_chain(&chain, session).await {
            warn!(url, %exhausted, "builder surface not ready");
            let snapshot = self.snapshot(session, "login_missing_builder").await;
            return Err(DriverError::Session { snapshot });
        }
        Ok(())
    }

    async fn locate_input(&self, session: &mut Session) -> Result<ElementRef, DriverError> {
        let chain = self.input_chain(self.settings.input_timeout);
        match run_chain(&chain, session).await {
            Ok(found) => Ok(found.output),
            Err(exhausted) => {
                warn!(%exhausted, "prompt input not found");
                let snapshot = self.snapshot(session, "input_not_found").await;
                Err(DriverError::ElementNotFound {
                    what: "prompt input".to_string(),
                    snapshot,
                })
            }
        }
    }

    async fn inject(
        &self,
        session: &mut Session,
        input: &ElementRef,
        text: &str,
    ) -> Result<(), DriverError> {
        let tag = session.tag_name(input).await?;
        if matches!(tag.as_str(), "textarea" | "input") {
            session.fill(input, text).await?;
        } else {
            session.reset_editable(input).await?;
            session.type_text(input, text).await?;
        }
        debug!(tag = %tag, chars = text.len(), "prompt injected");
        Ok(())
    }

    async fn submit(&self, session: &mut Session, input: &ElementRef) -> Result<(), DriverError> {
        let chain = self.submit_chain();
        let outcome = {
            let mut ctx = SubmitCtx { session: &mut *session, input };
            run_chain(&chain, &mut ctx).await
        };
        match outcome {
            Ok(won) => {
                info!(strategy = %won.name, "prompt submitted");
                Ok(())
            }
            Err(exhausted) => {
                warn!(%exhausted, "submit failed");
                let snapshot = self.snapshot(session, "submit_failed").await;
                Err(DriverError::SubmitFailed {
                    attempts: exhausted.attempts(),
                    snapshot,
                })
            }
        }
    }

    fn resolve(&self, href: &str) -> String {
        if href.starts_with("http://") || href.starts_with("https://") {
            return href.to_string();
        }
        match reqwest::Url::parse(&self.settings.base_url).and_then(|base| base.join(href)) {
            Ok(url) => url.to_string(),
            Err(_) => format!("{}{}", self.settings.base_url.trim_end_matches('/'), href),
        }
    }

    /// Every preview location on offer: visible preview links first, then
    /// open windows whose address carries the preview marker.
    async fn preview_locations(&self, session: &mut Session) -> Result<Vec<String>, BrowserError> {
        let marker = &self.settings.preview_url_marker;
        let links = session
            .find_all(&Locator::css(self.settings.preview_link.clone()))
            .await?;
        let mut found = Vec::new();
        for link in &links {
            if session.is_visible(link).await?
                && let Some(href) = session.attribute(link, "href").await?
                && href.contains(marker.as_str())
            {
                found.push(self.resolve(&href));
            }
        }
        let urls = session.window_urls().await?;
        found.extend(urls.into_iter().filter(|u| u.contains(marker.as_str())));
        Ok(found)
    }

    /// Poll until a preview location outside `known` shows up.
    async fn await_preview(&self, session: &mut Session, known: &[String]) -> Result<String, DriverError> {
        let mut clock = self.settings.preview_poll.start();
        loop {
            match self.preview_locations(session).await {
                Ok(found) => {
                    if let Some(location) = found.into_iter().find(|l| !known.contains(l)) {
                        return Ok(location);
                    }
                }
                Err(e) => debug!(error = %e, "preview probe failed, retrying"),
            }
            if let Err(timeout) = clock.tick().await {
                warn!(waited = ?timeout.waited, "no preview location produced");
                return Err(DriverError::ResultTimeout {
                    waited: timeout.waited,
                });
            }
        }
    }

    async fn create_in(&self, session: &mut Session, prompt: &str) -> Result<BuildArtifact, DriverError> {
        let entry = format!("{}/", self.settings.base_url.trim_end_matches('/'));
        self.ensure_ready(session, &entry).await?;
        let input = self.locate_input(session).await?;
        self.inject(session, &input, prompt).await?;
        self.submit(session, &input).await?;
        let location = self.await_preview(session, &[]).await?;
        Ok(BuildArtifact::from_location(
            location,
            &self.settings.preview_url_marker,
        ))
    }

    async fn update_in(
        &self,
        session: &mut Session,
        external_id: &str,
        change: &ChangeRequest,
    ) -> Result<String, DriverError> {
        let url = format!(
            "{}{}",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.update_path.replace("{id}", external_id)
        );
        self.ensure_ready(session, &url).await?;
        // The editor already links the current preview; only a new one
        // confirms the change.
        let known = self.preview_locations(session).await?;
        debug!(known = known.len(), "preview locations before update");
        let input = self.locate_input(session).await?;
        self.inject(session, &input, &change_prompt(change)).await?;
        self.submit(session, &input).await?;
        self.await_preview(session, &known).await
    }
}

#[async_trait]
impl BuildDriver for UiBuildDriver {
    fn kind(&self) -> &'static str {
        "ui"
    }

    async fn create(&self, prompt: &str) -> Result<BuildArtifact, DriverError> {
        let _guard = self.op_lock.lock().await;
        let mut session = self.acquire().await?;
        let result = self.create_in(&mut session, prompt).await;
        self.release(session).await;
        if let Ok(artifact) = &result {
            info!(
                external_id = %artifact.external_id,
                preview = %artifact.preview_location,
                "builder produced preview"
            );
        }
        result
    }

    async fn update(
        &self,
        external_id: &str,
        change: &ChangeRequest,
    ) -> Result<Option<String>, DriverError> {
        let _guard = self.op_lock.lock().await;
        let mut session = self.acquire().await?;
        let result = self.update_in(&mut session, external_id, change).await;
        self.release(session).await;
        let location = result?;
        info!(external_id, preview = %location, "builder applied change");
        Ok(Some(location))
    }
}

//! Scripted doubles for unit tests: an in-memory page, a model, a builder
//! and an evaluator whose behavior each test dictates.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use shipyard_common::{
    AcceptanceCheck, AcceptanceReport, AppSpec, ChangeRequest, CheckResult, Idea, MvpCriteria,
    RunRecord,
};
use uuid::Uuid;

use crate::browser::{Browser, BrowserSession, ElementRef, Key, Locator, SessionOptions};
use crate::builder::{BuildArtifact, BuildDriver};
use crate::campaign::{RunStore, StatusUpdate};
use crate::errors::{BrowserError, DriverError, LlmError, QaError};
use crate::llm::ProductModel;
use crate::qa::AcceptanceRunner;

pub fn sample_criteria() -> MvpCriteria {
    MvpCriteria {
        target_user: "retail traders".into(),
        primary_outcome: "see market movers at a glance".into(),
        must_haves: vec!["top gainers".into(), "top losers".into()],
        ux_rules: vec![],
        non_goals: vec![],
        perf: Default::default(),
        accessibility: Default::default(),
        max_iterations: 2,
    }
}

pub fn sample_spec() -> AppSpec {
    serde_json::from_value(json!({
        "name": "Market Pulse",
        "screens": [{"id": "overview"}, {"id": "movers"}],
        "acceptance_tests": [
            {"id": "T1", "method": "structural-assert", "target": "#overview", "assert": ["Today"]},
            {"id": "T2", "method": "count-assert", "target": "#movers",
             "assert_count": {"gainer": 3, "loser": 3}}
        ]
    }))
    .unwrap()
}

// ── Browser ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct FakeElement {
    tag: String,
    visible: bool,
    attrs: Vec<(String, String)>,
    html: String,
}

impl FakeElement {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            visible: true,
            attrs: Vec::new(),
            html: String::new(),
        }
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.push((name.to_string(), value.to_string()));
        self
    }

    pub fn html(mut self, html: &str) -> Self {
        self.html = html.to_string();
        self
    }
}

#[derive(Default)]
struct FakePage {
    elements: Vec<FakeElement>,
    /// (scope, locator, element index); scope `None` is the document.
    matches: Vec<(Option<usize>, Locator, usize)>,
    window_urls: Vec<String>,
    cookies: Vec<serde_json::Value>,
    log: Vec<String>,
    fail_keys: bool,
    fail_goto: bool,
    /// Number of upcoming `find_all` calls that fail as if the DOM re-rendered.
    stale_finds: usize,
    open_sessions: usize,
}

impl FakePage {
    fn element(&self, el: &ElementRef) -> Result<&FakeElement, BrowserError> {
        el.0.parse::<usize>()
            .ok()
            .and_then(|i| self.elements.get(i))
            .ok_or_else(|| BrowserError::Malformed(format!("stale element {}", el.0)))
    }

    fn find(&self, scope: Option<usize>, locator: &Locator) -> Vec<ElementRef> {
        self.matches
            .iter()
            .filter(|(s, l, _)| *s == scope && l == locator)
            .map(|(_, _, i)| ElementRef(i.to_string()))
            .collect()
    }

    fn push(&mut self, scope: Option<usize>, locator: Locator, element: FakeElement) -> ElementRef {
        let index = self.elements.len();
        self.elements.push(element);
        self.matches.push((scope, locator, index));
        ElementRef(index.to_string())
    }
}

/// Session over a shared in-memory page. Clones see the same page.
#[derive(Clone, Default)]
pub struct FakeSession {
    page: Arc<Mutex<FakePage>>,
}

impl FakeSession {
    pub fn add(&self, locator: Locator, element: FakeElement) -> ElementRef {
        self.page.lock().unwrap().push(None, locator, element)
    }

    pub fn log(&self) -> Vec<String> {
        self.page.lock().unwrap().log.clone()
    }

    pub fn fail_next_finds(&self, n: usize) {
        self.page.lock().unwrap().stale_finds = n;
    }

    fn record(&self, entry: String) {
        self.page.lock().unwrap().log.push(entry);
    }

    fn tag_of(&self, el: &ElementRef) -> Result<String, BrowserError> {
        Ok(self.page.lock().unwrap().element(el)?.tag.clone())
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn goto(&mut self, url: &str) -> Result<(), BrowserError> {
        self.record(format!("goto {url}"));
        if self.page.lock().unwrap().fail_goto {
            return Err(BrowserError::Protocol {
                status: 500,
                error: "unknown error".into(),
                message: "net::ERR_NAME_NOT_RESOLVED".into(),
            });
        }
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String, BrowserError> {
        Ok(self
            .page
            .lock()
            .unwrap()
            .window_urls
            .first()
            .cloned()
            .unwrap_or_default())
    }

    async fn wait_for_network_idle(&mut self, _: Duration, _: Duration) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn find_all(&mut self, locator: &Locator) -> Result<Vec<ElementRef>, BrowserError> {
        let mut page = self.page.lock().unwrap();
        if page.stale_finds > 0 {
            page.stale_finds -= 1;
            return Err(BrowserError::Protocol {
                status: 404,
                error: "stale element reference".into(),
                message: "element is not attached to the page document".into(),
            });
        }
        Ok(page.find(None, locator))
    }

    async fn find_within(
        &mut self,
        parent: &ElementRef,
        locator: &Locator,
    ) -> Result<Vec<ElementRef>, BrowserError> {
        let scope = parent.0.parse::<usize>().ok();
        Ok(self.page.lock().unwrap().find(scope, locator))
    }

    async fn is_visible(&mut self, el: &ElementRef) -> Result<bool, BrowserError> {
        Ok(self.page.lock().unwrap().element(el)?.visible)
    }

    async fn attribute(&mut self, el: &ElementRef, name: &str) -> Result<Option<String>, BrowserError> {
        let page = self.page.lock().unwrap();
        Ok(page
            .element(el)?
            .attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone()))
    }

    async fn tag_name(&mut self, el: &ElementRef) -> Result<String, BrowserError> {
        self.tag_of(el)
    }

    async fn inner_html(&mut self, el: &ElementRef) -> Result<String, BrowserError> {
        Ok(self.page.lock().unwrap().element(el)?.html.clone())
    }

    async fn fill(&mut self, el: &ElementRef, text: &str) -> Result<(), BrowserError> {
        let tag = self.tag_of(el)?;
        self.record(format!("fill {tag} {text}"));
        Ok(())
    }

    async fn reset_editable(&mut self, el: &ElementRef) -> Result<(), BrowserError> {
        let tag = self.tag_of(el)?;
        self.record(format!("reset {tag}"));
        Ok(())
    }

    async fn type_text(&mut self, el: &ElementRef, text: &str) -> Result<(), BrowserError> {
        let tag = self.tag_of(el)?;
        self.record(format!("type {tag} {text}"));
        Ok(())
    }

    async fn click(&mut self, el: &ElementRef) -> Result<(), BrowserError> {
        let tag = self.tag_of(el)?;
        self.record(format!("click {tag}"));
        Ok(())
    }

    async fn press(&mut self, keys: &[Key]) -> Result<(), BrowserError> {
        if self.page.lock().unwrap().fail_keys {
            return Err(BrowserError::Protocol {
                status: 400,
                error: "element not interactable".into(),
                message: "keyboard focus lost".into(),
            });
        }
        let names: Vec<String> = keys.iter().map(|k| format!("{k:?}")).collect();
        self.record(format!("press {}", names.join("+")));
        Ok(())
    }

    async fn drag(&mut self, from: (i64, i64), to: (i64, i64)) -> Result<(), BrowserError> {
        self.record(format!("drag {},{} -> {},{}", from.0, from.1, to.0, to.1));
        Ok(())
    }

    async fn window_urls(&mut self) -> Result<Vec<String>, BrowserError> {
        Ok(self.page.lock().unwrap().window_urls.clone())
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, BrowserError> {
        Ok(b"\x89PNG\r\n\x1a\n".to_vec())
    }

    async fn cookies(&mut self) -> Result<Vec<serde_json::Value>, BrowserError> {
        self.record("cookies".to_string());
        Ok(self.page.lock().unwrap().cookies.clone())
    }

    async fn add_cookies(&mut self, cookies: &[serde_json::Value]) -> Result<(), BrowserError> {
        self.record(format!("add_cookies {}", cookies.len()));
        self.page.lock().unwrap().cookies.extend_from_slice(cookies);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        let mut page = self.page.lock().unwrap();
        page.open_sessions = page.open_sessions.saturating_sub(1);
        page.log.push("close".to_string());
        Ok(())
    }
}

/// Browser whose every session shares one scripted page.
#[derive(Clone, Default)]
pub struct FakeBrowser {
    session: FakeSession,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, locator: Locator, element: FakeElement) -> ElementRef {
        self.session.add(locator, element)
    }

    pub fn add_child(&self, parent: &ElementRef, locator: Locator, element: FakeElement) -> ElementRef {
        let scope = parent.0.parse::<usize>().ok();
        self.session.page.lock().unwrap().push(scope, locator, element)
    }

    pub fn set_window_urls(&self, urls: Vec<String>) {
        self.session.page.lock().unwrap().window_urls = urls;
    }

    pub fn fail_key_presses(&self) {
        self.session.page.lock().unwrap().fail_keys = true;
    }

    pub fn fail_navigation(&self) {
        self.session.page.lock().unwrap().fail_goto = true;
    }

    pub fn log(&self) -> Vec<String> {
        self.session.log()
    }

    pub fn open_sessions(&self) -> usize {
        self.session.page.lock().unwrap().open_sessions
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn open(&self, _: &SessionOptions) -> Result<Box<dyn BrowserSession>, BrowserError> {
        self.session.page.lock().unwrap().open_sessions += 1;
        Ok(Box::new(self.session.clone()))
    }
}

// ── Campaign collaborators ──────────────────────────────────────────

pub struct ScriptedModel {
    pub ideas: Vec<Idea>,
    pub spec: AppSpec,
    pub ideate_error: Option<LlmError>,
    pub critique_error: Option<LlmError>,
    pub ideate_calls: Arc<AtomicUsize>,
}

impl Default for ScriptedModel {
    fn default() -> Self {
        Self {
            ideas: vec![Idea {
                idea: "Market Pulse".into(),
                score: 0.9,
            }],
            spec: sample_spec(),
            ideate_error: None,
            critique_error: None,
            ideate_calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl ProductModel for ScriptedModel {
    async fn ideate(&self, _: &MvpCriteria) -> Result<Vec<Idea>, LlmError> {
        self.ideate_calls.fetch_add(1, Ordering::SeqCst);
        match &self.ideate_error {
            Some(e) => Err(e.clone()),
            None => Ok(self.ideas.clone()),
        }
    }

    async fn write_spec(&self, _: &MvpCriteria, _: &Idea) -> Result<AppSpec, LlmError> {
        Ok(self.spec.clone())
    }

    async fn critique(&self, _: &AppSpec, report: &AcceptanceReport) -> Result<ChangeRequest, LlmError> {
        if let Some(e) = &self.critique_error {
            return Err(e.clone());
        }
        let failing: Vec<&str> = report.failing().map(|r| r.check_id.as_str()).collect();
        Ok(ChangeRequest {
            target_id: String::new(),
            reason: format!("failing: {}", failing.join(", ")),
            changes: vec![json!("render three gainers")],
        })
    }
}

#[derive(Default)]
pub struct ScriptedBuilder {
    pub create_error: Mutex<Option<DriverError>>,
    pub update_preview: Option<String>,
    pub creates: AtomicUsize,
    pub updates: AtomicUsize,
}

impl ScriptedBuilder {
    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BuildDriver for ScriptedBuilder {
    fn kind(&self) -> &'static str {
        "scripted"
    }

    async fn create(&self, _: &str) -> Result<BuildArtifact, DriverError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.create_error.lock().unwrap().take() {
            return Err(e);
        }
        Ok(BuildArtifact::new("app_0001", "https://preview.test/app_0001"))
    }

    async fn update(&self, external_id: &str, change: &ChangeRequest) -> Result<Option<String>, DriverError> {
        assert_eq!(change.target_id, external_id);
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(self.update_preview.clone())
    }
}

/// Fails the first `failures` passes (check `T2` red), then passes.
pub struct ScriptedQa {
    failures: Option<usize>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    locations: Mutex<Vec<String>>,
}

impl ScriptedQa {
    fn with_failures(failures: Option<usize>) -> Self {
        Self {
            failures,
            delay: None,
            calls: AtomicUsize::new(0),
            locations: Mutex::new(Vec::new()),
        }
    }

    pub fn always_passing() -> Self {
        Self::with_failures(Some(0))
    }

    pub fn always_failing() -> Self {
        Self::with_failures(None)
    }

    pub fn failing_then_passing(failures: usize) -> Self {
        Self::with_failures(Some(failures))
    }

    /// Make every pass take `delay`, like a slow network-idle wait.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn locations(&self) -> Vec<String> {
        self.locations.lock().unwrap().clone()
    }
}

#[async_trait]
impl AcceptanceRunner for ScriptedQa {
    async fn evaluate(&self, location: &str, checks: &[AcceptanceCheck]) -> Result<AcceptanceReport, QaError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.locations.lock().unwrap().push(location.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let passing = self.failures.is_some_and(|n| call >= n);
        let results = checks
            .iter()
            .map(|c| CheckResult {
                check_id: c.id.clone(),
                passed: passing || c.id != "T2",
            })
            .collect();
        Ok(AcceptanceReport::from_results(results))
    }
}

/// Store that rejects every write.
pub struct FailingStore;

#[async_trait]
impl RunStore for FailingStore {
    async fn upsert_run(&self, _: &RunRecord) -> anyhow::Result<()> {
        anyhow::bail!("disk full")
    }

    async fn update_run_status(&self, _: &StatusUpdate) -> anyhow::Result<()> {
        anyhow::bail!("disk full")
    }

    async fn get_run(&self, _: Uuid) -> anyhow::Result<Option<RunRecord>> {
        Ok(None)
    }

    async fn list_runs(&self) -> anyhow::Result<Vec<RunRecord>> {
        Ok(Vec::new())
    }
}

//! Browser automation seam.
//!
//! The build driver and the acceptance evaluator only talk to [`Browser`] and
//! [`BrowserSession`]; `webdriver` provides the production implementation and
//! tests substitute scripted sessions.

pub mod webdriver;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::errors::BrowserError;
use crate::poll::Poller;

pub use webdriver::WebDriverBrowser;

/// How to find elements on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Css(String),
    XPath(String),
    /// Input or editable surface whose placeholder or aria-label contains the
    /// pattern, ignoring ASCII case.
    Placeholder(String),
    /// Any textarea or `contenteditable` surface.
    EditableSurface,
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    pub fn xpath(expr: impl Into<String>) -> Self {
        Self::XPath(expr.into())
    }

    /// Lower to a WebDriver `(using, value)` pair.
    pub fn to_query(&self) -> (&'static str, String) {
        match self {
            Self::Css(selector) => ("css selector", selector.clone()),
            Self::XPath(expr) => ("xpath", expr.clone()),
            Self::Placeholder(pattern) => {
                let needle = xpath_literal(&pattern.to_ascii_lowercase());
                let fold = |attr: &str| {
                    format!(
                        "contains(translate(@{attr}, 'ABCDEFGHIJKLMNOPQRSTUVWXYZ', \
                         'abcdefghijklmnopqrstuvwxyz'), {needle})"
                    )
                };
                (
                    "xpath",
                    format!(
                        "//*[(self::input or self::textarea or @contenteditable='true') \
                         and ({} or {})]",
                        fold("placeholder"),
                        fold("aria-label")
                    ),
                )
            }
            Self::EditableSurface => (
                "css selector",
                "textarea, [contenteditable=\"true\"], [role=\"textbox\"]".to_string(),
            ),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(s) => write!(f, "css `{s}`"),
            Self::XPath(s) => write!(f, "xpath `{s}`"),
            Self::Placeholder(p) => write!(f, "placeholder ~ `{p}`"),
            Self::EditableSurface => f.write_str("editable surface"),
        }
    }
}

/// Quote a string as an XPath 1.0 literal, falling back to `concat()` when it
/// contains both quote kinds.
pub fn xpath_literal(s: &str) -> String {
    if !s.contains('\'') {
        return format!("'{s}'");
    }
    if !s.contains('"') {
        return format!("\"{s}\"");
    }
    let parts: Vec<String> = s.split('\'').map(|p| format!("'{p}'")).collect();
    format!("concat({})", parts.join(", \"'\", "))
}

/// Opaque handle to an element within one session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Control,
    Meta,
    Enter,
}

impl Key {
    /// WebDriver key code point.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Control => "\u{E009}",
            Self::Meta => "\u{E03D}",
            Self::Enter => "\u{E007}",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub headless: bool,
    /// Long-lived browser profile; its authentication state is never overwritten.
    pub profile_dir: Option<PathBuf>,
}

#[async_trait]
pub trait Browser: Send + Sync {
    async fn open(&self, options: &SessionOptions) -> Result<Box<dyn BrowserSession>, BrowserError>;
}

/// One exclusive browser session. Dropping without `close` leaks the remote
/// session, so callers close on every exit path.
#[async_trait]
pub trait BrowserSession: Send {
    async fn goto(&mut self, url: &str) -> Result<(), BrowserError>;

    async fn current_url(&mut self) -> Result<String, BrowserError>;

    /// Wait until the document is loaded and no new resources have been
    /// requested for `quiet`.
    async fn wait_for_network_idle(
        &mut self,
        timeout: Duration,
        quiet: Duration,
    ) -> Result<(), BrowserError>;

    async fn find_all(&mut self, locator: &Locator) -> Result<Vec<ElementRef>, BrowserError>;

    async fn find_within(
        &mut self,
        parent: &ElementRef,
        locator: &Locator,
    ) -> Result<Vec<ElementRef>, BrowserError>;

    async fn is_visible(&mut self, element: &ElementRef) -> Result<bool, BrowserError>;

    async fn attribute(
        &mut self,
        element: &ElementRef,
        name: &str,
    ) -> Result<Option<String>, BrowserError>;

    async fn tag_name(&mut self, element: &ElementRef) -> Result<String, BrowserError>;

    async fn inner_html(&mut self, element: &ElementRef) -> Result<String, BrowserError>;

    /// Form-input semantics: clear then type.
    async fn fill(&mut self, element: &ElementRef, text: &str) -> Result<(), BrowserError>;

    /// Rich-editable semantics: focus, empty the content and fire an `input`
    /// event so the page's framework notices.
    async fn reset_editable(&mut self, element: &ElementRef) -> Result<(), BrowserError>;

    async fn type_text(&mut self, element: &ElementRef, text: &str) -> Result<(), BrowserError>;

    async fn click(&mut self, element: &ElementRef) -> Result<(), BrowserError>;

    /// Press `keys` as one chord (all down in order, then released in reverse).
    async fn press(&mut self, keys: &[Key]) -> Result<(), BrowserError>;

    /// Synthetic pointer down at `from`, move to `to`, pointer up.
    async fn drag(&mut self, from: (i64, i64), to: (i64, i64)) -> Result<(), BrowserError>;

    /// Addresses of every open window or tab.
    async fn window_urls(&mut self) -> Result<Vec<String>, BrowserError>;

    /// PNG bytes of the current viewport.
    async fn screenshot(&mut self) -> Result<Vec<u8>, BrowserError>;

    async fn cookies(&mut self) -> Result<Vec<serde_json::Value>, BrowserError>;

    async fn add_cookies(&mut self, cookies: &[serde_json::Value]) -> Result<(), BrowserError>;

    async fn close(&mut self) -> Result<(), BrowserError>;

    async fn find(&mut self, locator: &Locator) -> Result<ElementRef, BrowserError> {
        self.find_all(locator)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| BrowserError::NoSuchElement {
                locator: locator.to_string(),
            })
    }
}

async fn first_visible(
    session: &mut dyn BrowserSession,
    locator: &Locator,
) -> Result<Option<ElementRef>, BrowserError> {
    for element in session.find_all(locator).await? {
        if session.is_visible(&element).await? {
            return Ok(Some(element));
        }
    }
    Ok(None)
}

/// First visible element matching `locator`, polled until `poller` gives up.
///
/// Protocol errors (stale references while the page re-renders) count as
/// "not yet"; if the final attempt still failed that way, its error is
/// returned instead of a timeout. Transport failures end the wait at once.
pub async fn wait_visible(
    session: &mut dyn BrowserSession,
    locator: &Locator,
    poller: Poller,
) -> Result<ElementRef, BrowserError> {
    let mut clock = poller.start();
    let mut last_error = None;
    loop {
        match first_visible(session, locator).await {
            Ok(Some(element)) => return Ok(element),
            Ok(None) => last_error = None,
            Err(e @ (BrowserError::Protocol { .. } | BrowserError::NoSuchElement { .. })) => {
                debug!(%locator, error = %e, "visibility check failed, retrying");
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
        if let Err(timeout) = clock.tick().await {
            return Err(last_error.unwrap_or(BrowserError::Timeout {
                what: locator.to_string(),
                waited: timeout.waited,
            }));
        }
    }
}

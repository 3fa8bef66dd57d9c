//! W3C WebDriver client over `reqwest`.
//!
//! Talks to any conforming endpoint (chromedriver, geckodriver, a Selenium
//! grid). Only the commands the build driver and evaluator need are wired.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, Method};
use serde_json::{Value, json};
use tracing::debug;

use super::{Browser, BrowserSession, ElementRef, Key, Locator, SessionOptions};
use crate::errors::BrowserError;
use crate::poll::Poller;

/// Key under which W3C WebDriver serializes element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52f-4a56b4f3f1bc";

const IDLE_PROBE_INTERVAL: Duration = Duration::from_millis(250);

const IDLE_PROBE_SCRIPT: &str =
    "return [document.readyState, performance.getEntriesByType('resource').length];";

const RESET_EDITABLE_SCRIPT: &str = "const el = arguments[0]; el.focus(); el.innerText = ''; \
     el.dispatchEvent(new Event('input', { bubbles: true }));";

#[derive(Clone)]
pub struct WebDriverBrowser {
    client: Client,
    endpoint: String,
}

impl WebDriverBrowser {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }

    fn capabilities(options: &SessionOptions) -> Value {
        let mut args = vec![
            "--window-size=1280,900".to_string(),
            "--disable-dev-shm-usage".to_string(),
        ];
        if options.headless {
            args.push("--headless=new".to_string());
        }
        if let Some(dir) = &options.profile_dir {
            args.push(format!("--user-data-dir={}", dir.display()));
        }
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args }
                }
            }
        })
    }
}

#[async_trait]
impl Browser for WebDriverBrowser {
    async fn open(&self, options: &SessionOptions) -> Result<Box<dyn BrowserSession>, BrowserError> {
        let url = format!("{}/session", self.endpoint);
        let value = send(&self.client, Method::POST, &url, Some(Self::capabilities(options))).await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::Malformed(format!("new session: {value}")))?;
        debug!(session_id, "WebDriver session opened");
        Ok(Box::new(WebDriverSession {
            client: self.client.clone(),
            base: format!("{}/session/{}", self.endpoint, session_id),
            closed: false,
        }))
    }
}

pub struct WebDriverSession {
    client: Client,
    base: String,
    closed: bool,
}

impl WebDriverSession {
    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, BrowserError> {
        let url = format!("{}{}", self.base, path);
        send(&self.client, method, &url, body).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, BrowserError> {
        self.command(Method::POST, path, Some(body)).await
    }

    async fn get(&self, path: &str) -> Result<Value, BrowserError> {
        self.command(Method::GET, path, None).await
    }

    async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value, BrowserError> {
        self.post("/execute/sync", json!({ "script": script, "args": args }))
            .await
    }

    async fn perform(&self, actions: Value) -> Result<(), BrowserError> {
        self.post("/actions", json!({ "actions": actions })).await?;
        self.command(Method::DELETE, "/actions", None).await?;
        Ok(())
    }
}

fn element_arg(element: &ElementRef) -> Value {
    json!({ ELEMENT_KEY: element.0 })
}

fn parse_elements(value: Value, locator: &Locator) -> Result<Vec<ElementRef>, BrowserError> {
    let Value::Array(items) = value else {
        return Err(BrowserError::Malformed(format!("find {locator}: {value}")));
    };
    items
        .into_iter()
        .map(|item| {
            item.get(ELEMENT_KEY)
                .and_then(Value::as_str)
                .map(|id| ElementRef(id.to_string()))
                .ok_or_else(|| BrowserError::Malformed(format!("element reference: {item}")))
        })
        .collect()
}

async fn send(
    client: &Client,
    method: Method,
    url: &str,
    body: Option<Value>,
) -> Result<Value, BrowserError> {
    let mut request = client.request(method.clone(), url);
    if method == Method::POST {
        request = request.json(&body.unwrap_or_else(|| json!({})));
    }
    let response = request.send().await.map_err(BrowserError::Transport)?;
    let status = response.status();
    let payload: Value = response.json().await.map_err(BrowserError::Transport)?;
    let value = payload.get("value").cloned().unwrap_or(Value::Null);
    if status.is_success() {
        return Ok(value);
    }
    Err(protocol_error(status.as_u16(), &value))
}

fn protocol_error(status: u16, value: &Value) -> BrowserError {
    let error = value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    if error == "no such element" {
        return BrowserError::NoSuchElement { locator: message };
    }
    BrowserError::Protocol {
        status,
        error,
        message,
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn goto(&mut self, url: &str) -> Result<(), BrowserError> {
        self.post("/url", json!({ "url": url })).await?;
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String, BrowserError> {
        let value = self.get("/url").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn wait_for_network_idle(
        &mut self,
        timeout: Duration,
        quiet: Duration,
    ) -> Result<(), BrowserError> {
        let mut clock = Poller::new(IDLE_PROBE_INTERVAL, timeout).start();
        let mut last_count: Option<u64> = None;
        let mut quiet_since = tokio::time::Instant::now();
        loop {
            let probe = self.execute(IDLE_PROBE_SCRIPT, Vec::new()).await?;
            let ready = probe.get(0).and_then(Value::as_str) == Some("complete");
            let count = probe.get(1).and_then(Value::as_u64).unwrap_or_default();
            if last_count != Some(count) {
                last_count = Some(count);
                quiet_since = tokio::time::Instant::now();
            }
            if ready && quiet_since.elapsed() >= quiet {
                return Ok(());
            }
            clock.tick().await.map_err(|t| BrowserError::Timeout {
                what: "network idle".to_string(),
                waited: t.waited,
            })?;
        }
    }

    async fn find_all(&mut self, locator: &Locator) -> Result<Vec<ElementRef>, BrowserError> {
        let (using, value) = locator.to_query();
        let found = self
            .post("/elements", json!({ "using": using, "value": value }))
            .await?;
        parse_elements(found, locator)
    }

    async fn find_within(
        &mut self,
        parent: &ElementRef,
        locator: &Locator,
    ) -> Result<Vec<ElementRef>, BrowserError> {
        let (using, value) = locator.to_query();
        let found = self
            .post(
                &format!("/element/{}/elements", parent.0),
                json!({ "using": using, "value": value }),
            )
            .await?;
        parse_elements(found, locator)
    }

    async fn is_visible(&mut self, element: &ElementRef) -> Result<bool, BrowserError> {
        let value = self.get(&format!("/element/{}/displayed", element.0)).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn attribute(
        &mut self,
        element: &ElementRef,
        name: &str,
    ) -> Result<Option<String>, BrowserError> {
        let value = self
            .get(&format!("/element/{}/attribute/{}", element.0, name))
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn tag_name(&mut self, element: &ElementRef) -> Result<String, BrowserError> {
        let value = self.get(&format!("/element/{}/name", element.0)).await?;
        Ok(value.as_str().unwrap_or_default().to_ascii_lowercase())
    }

    async fn inner_html(&mut self, element: &ElementRef) -> Result<String, BrowserError> {
        let value = self
            .get(&format!("/element/{}/property/innerHTML", element.0))
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn fill(&mut self, element: &ElementRef, text: &str) -> Result<(), BrowserError> {
        self.post(&format!("/element/{}/clear", element.0), json!({}))
            .await?;
        self.type_text(element, text).await
    }

    async fn reset_editable(&mut self, element: &ElementRef) -> Result<(), BrowserError> {
        self.execute(RESET_EDITABLE_SCRIPT, vec![element_arg(element)])
            .await?;
        Ok(())
    }

    async fn type_text(&mut self, element: &ElementRef, text: &str) -> Result<(), BrowserError> {
        self.post(
            &format!("/element/{}/value", element.0),
            json!({ "text": text }),
        )
        .await?;
        Ok(())
    }

    async fn click(&mut self, element: &ElementRef) -> Result<(), BrowserError> {
        self.post(&format!("/element/{}/click", element.0), json!({}))
            .await?;
        Ok(())
    }

    async fn press(&mut self, keys: &[Key]) -> Result<(), BrowserError> {
        let mut steps: Vec<Value> = keys
            .iter()
            .map(|k| json!({ "type": "keyDown", "value": k.code() }))
            .collect();
        steps.extend(
            keys.iter()
                .rev()
                .map(|k| json!({ "type": "keyUp", "value": k.code() })),
        );
        self.perform(json!([{ "type": "key", "id": "keyboard", "actions": steps }]))
            .await
    }

    async fn drag(&mut self, from: (i64, i64), to: (i64, i64)) -> Result<(), BrowserError> {
        self.perform(json!([{
            "type": "pointer",
            "id": "mouse",
            "parameters": { "pointerType": "mouse" },
            "actions": [
                { "type": "pointerMove", "duration": 0, "origin": "viewport", "x": from.0, "y": from.1 },
                { "type": "pointerDown", "button": 0 },
                { "type": "pointerMove", "duration": 250, "origin": "viewport", "x": to.0, "y": to.1 },
                { "type": "pointerUp", "button": 0 }
            ]
        }]))
        .await
    }

    async fn window_urls(&mut self) -> Result<Vec<String>, BrowserError> {
        let current = self.get("/window").await?;
        let handles = self.get("/window/handles").await?;
        let handles: Vec<String> = handles
            .as_array()
            .map(|a| a.iter().filter_map(|h| h.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let mut urls = Vec::with_capacity(handles.len());
        for handle in &handles {
            self.post("/window", json!({ "handle": handle })).await?;
            urls.push(self.current_url().await?);
        }
        if let Some(original) = current.as_str() {
            self.post("/window", json!({ "handle": original })).await?;
        }
        Ok(urls)
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, BrowserError> {
        let value = self.get("/screenshot").await?;
        let encoded = value
            .as_str()
            .ok_or_else(|| BrowserError::Malformed("screenshot payload".to_string()))?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| BrowserError::Malformed(format!("screenshot base64: {e}")))
    }

    async fn cookies(&mut self) -> Result<Vec<Value>, BrowserError> {
        let value = self.get("/cookie").await?;
        Ok(value.as_array().cloned().unwrap_or_default())
    }

    async fn add_cookies(&mut self, cookies: &[Value]) -> Result<(), BrowserError> {
        for cookie in cookies {
            self.post("/cookie", json!({ "cookie": cookie })).await?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.command(Method::DELETE, "", None).await?;
        Ok(())
    }
}

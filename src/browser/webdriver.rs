use std::time::Duration;
use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use crate::config::BrowserKind;
use crate::errors::{classification::is_crash_message, ProbeError};
use super::session::{BrowserSession, ElementHandle, SessionFactory};

/// W3C element reference key.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Upper bound for non-navigation commands.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// How long `dismiss_prompt` waits for a prompt to show up.
const PROMPT_WAIT: Duration = Duration::from_millis(500);
const PROMPT_POLL: Duration = Duration::from_millis(100);

/// Creates sessions against a running WebDriver server (geckodriver,
/// chromedriver, or a Selenium grid).
pub struct WebDriverFactory {
    client: reqwest::Client,
    endpoint: String,
    browser: BrowserKind,
    page_load_timeout: Duration,
}

impl WebDriverFactory {
    pub fn new(endpoint: &str, browser: BrowserKind, page_load_timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProbeError::Config(format!("Failed to build WebDriver client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            browser,
            page_load_timeout,
        })
    }

    fn capabilities(&self, headless: bool) -> Value {
        let timeouts = json!({
            "pageLoad": self.page_load_timeout.as_millis() as u64,
            "script": 10_000,
            "implicit": 0,
        });
        let mut always = json!({
            "acceptInsecureCerts": true,
            "unhandledPromptBehavior": "dismiss and notify",
            "timeouts": timeouts,
        });
        match self.browser {
            BrowserKind::Firefox => {
                let args: Vec<&str> = if headless { vec!["-headless"] } else { Vec::new() };
                always["browserName"] = json!("firefox");
                always["moz:firefoxOptions"] = json!({
                    "args": args,
                    "prefs": {
                        "dom.disable_beforeunload": true,
                        "security.mixed_content.block_active_content": false,
                    }
                });
            }
            BrowserKind::Chrome => {
                let mut args = vec!["--no-sandbox", "--disable-dev-shm-usage", "--disable-gpu"];
                if headless {
                    args.push("--headless=new");
                }
                always["browserName"] = json!("chrome");
                always["goog:chromeOptions"] = json!({ "args": args });
            }
        }
        json!({ "capabilities": { "alwaysMatch": always } })
    }
}

#[async_trait]
impl SessionFactory for WebDriverFactory {
    async fn create(&self, headless: bool) -> Result<Box<dyn BrowserSession>, ProbeError> {
        let url = format!("{}/session", self.endpoint);
        let response = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(60))
            .json(&self.capabilities(headless))
            .send()
            .await
            .map_err(|e| ProbeError::SessionCreation(format!("WebDriver at {} unreachable: {}", self.endpoint, e)))?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| ProbeError::SessionCreation(format!("Malformed WebDriver response: {}", e)))?;

        if let Some(err) = body["value"]["error"].as_str() {
            let message = body["value"]["message"].as_str().unwrap_or_default();
            return Err(ProbeError::SessionCreation(format!("{}: {}", err, message)));
        }
        let session_id = body["value"]["sessionId"]
            .as_str()
            .ok_or_else(|| ProbeError::SessionCreation("WebDriver returned no session id".into()))?
            .to_string();

        info!(session = %session_id, browser = %self.browser, headless, "Browser session created");
        Ok(Box::new(WebDriverSession {
            client: self.client.clone(),
            base: format!("{}/session/{}", self.endpoint, session_id),
            session_id,
            page_load_timeout: self.page_load_timeout,
            closed: false,
        }))
    }

    fn backend_name(&self) -> &str {
        "webdriver"
    }
}

/// One browser driven over the W3C WebDriver HTTP protocol.
pub struct WebDriverSession {
    client: reqwest::Client,
    session_id: String,
    base: String,
    page_load_timeout: Duration,
    closed: bool,
}

impl WebDriverSession {
    async fn command(&self, method: Method, path: &str, body: Option<Value>, timeout: Duration) -> Result<Value, ProbeError> {
        if self.closed {
            return Err(ProbeError::BackendCrash("Session already closed".into()));
        }
        let url = format!("{}{}", self.base, path);
        let mut request = self.client.request(method, &url).timeout(timeout);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::NavigationTimeout(format!("WebDriver command {} timed out", path))
            } else if e.is_connect() {
                ProbeError::BackendCrash(format!("WebDriver connection lost: {}", e))
            } else {
                ProbeError::Network(e.to_string())
            }
        })?;
        let payload: Value = response
            .json()
            .await
            .map_err(|e| ProbeError::BackendCrash(format!("Malformed WebDriver response: {}", e)))?;

        match payload["value"]["error"].as_str() {
            Some(code) => {
                let message = payload["value"]["message"].as_str().unwrap_or_default();
                Err(map_wire_error(code, message))
            }
            None => Ok(payload["value"].clone()),
        }
    }

    async fn execute(&self, script: &str, args: Value) -> Result<Value, ProbeError> {
        self.command(
            Method::POST,
            "/execute/sync",
            Some(json!({ "script": script, "args": args })),
            COMMAND_TIMEOUT,
        )
        .await
    }

    async fn read_string(&mut self, path: &str) -> Result<String, ProbeError> {
        let first = self.command(Method::GET, path, None, COMMAND_TIMEOUT).await;
        let value = match first {
            Err(ProbeError::Interstitial(text)) => {
                debug!(prompt = %text, "Prompt blocked read, dismissing");
                self.dismiss_prompt().await;
                self.command(Method::GET, path, None, COMMAND_TIMEOUT).await?
            }
            other => other?,
        };
        Ok(value.as_str().unwrap_or_default().to_string())
    }
}

/// Map a W3C error code onto the error taxonomy.
fn map_wire_error(code: &str, message: &str) -> ProbeError {
    match code {
        "timeout" | "script timeout" => ProbeError::NavigationTimeout(message.to_string()),
        "unexpected alert open" => ProbeError::Interstitial(message.to_string()),
        "invalid session id" | "no such window" | "session not created" => {
            ProbeError::BackendCrash(format!("{}: {}", code, message))
        }
        _ if is_crash_message(message) => ProbeError::BackendCrash(format!("{}: {}", code, message)),
        _ => ProbeError::Browser(format!("{}: {}", code, message)),
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), ProbeError> {
        if timeout != self.page_load_timeout {
            self.command(
                Method::POST,
                "/timeouts",
                Some(json!({ "pageLoad": timeout.as_millis() as u64 })),
                COMMAND_TIMEOUT,
            )
            .await?;
            self.page_load_timeout = timeout;
        }
        let result = self
            .command(Method::POST, "/url", Some(json!({ "url": url })), timeout + Duration::from_secs(5))
            .await;
        match result {
            Ok(_) => Ok(()),
            // A prompt raised during load still leaves the page loaded.
            Err(ProbeError::Interstitial(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn load_html(&mut self, html: &str) -> Result<(), ProbeError> {
        // Written into the current document so the origin (and its cookies)
        // carries over to the request the document makes.
        let script = "document.open(); document.write(arguments[0]); document.close();";
        match self.execute(script, json!([html])).await {
            Ok(_) | Err(ProbeError::Interstitial(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn add_cookie(&mut self, name: &str, value: &str, domain: &str) -> Result<(), ProbeError> {
        let cookie = json!({ "cookie": { "name": name, "value": value, "domain": domain, "path": "/" } });
        self.command(Method::POST, "/cookie", Some(cookie), COMMAND_TIMEOUT).await?;
        Ok(())
    }

    async fn current_document(&mut self) -> Result<String, ProbeError> {
        self.read_string("/source").await
    }

    async fn current_url(&mut self) -> Result<String, ProbeError> {
        self.read_string("/url").await
    }

    async fn run_inspection_script(&mut self, script: &str) -> bool {
        match self.execute(script, json!([])).await {
            Ok(value) => value.as_bool().unwrap_or(false),
            Err(e) => {
                debug!(error = %e, "Inspection script failed");
                false
            }
        }
    }

    async fn dismiss_prompt(&mut self) -> Option<String> {
        let deadline = tokio::time::Instant::now() + PROMPT_WAIT;
        loop {
            if let Ok(text) = self.command(Method::GET, "/alert/text", None, COMMAND_TIMEOUT).await {
                let text = text.as_str().unwrap_or_default().to_string();
                if let Err(e) = self.command(Method::POST, "/alert/accept", Some(json!({})), COMMAND_TIMEOUT).await {
                    debug!(error = %e, "Failed to accept prompt");
                }
                return Some(text);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(PROMPT_POLL).await;
        }
    }

    async fn find_elements(&mut self, xpath: &str) -> Result<Vec<ElementHandle>, ProbeError> {
        let value = self
            .command(
                Method::POST,
                "/elements",
                Some(json!({ "using": "xpath", "value": xpath })),
                COMMAND_TIMEOUT,
            )
            .await?;
        Ok(value
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item[ELEMENT_KEY].as_str())
                    .map(|id| ElementHandle(id.to_string()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn hover(&mut self, element: &ElementHandle) -> Result<(), ProbeError> {
        let mut origin = serde_json::Map::new();
        origin.insert(ELEMENT_KEY.to_string(), json!(element.0));
        let actions = json!({
            "actions": [{
                "type": "pointer",
                "id": "mouse",
                "parameters": { "pointerType": "mouse" },
                "actions": [{
                    "type": "pointerMove",
                    "duration": 50,
                    "origin": origin,
                    "x": 0,
                    "y": 0
                }]
            }]
        });
        self.command(Method::POST, "/actions", Some(actions), COMMAND_TIMEOUT).await?;
        Ok(())
    }

    async fn click(&mut self, element: &ElementHandle) -> Result<(), ProbeError> {
        let path = format!("/element/{}/click", element.0);
        self.command(Method::POST, &path, Some(json!({})), COMMAND_TIMEOUT).await?;
        Ok(())
    }

    async fn is_alive(&mut self) -> bool {
        self.command(Method::GET, "/window", None, Duration::from_secs(5)).await.is_ok()
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.command(Method::DELETE, "", None, Duration::from_secs(10)).await {
            warn!(session = %self.session_id, error = %e, "Failed to close browser session");
        }
        self.closed = true;
    }
}

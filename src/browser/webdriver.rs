// W3C WebDriver page driver
//
// Talks to a chromedriver endpoint over HTTP. Bindings are emulated with an
// in-page queue that a background task drains, so page → host messages never
// share memory with the host.

use anyhow::{Context, Result};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, Instrument};

use super::{BrowserLauncher, ElementRef, Key, LaunchOptions, PageDriver, WaitOptions};

const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
const ENTER_KEY: &str = "\u{E007}";
const ELEMENT_POLL: Duration = Duration::from_millis(100);
const BINDING_POLL: Duration = Duration::from_millis(250);

/// Error reported by the WebDriver endpoint
#[derive(Debug, Error)]
#[error("webdriver error '{error}': {message}")]
pub struct WebDriverError {
    pub error: String,
    pub message: String,
}

impl WebDriverError {
    fn is_missing_element(&self) -> bool {
        self.error == "no such element" || self.error == "stale element reference"
    }
}

fn is_missing_element(err: &anyhow::Error) -> bool {
    err.downcast_ref::<WebDriverError>()
        .map(WebDriverError::is_missing_element)
        .unwrap_or(false)
}

#[derive(Clone)]
struct Connection {
    client: reqwest::Client,
    base: String,
}

impl Connection {
    async fn send(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}{}", self.base, path);

        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("WebDriver request failed: {}", url))?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .with_context(|| format!("Invalid WebDriver response from {}", url))?;

        let value = payload.get("value").cloned().unwrap_or(Value::Null);

        if !status.is_success() {
            return Err(WebDriverError {
                error: value["error"].as_str().unwrap_or("unknown error").to_string(),
                message: value["message"].as_str().unwrap_or_default().to_string(),
            }
            .into());
        }

        Ok(value)
    }

    async fn execute(&self, script: &str) -> Result<Value> {
        self.send(
            Method::POST,
            "/execute/sync",
            Some(json!({ "script": script, "args": [] })),
        )
        .await
    }
}

/// Opens Chrome sessions through a chromedriver endpoint
pub struct WebDriverLauncher {
    client: reqwest::Client,
    endpoint: String,
    chrome_binary: Option<String>,
}

impl WebDriverLauncher {
    pub fn new(endpoint: impl Into<String>, chrome_binary: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            chrome_binary,
        }
    }

    fn capabilities(&self, options: &LaunchOptions) -> Value {
        let mut args = vec![
            format!("--lang={}", options.language),
            "--use-fake-ui-for-media-stream".to_string(),
            "--disable-blink-features=AutomationControlled".to_string(),
            "--window-size=1280,720".to_string(),
        ];
        if options.headless {
            args.push("--headless=new".to_string());
        }

        let mut chrome_options = json!({
            "args": args,
            "excludeSwitches": ["enable-automation"],
        });
        if let Some(binary) = &self.chrome_binary {
            chrome_options["binary"] = json!(binary);
        }

        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": chrome_options,
                }
            }
        })
    }
}

#[async_trait::async_trait]
impl BrowserLauncher for WebDriverLauncher {
    async fn launch(&self, options: &LaunchOptions) -> Result<Arc<dyn PageDriver>> {
        info!(
            "Opening browser session via {} (headless={})",
            self.endpoint, options.headless
        );

        let root = Connection {
            client: self.client.clone(),
            base: self.endpoint.clone(),
        };

        let created = root
            .send(Method::POST, "/session", Some(self.capabilities(options)))
            .await
            .context("Failed to create WebDriver session")?;

        let session_id = created["sessionId"]
            .as_str()
            .context("WebDriver session response has no sessionId")?;

        info!("Browser session {} has been started", session_id);

        Ok(Arc::new(WebDriverPage {
            connection: Connection {
                client: self.client.clone(),
                base: format!("{}/session/{}", self.endpoint, session_id),
            },
            closed: Arc::new(AtomicBool::new(false)),
            binding_tasks: Mutex::new(Vec::new()),
        }))
    }
}

/// A page in a WebDriver session
pub struct WebDriverPage {
    connection: Connection,
    closed: Arc<AtomicBool>,
    binding_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl WebDriverPage {
    async fn is_displayed(&self, element: &ElementRef) -> Result<bool> {
        match self
            .connection
            .send(Method::GET, &format!("/element/{}/displayed", element.0), None)
            .await
        {
            Ok(value) => Ok(value.as_bool().unwrap_or(false)),
            Err(e) if is_missing_element(&e) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn poll_for(&self, locator: &str, visible: bool) -> Result<ElementRef> {
        loop {
            if let Some(element) = self.query(locator).await? {
                if !visible || self.is_displayed(&element).await? {
                    return Ok(element);
                }
            }
            tokio::time::sleep(ELEMENT_POLL).await;
        }
    }
}

fn element_id(value: &Value) -> Option<ElementRef> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(|id| ElementRef(id.to_string()))
}

fn install_binding_script(name: &str) -> String {
    let name = serde_json::to_string(name).unwrap_or_default();
    format!(
        r#"
const name = {name};
window.__meetRecorderQueues = window.__meetRecorderQueues || {{}};
window.__meetRecorderQueues[name] = window.__meetRecorderQueues[name] || [];
window[name] = (message) => {{ window.__meetRecorderQueues[name].push(message); }};
return true;
"#
    )
}

fn drain_binding_script(name: &str) -> String {
    let name = serde_json::to_string(name).unwrap_or_default();
    format!(
        r#"
const queues = window.__meetRecorderQueues || {{}};
const drained = queues[{name}] || [];
queues[{name}] = [];
return drained;
"#
    )
}

#[async_trait::async_trait]
impl PageDriver for WebDriverPage {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.connection
            .send(Method::POST, "/url", Some(json!({ "url": url })))
            .await
            .with_context(|| format!("Failed to navigate to {}", url))?;
        Ok(())
    }

    async fn wait_for(&self, locator: &str, options: WaitOptions) -> Result<Option<ElementRef>> {
        let search = self.poll_for(locator, options.visible);

        match options.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, search).await {
                Ok(found) => found.map(Some),
                Err(_) => Ok(None),
            },
            None => search.await.map(Some),
        }
    }

    async fn query(&self, locator: &str) -> Result<Option<ElementRef>> {
        match self
            .connection
            .send(
                Method::POST,
                "/element",
                Some(json!({ "using": "css selector", "value": locator })),
            )
            .await
        {
            Ok(value) => Ok(element_id(&value)),
            Err(e) if is_missing_element(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn type_text(&self, element: &ElementRef, text: &str) -> Result<()> {
        self.connection
            .send(
                Method::POST,
                &format!("/element/{}/value", element.0),
                Some(json!({ "text": text })),
            )
            .await?;
        Ok(())
    }

    async fn press_key(&self, element: &ElementRef, key: Key) -> Result<()> {
        let text = match key {
            Key::Enter => ENTER_KEY,
        };
        self.type_text(element, text).await
    }

    async fn click(&self, element: &ElementRef) -> Result<()> {
        self.connection
            .send(
                Method::POST,
                &format!("/element/{}/click", element.0),
                Some(json!({})),
            )
            .await?;
        Ok(())
    }

    async fn text_content(&self, element: &ElementRef) -> Result<String> {
        let value = self
            .connection
            .send(Method::GET, &format!("/element/{}/text", element.0), None)
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        self.connection.execute(script).await
    }

    async fn expose_binding(&self, name: &str) -> Result<mpsc::Receiver<Value>> {
        self.connection
            .execute(&install_binding_script(name))
            .await
            .with_context(|| format!("Failed to install binding {}", name))?;

        let (tx, rx) = mpsc::channel(100);
        let connection = self.connection.clone();
        let closed = Arc::clone(&self.closed);
        let drain = drain_binding_script(name);
        let name = name.to_string();

        let task = tokio::spawn(
            async move {
                'poll: loop {
                    tokio::time::sleep(BINDING_POLL).await;
                    if closed.load(Ordering::SeqCst) || tx.is_closed() {
                        break;
                    }

                    match connection.execute(&drain).await {
                        Ok(Value::Array(messages)) => {
                            for message in messages {
                                if tx.send(message).await.is_err() {
                                    break 'poll;
                                }
                            }
                        }
                        Ok(_) => {}
                        Err(e) => debug!("Polling binding {} failed: {}", name, e),
                    }
                }
                debug!("Binding {} poller stopped", name);
            }
            .in_current_span(),
        );

        if let Ok(mut tasks) = self.binding_tasks.lock() {
            tasks.push(task);
        }

        Ok(rx)
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Ok(mut tasks) = self.binding_tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }

        self.connection
            .send(Method::DELETE, "", None)
            .await
            .context("Failed to close WebDriver session")?;

        info!("Browser session closed");

        Ok(())
    }
}

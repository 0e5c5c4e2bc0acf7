//! Browser page control
//!
//! The session orchestrator only talks to the page through [`PageDriver`].
//! Element locators are configuration ([`Locators`]); page-side scripts
//! report back over bindings as JSON messages.

pub mod locators;
pub mod scripts;
pub mod webdriver;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub use locators::Locators;
pub use webdriver::{WebDriverLauncher, WebDriverPage};

/// Opaque handle to an element located on the page
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef(pub String);

/// Keys the join protocol needs to press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
}

/// How long and for what to wait when locating an element
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WaitOptions {
    /// Give up after this long; `None` waits indefinitely
    pub timeout: Option<Duration>,
    /// Only match elements that are rendered visible
    pub visible: bool,
}

impl WaitOptions {
    /// Wait indefinitely for a visible element
    pub fn visible() -> Self {
        Self {
            timeout: None,
            visible: true,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Options for opening a browsing session
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Run without a visible window
    pub headless: bool,
    /// Browser UI language, e.g. "en-US"
    pub language: String,
}

/// Page control capability
#[async_trait::async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate the page to an address
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Wait for an element matching `locator`
    ///
    /// Returns `Ok(None)` when the timeout elapses; only driver failures are
    /// errors.
    async fn wait_for(&self, locator: &str, options: WaitOptions) -> Result<Option<ElementRef>>;

    /// Look up an element without waiting
    async fn query(&self, locator: &str) -> Result<Option<ElementRef>>;

    /// Type text into an element
    async fn type_text(&self, element: &ElementRef, text: &str) -> Result<()>;

    /// Press a key while an element has focus
    async fn press_key(&self, element: &ElementRef, key: Key) -> Result<()>;

    /// Click an element
    async fn click(&self, element: &ElementRef) -> Result<()>;

    /// Read an element's text content
    async fn text_content(&self, element: &ElementRef) -> Result<String>;

    /// Evaluate a script in page context and return its JSON value
    ///
    /// The script is a function body; whatever it `return`s is delivered.
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;

    /// Install `window[name]` in the page; every call made from page context
    /// arrives on the returned channel as a JSON message
    async fn expose_binding(&self, name: &str) -> Result<mpsc::Receiver<serde_json::Value>>;

    /// Release the browsing session
    async fn close(&self) -> Result<()>;
}

/// Opens browsing sessions
#[async_trait::async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, options: &LaunchOptions) -> Result<Arc<dyn PageDriver>>;
}

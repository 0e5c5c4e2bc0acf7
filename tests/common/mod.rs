// Scripted in-memory collaborators for integration tests
//
// The fake page answers element lookups from a set of "present" locators that
// tests toggle while the session runs. Counters on every fake let tests assert
// how often each resource was touched.

#![allow(dead_code)]

use anyhow::{bail, Result};
use meet_recorder::browser::{
    BrowserLauncher, ElementRef, Key, LaunchOptions, Locators, PageDriver, WaitOptions,
};
use meet_recorder::capture::{MediaCapture, StreamConfig};
use meet_recorder::recording::{EncoderFactory, EncoderSink, RecordingError};
use meet_recorder::session::{Collaborators, SessionConfig};
use meet_recorder::summary::Summarizer;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

pub const MEETING_URL: &str = "https://meet.google.com/abc-defg-hij";

// ============================================================================
// Page driver
// ============================================================================

#[derive(Default)]
pub struct FakePage {
    present: Mutex<HashSet<String>>,
    texts: Mutex<HashMap<String, String>>,
    binding: Mutex<Option<mpsc::Sender<Value>>>,
    pub navigated: Mutex<Vec<String>>,
    pub typed: Mutex<Vec<String>>,
    pub clicked: Mutex<Vec<String>>,
    pub scripts: Mutex<Vec<String>>,
    pub fail_navigation: AtomicBool,
    pub closes: AtomicUsize,
}

impl FakePage {
    /// A page where every step of the join protocol succeeds immediately
    pub fn joinable(locators: &Locators) -> Arc<Self> {
        let page = Arc::new(Self::default());
        page.show(&locators.name_input);
        page.show(&locators.call_active);
        page.show(&locators.captions_toggle);
        page.show(&locators.meeting_title);
        page.set_text(&locators.meeting_title, " Weekly Sync ");
        page.show(&locators.participant_count);
        page.set_text(&locators.participant_count, "3");
        page
    }

    pub fn show(&self, locator: &str) {
        self.present.lock().unwrap().insert(locator.to_string());
    }

    pub fn hide(&self, locator: &str) {
        self.present.lock().unwrap().remove(locator);
    }

    pub fn set_text(&self, locator: &str, text: &str) {
        self.texts
            .lock()
            .unwrap()
            .insert(locator.to_string(), text.to_string());
    }

    fn find(&self, locator: &str) -> Option<ElementRef> {
        self.present
            .lock()
            .unwrap()
            .contains(locator)
            .then(|| ElementRef(locator.to_string()))
    }

    /// Deliver a message through the exposed binding, as page scripts would
    pub async fn emit(&self, message: Value) -> bool {
        let sender = self.binding.lock().unwrap().clone();
        match sender {
            Some(sender) => sender.send(message).await.is_ok(),
            None => false,
        }
    }

    pub fn has_binding(&self) -> bool {
        self.binding.lock().unwrap().is_some()
    }

    pub fn was_clicked(&self, locator: &str) -> bool {
        self.clicked.lock().unwrap().iter().any(|c| c == locator)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PageDriver for FakePage {
    async fn navigate(&self, url: &str) -> Result<()> {
        if self.fail_navigation.load(Ordering::SeqCst) {
            bail!("net::ERR_NAME_NOT_RESOLVED");
        }
        self.navigated.lock().unwrap().push(url.to_string());
        Ok(())
    }

    async fn wait_for(&self, locator: &str, options: WaitOptions) -> Result<Option<ElementRef>> {
        let deadline = options.timeout.map(|t| Instant::now() + t);
        loop {
            if let Some(element) = self.find(locator) {
                return Ok(Some(element));
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Ok(None);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn query(&self, locator: &str) -> Result<Option<ElementRef>> {
        Ok(self.find(locator))
    }

    async fn type_text(&self, _element: &ElementRef, text: &str) -> Result<()> {
        self.typed.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn press_key(&self, _element: &ElementRef, _key: Key) -> Result<()> {
        Ok(())
    }

    async fn click(&self, element: &ElementRef) -> Result<()> {
        self.clicked.lock().unwrap().push(element.0.clone());
        Ok(())
    }

    async fn text_content(&self, element: &ElementRef) -> Result<String> {
        Ok(self
            .texts
            .lock()
            .unwrap()
            .get(&element.0)
            .cloned()
            .unwrap_or_default())
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        self.scripts.lock().unwrap().push(script.to_string());
        Ok(Value::Bool(true))
    }

    async fn expose_binding(&self, _name: &str) -> Result<mpsc::Receiver<Value>> {
        let (tx, rx) = mpsc::channel(64);
        *self.binding.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeLauncher {
    pub page: Arc<FakePage>,
    pub launches: AtomicUsize,
    pub last_options: Mutex<Option<LaunchOptions>>,
}

impl FakeLauncher {
    pub fn new(page: Arc<FakePage>) -> Arc<Self> {
        Arc::new(Self {
            page,
            launches: AtomicUsize::new(0),
            last_options: Mutex::new(None),
        })
    }
}

#[async_trait::async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self, options: &LaunchOptions) -> Result<Arc<dyn PageDriver>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        *self.last_options.lock().unwrap() = Some(options.clone());
        Ok(self.page.clone() as Arc<dyn PageDriver>)
    }
}

// ============================================================================
// Media capture
// ============================================================================

#[derive(Default)]
pub struct CaptureState {
    sender: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
}

impl CaptureState {
    /// Push bytes into the live media stream
    pub async fn feed(&self, chunk: &[u8]) -> bool {
        let sender = self.sender.lock().unwrap().clone();
        match sender {
            Some(sender) => sender.send(chunk.to_vec()).await.is_ok(),
            None => false,
        }
    }
}

pub struct FakeCapture {
    state: Arc<CaptureState>,
}

#[async_trait::async_trait]
impl MediaCapture for FakeCapture {
    async fn start(&mut self, _options: &StreamConfig) -> Result<mpsc::Receiver<Vec<u8>>> {
        let (tx, rx) = mpsc::channel(16);
        *self.state.sender.lock().unwrap() = Some(tx);
        self.state.starts.fetch_add(1, Ordering::SeqCst);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.state.sender.lock().unwrap().take();
        self.state.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.state.sender.lock().unwrap().is_some()
    }

    fn name(&self) -> &str {
        "fake"
    }
}

// ============================================================================
// Encoder
// ============================================================================

#[derive(Default)]
pub struct FakeEncoderFactory {
    pub fail_spawn: AtomicBool,
    pub fail_writes: AtomicBool,
    pub spawns: AtomicUsize,
    pub finishes: Arc<AtomicUsize>,
    pub written: Arc<Mutex<Vec<u8>>>,
    pub outputs: Mutex<Vec<PathBuf>>,
}

impl FakeEncoderFactory {
    pub fn bytes_written(&self) -> Vec<u8> {
        self.written.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl EncoderFactory for FakeEncoderFactory {
    async fn spawn(&self, output: &Path) -> Result<Box<dyn EncoderSink>, RecordingError> {
        if self.fail_spawn.load(Ordering::SeqCst) {
            return Err(RecordingError::Spawn(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "ffmpeg not found",
            )));
        }
        self.spawns.fetch_add(1, Ordering::SeqCst);
        self.outputs.lock().unwrap().push(output.to_path_buf());
        Ok(Box::new(FakeSink {
            fail_writes: self.fail_writes.load(Ordering::SeqCst),
            finishes: self.finishes.clone(),
            written: self.written.clone(),
        }))
    }
}

pub struct FakeSink {
    fail_writes: bool,
    finishes: Arc<AtomicUsize>,
    written: Arc<Mutex<Vec<u8>>>,
}

#[async_trait::async_trait]
impl EncoderSink for FakeSink {
    async fn write(&mut self, chunk: &[u8]) -> Result<(), RecordingError> {
        if self.fail_writes {
            return Err(RecordingError::Write(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "broken pipe",
            )));
        }
        self.written.lock().unwrap().extend_from_slice(chunk);
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), RecordingError> {
        self.finishes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Summarizer
// ============================================================================

#[derive(Default)]
pub struct FakeSummarizer {
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
    pub last_transcript: Mutex<Option<String>>,
}

#[async_trait::async_trait]
impl Summarizer for FakeSummarizer {
    async fn summarize(&self, _credential: &str, _prompt: &str, transcript: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_transcript.lock().unwrap() = Some(transcript.to_string());
        if self.fail.load(Ordering::SeqCst) {
            bail!("quota exceeded");
        }
        Ok("Discussed the roadmap.".to_string())
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Every fake a session needs, with handles kept for assertions
pub struct Harness {
    pub page: Arc<FakePage>,
    pub launcher: Arc<FakeLauncher>,
    pub capture: Arc<CaptureState>,
    pub encoder: Arc<FakeEncoderFactory>,
    pub summarizer: Arc<FakeSummarizer>,
}

impl Harness {
    pub fn new() -> Self {
        let page = FakePage::joinable(&Locators::default());
        Self {
            launcher: FakeLauncher::new(page.clone()),
            page,
            capture: Arc::new(CaptureState::default()),
            encoder: Arc::new(FakeEncoderFactory::default()),
            summarizer: Arc::new(FakeSummarizer::default()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            launcher: self.launcher.clone(),
            capture: Box::new(FakeCapture {
                state: self.capture.clone(),
            }),
            encoder: self.encoder.clone(),
            summarizer: Some(self.summarizer.clone() as Arc<dyn Summarizer>),
        }
    }
}

/// Session config with short timings, recording into `dir`
pub fn session_config(dir: &Path) -> SessionConfig {
    let mut config = SessionConfig::new("Notetaker", MEETING_URL);
    config.recording_location = dir.to_string_lossy().into_owned();
    config.probe_interval_ms = 20;
    config.optional_step_timeout_ms = 50;
    config
}

/// Page message shaped like the ones the in-page scripts send
pub fn caption_message(speaker: &str, text: &str) -> Value {
    serde_json::json!({
        "speaker": { "name": speaker, "profilePicture": "" },
        "text": text,
        "date": 1_700_000_000_000.0,
        "source": "captions",
    })
}

/// Poll `condition` until it holds or two seconds pass
pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

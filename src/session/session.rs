use anyhow::Context;
use chrono::Utc;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use super::config::SessionConfig;
use super::error::SessionError;
use super::result::MeetingResult;
use super::state::{RecordingStatus, SessionDetails, SessionSnapshot, StopReason};
use super::transcript::{to_text, TranscriptAggregator, TranscriptEntry};
use crate::browser::scripts::{self, TRANSCRIPT_BINDING};
use crate::browser::{BrowserLauncher, ElementRef, Key, LaunchOptions, PageDriver, WaitOptions};
use crate::capture::{MediaCapture, StreamConfig};
use crate::recording::{EncoderFactory, RecordingError, RecordingPipeline};
use crate::summary::Summarizer;
use crate::watcher::{KickedProbe, ParticipantCountProbe, TerminationProbe, TerminationWatcher};

/// External collaborators a session drives
pub struct Collaborators {
    /// Opens the browsing session
    pub launcher: Arc<dyn BrowserLauncher>,

    /// Captures the page's audio/video once the call is active
    pub capture: Box<dyn MediaCapture>,

    /// Spawns the encoder writing the recording file
    pub encoder: Arc<dyn EncoderFactory>,

    /// Used when the session carries a summarization credential
    pub summarizer: Option<Arc<dyn Summarizer>>,
}

type EndHandler = Box<dyn FnOnce(&MeetingResult) + Send>;

/// Everything finalize has to release
struct Resources {
    page: Option<Arc<dyn PageDriver>>,
    capture: Option<Box<dyn MediaCapture>>,
    pipeline: Option<RecordingPipeline>,
    watcher: Option<TerminationWatcher>,
    tasks: Vec<JoinHandle<()>>,
}

struct SessionInner {
    id: String,
    config: SessionConfig,
    stream: StreamConfig,
    span: Span,

    launcher: Arc<dyn BrowserLauncher>,
    encoder: Arc<dyn EncoderFactory>,
    summarizer: Option<Arc<dyn Summarizer>>,

    /// Lifecycle status; the STARTED → STOPPED transition is the finalize fence
    status: watch::Sender<RecordingStatus>,
    details: StdMutex<SessionDetails>,
    transcript: TranscriptAggregator,
    resources: Mutex<Resources>,
    joining: AtomicBool,

    result: watch::Sender<Option<MeetingResult>>,
    end_handlers: StdMutex<Vec<EndHandler>>,
}

/// A meeting attendance session
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct MeetingSession {
    inner: Arc<SessionInner>,
}

impl MeetingSession {
    /// Validate the config and prepare the recording location
    pub fn new(config: SessionConfig, collaborators: Collaborators) -> Result<Self, SessionError> {
        config.validate()?;

        let id = format!("meeting-{}", uuid::Uuid::new_v4());
        let span = info_span!("session", id = %id);

        let output_path = config.prepare_output(Utc::now().timestamp_millis())?;

        span.in_scope(|| {
            info!(
                "Session created for {} (record={}, output={})",
                config.meeting_url,
                config.record_meeting,
                output_path.display()
            )
        });

        let (status, _) = watch::channel(RecordingStatus::NotStarted);
        let (result, _) = watch::channel(None);

        Ok(Self {
            inner: Arc::new(SessionInner {
                id,
                stream: config.stream(),
                config,
                span,
                launcher: collaborators.launcher,
                encoder: collaborators.encoder,
                summarizer: collaborators.summarizer,
                status,
                details: StdMutex::new(SessionDetails {
                    output_path: Some(output_path),
                    ..Default::default()
                }),
                transcript: TranscriptAggregator::new(),
                resources: Mutex::new(Resources {
                    page: None,
                    capture: Some(collaborators.capture),
                    pipeline: None,
                    watcher: None,
                    tasks: Vec::new(),
                }),
                joining: AtomicBool::new(false),
                result,
                end_handlers: StdMutex::new(Vec::new()),
            }),
        })
    }

    /// Create a session and run the join protocol
    pub async fn launch(config: SessionConfig, collaborators: Collaborators) -> Result<Self, SessionError> {
        let session = Self::new(config, collaborators)?;
        session.start().await?;
        Ok(session)
    }

    /// Join the meeting, start recording, and arm termination detection
    ///
    /// Returns once the session is live and every background task has been
    /// wired. Steps that wait for the meeting UI are unbounded unless the
    /// config sets a join deadline.
    pub async fn start(&self) -> Result<(), SessionError> {
        if self.inner.joining.swap(true, Ordering::SeqCst) || self.status() == RecordingStatus::Stopped {
            return Err(SessionError::InvalidState(self.status()));
        }

        let outcome = self.run_join().instrument(self.inner.span.clone()).await;

        if let Err(e) = &outcome {
            self.details().failure = Some(e.to_string());
        }

        outcome
    }

    /// Stop the session and produce its result
    ///
    /// Only the first call while the session is live finalizes; every other
    /// call returns `None` without touching any resource.
    pub async fn stop(&self) -> Option<MeetingResult> {
        self.stop_with(StopReason::Requested).await
    }

    /// Tear the session down whatever its state
    ///
    /// A live session is stopped as by [`stop`](Self::stop). A session still
    /// joining is cancelled: pending join steps give up with
    /// [`SessionError::Aborted`] and whatever the join acquired is released,
    /// without producing a result.
    pub async fn abort(&self) -> Option<MeetingResult> {
        let cancelled = self.inner.status.send_if_modified(|status| {
            if *status == RecordingStatus::NotStarted {
                *status = RecordingStatus::Stopped;
                true
            } else {
                false
            }
        });

        if !cancelled {
            return self.stop().await;
        }

        {
            let mut details = self.details();
            details.ended_at = Some(Utc::now());
            details.failure.get_or_insert_with(|| SessionError::Aborted.to_string());
        }

        self.release().instrument(self.inner.span.clone()).await;
        None
    }

    /// STARTED → PAUSED; transcript fragments are dropped while paused
    pub fn pause(&self) -> bool {
        // The flag flips under the status lock so it never disagrees with it
        let paused = self.inner.status.send_if_modified(|status| {
            if *status == RecordingStatus::Started {
                *status = RecordingStatus::Paused;
                self.inner.transcript.set_accepting(false);
                true
            } else {
                false
            }
        });

        if paused {
            info!(parent: &self.inner.span, "Session paused");
        }

        paused
    }

    /// PAUSED → STARTED
    pub fn resume(&self) -> bool {
        let resumed = self.inner.status.send_if_modified(|status| {
            if *status == RecordingStatus::Paused {
                *status = RecordingStatus::Started;
                self.inner.transcript.set_accepting(true);
                true
            } else {
                false
            }
        });

        if resumed {
            info!(parent: &self.inner.span, "Session resumed");
        }

        resumed
    }

    /// Register a handler for the end of the session
    ///
    /// Returns false, without keeping the handler, if the session already
    /// ended.
    pub fn on_end<F>(&self, handler: F) -> bool
    where
        F: FnOnce(&MeetingResult) + Send + 'static,
    {
        let mut handlers = lock(&self.inner.end_handlers);
        if self.inner.result.borrow().is_some() {
            return false;
        }
        handlers.push(Box::new(handler));
        true
    }

    /// Wait until the session has produced its result
    pub async fn wait_for_end(&self) -> Option<MeetingResult> {
        let mut rx = self.inner.result.subscribe();
        loop {
            let current = rx.borrow_and_update().clone();
            if current.is_some() {
                return current;
            }
            if rx.changed().await.is_err() {
                return None;
            }
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn status(&self) -> RecordingStatus {
        *self.inner.status.borrow()
    }

    pub fn title(&self) -> Option<String> {
        self.details().title.clone()
    }

    /// Recording file path, computed when the session was created
    pub fn output_path(&self) -> Option<PathBuf> {
        self.details().output_path.clone()
    }

    /// Transcript accumulated so far
    pub async fn transcript(&self) -> Vec<TranscriptEntry> {
        self.inner.transcript.snapshot().await
    }

    /// The result, once the session has ended
    pub fn result(&self) -> Option<MeetingResult> {
        self.inner.result.borrow().clone()
    }

    /// Whether the session is done: finalized, failed to join, or aborted
    pub fn has_ended(&self) -> bool {
        self.inner.result.borrow().is_some() || self.details().failure.is_some()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let transcript_entries = self.inner.transcript.len().await;
        let details = self.details().clone();

        SessionSnapshot {
            id: self.inner.id.clone(),
            status: self.status(),
            meeting_url: self.inner.config.meeting_url.clone(),
            title: details.title,
            output_path: details.output_path,
            transcript_entries,
            started_at: details.started_at,
            ended_at: details.ended_at,
            stop_reason: details.stop_reason,
            error: details.failure,
        }
    }

    fn details(&self) -> MutexGuard<'_, SessionDetails> {
        lock(&self.inner.details)
    }

    // ------------------------------------------------------------------
    // Join protocol
    // ------------------------------------------------------------------

    async fn run_join(&self) -> Result<(), SessionError> {
        let config = &self.inner.config;
        let deadline = config.join_timeout().map(|t| Instant::now() + t);

        info!("Launching browser (debug={})", config.debug);

        let page = self
            .inner
            .launcher
            .launch(&LaunchOptions {
                headless: !config.debug,
                language: config.language.clone(),
            })
            .await
            .map_err(SessionError::join("browser launch"))?;

        {
            let mut resources = self.inner.resources.lock().await;
            if self.status() == RecordingStatus::Stopped {
                drop(resources);
                close_page(page).await;
                return Err(SessionError::Aborted);
            }
            resources.page = Some(Arc::clone(&page));
        }

        if let Err(e) = self.join(&page, deadline).await {
            error!("Join failed: {}", e);
            self.release().await;
            return Err(e);
        }

        self.after_join(&page).await;

        Ok(())
    }

    /// Required steps up to STARTED; any failure aborts the session
    async fn join(&self, page: &Arc<dyn PageDriver>, deadline: Option<Instant>) -> Result<(), SessionError> {
        let config = &self.inner.config;
        let locators = &config.locators;

        self.within(deadline, "navigation", page.navigate(&config.meeting_url))
            .await?
            .map_err(SessionError::join("navigation"))?;

        info!("Meeting page opened: {}", config.meeting_url);

        let name_input = self
            .required(page, &locators.name_input, "name entry", deadline)
            .await?;
        page.type_text(&name_input, &config.name)
            .await
            .map_err(SessionError::join("name entry"))?;
        page.press_key(&name_input, Key::Enter)
            .await
            .map_err(SessionError::join("name entry"))?;

        info!("Name has been entered");

        self.dismiss(
            page,
            &locators.mic_prompt,
            &locators.mic_prompt_dismiss,
            "microphone prompt",
        )
        .await;

        info!("Waiting for the meeting to start");
        self.required(page, &locators.call_active, "active call", deadline)
            .await?;
        info!("Meeting has been started");

        if config.record_meeting {
            self.start_recording().await?;
        }

        self.details().started_at = Some(Utc::now());
        let started = self.inner.status.send_if_modified(|status| {
            if *status == RecordingStatus::NotStarted {
                *status = RecordingStatus::Started;
                true
            } else {
                false
            }
        });
        if !started {
            self.details().started_at = None;
            return Err(SessionError::Aborted);
        }

        info!("Session started");

        Ok(())
    }

    /// Steps after STARTED; failures degrade the session but never abort it
    async fn after_join(&self, page: &Arc<dyn PageDriver>) {
        let config = &self.inner.config;
        let locators = &config.locators;

        self.dismiss(
            page,
            &locators.keep_safe_notice,
            &locators.keep_safe_dismiss,
            "safety notice",
        )
        .await;

        info!("Enabling captions");
        match self
            .unless_stopped(page.wait_for(&locators.captions_toggle, WaitOptions::default()))
            .await
        {
            Some(Ok(Some(toggle))) => match page.click(&toggle).await {
                Ok(()) => info!("Captions have been enabled"),
                Err(e) => warn!("Failed to enable captions: {:#}", e),
            },
            Some(Ok(None)) => warn!("Captions control not found"),
            Some(Err(e)) => warn!("Failed to locate captions control: {:#}", e),
            None => return,
        }

        info!("Caption language is {} (not switched automatically)", config.language);

        if let Err(e) = self.wire_transcript(page).await {
            warn!("Transcript capture unavailable: {:#}", e);
        }

        match self.unless_stopped(read_title(page, &locators.meeting_title)).await {
            Some(Ok(title)) => {
                info!("Meeting title: {}", title);
                self.details().title = Some(title);
            }
            Some(Err(e)) => warn!("Failed to read meeting title: {:#}", e),
            None => return,
        }

        self.start_watcher(page).await;
    }

    async fn required(
        &self,
        page: &Arc<dyn PageDriver>,
        locator: &str,
        step: &'static str,
        deadline: Option<Instant>,
    ) -> Result<ElementRef, SessionError> {
        self.within(deadline, step, page.wait_for(locator, WaitOptions::visible()))
            .await?
            .map_err(SessionError::join(step))?
            .ok_or(SessionError::JoinTimeout { step })
    }

    /// Best-effort: click `control` if `notice` shows up within the optional
    /// step timeout
    async fn dismiss(&self, page: &Arc<dyn PageDriver>, notice: &str, control: &str, what: &str) -> bool {
        let timeout = self.inner.config.optional_step_timeout();
        let bounded = WaitOptions::visible().with_timeout(timeout);

        info!("Checking for {}", what);

        match page.wait_for(notice, bounded).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                info!("No {} within {}ms", what, timeout.as_millis());
                return false;
            }
            Err(e) => {
                warn!("Failed to look for {}: {:#}", what, e);
                return false;
            }
        }

        let button = match page.wait_for(control, bounded).await {
            Ok(Some(button)) => button,
            Ok(None) => {
                info!("{} has no dismiss control", what);
                return false;
            }
            Err(e) => {
                warn!("Failed to look for {} control: {:#}", what, e);
                return false;
            }
        };

        match page.click(&button).await {
            Ok(()) => {
                info!("Dismissed {}", what);
                true
            }
            Err(e) => {
                warn!("Failed to dismiss {}: {:#}", what, e);
                false
            }
        }
    }

    /// Start capture and the encoder; the pipeline is running on success
    async fn start_recording(&self) -> Result<(), SessionError> {
        let output = self
            .output_path()
            .ok_or_else(|| RecordingError::Capture("no output path".to_string()))?;

        let mut resources = self.inner.resources.lock().await;
        if self.status() == RecordingStatus::Stopped {
            return Err(SessionError::Aborted);
        }

        let mut capture = resources
            .capture
            .take()
            .ok_or_else(|| RecordingError::Capture("capture backend already used".to_string()))?;

        info!("Start recording with {}", capture.name());

        let stream = match capture.start(&self.inner.stream).await {
            Ok(stream) => stream,
            Err(e) => {
                resources.capture = Some(capture);
                return Err(RecordingError::Capture(format!("{:#}", e)).into());
            }
        };

        let sink = match self.inner.encoder.spawn(&output).await {
            Ok(sink) => sink,
            Err(e) => {
                if let Err(stop_err) = capture.stop().await {
                    warn!("Failed to stop capture after encoder failure: {:#}", stop_err);
                }
                resources.capture = Some(capture);
                return Err(e.into());
            }
        };

        resources.pipeline = Some(RecordingPipeline::start(output, stream, sink));
        resources.capture = Some(capture);

        Ok(())
    }

    async fn wire_transcript(&self, page: &Arc<dyn PageDriver>) -> anyhow::Result<()> {
        let locators = &self.inner.config.locators;

        let mut messages = page.expose_binding(TRANSCRIPT_BINDING).await?;

        page.evaluate(&scripts::caption_observer(TRANSCRIPT_BINDING, &locators.caption_region))
            .await
            .context("Failed to install caption observer")?;
        info!("Caption observer installed");

        match page.evaluate(&scripts::speech_recognition(TRANSCRIPT_BINDING)).await {
            Ok(serde_json::Value::Bool(false)) => {
                info!("Speech recognition fallback not supported by the browser")
            }
            Ok(_) => info!("Speech recognition fallback installed"),
            Err(e) => warn!("Failed to set up speech recognition fallback: {:#}", e),
        }

        let sink = self.inner.transcript.sink();
        let pump = tokio::spawn(
            async move {
                while let Some(message) = messages.recv().await {
                    match TranscriptEntry::from_page_message(message) {
                        Ok(entry) => {
                            debug!("{}: {}", entry.speaker.name, entry.text);
                            if !sink.push(entry).await {
                                debug!("Transcript fragment dropped");
                            }
                        }
                        Err(e) => warn!("Ignoring transcript message: {:#}", e),
                    }
                }
            }
            .in_current_span(),
        );

        let mut resources = self.inner.resources.lock().await;
        if self.status() == RecordingStatus::Stopped {
            pump.abort();
        } else {
            resources.tasks.push(pump);
        }

        Ok(())
    }

    async fn start_watcher(&self, page: &Arc<dyn PageDriver>) {
        let locators = &self.inner.config.locators;

        let probes: Vec<Arc<dyn TerminationProbe>> = vec![
            Arc::new(ParticipantCountProbe::new(
                Arc::clone(page),
                locators.participant_count.clone(),
            )),
            Arc::new(KickedProbe::new(Arc::clone(page), locators.removed_heading.clone())),
        ];

        let signal = {
            let mut resources = self.inner.resources.lock().await;
            if self.status() == RecordingStatus::Stopped {
                return;
            }
            let mut watcher = TerminationWatcher::new(probes, self.inner.config.probe_interval());
            let signal = watcher.start();
            resources.watcher = Some(watcher);
            signal
        };

        let session = self.clone();
        tokio::spawn(
            async move {
                // Errors when the watcher is stopped by an explicit stop
                if let Ok(signal) = signal.await {
                    info!("Meeting ended ({:?} via {})", signal.reason, signal.probe);
                    session.stop_with(signal.reason).await;
                }
            }
            .in_current_span(),
        );
    }

    /// Bound a required step by the join deadline, if any, and by abort
    async fn within<F: Future>(
        &self,
        deadline: Option<Instant>,
        step: &'static str,
        future: F,
    ) -> Result<F::Output, SessionError> {
        let bounded = async {
            match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, future)
                    .await
                    .map_err(|_| SessionError::JoinTimeout { step }),
                None => Ok(future.await),
            }
        };

        self.unless_stopped(bounded).await.unwrap_or(Err(SessionError::Aborted))
    }

    /// Run `future` unless the session stops first
    async fn unless_stopped<F: Future>(&self, future: F) -> Option<F::Output> {
        let mut status = self.inner.status.subscribe();
        tokio::select! {
            output = future => Some(output),
            _ = status.wait_for(|s| *s == RecordingStatus::Stopped) => None,
        }
    }

    // ------------------------------------------------------------------
    // Finalize
    // ------------------------------------------------------------------

    /// Release what a join acquired without producing a result
    async fn release(&self) {
        let mut resources = self.inner.resources.lock().await;

        resources.stop_recording().await;
        self.inner.transcript.close();
        for task in resources.tasks.drain(..) {
            task.abort();
        }

        if let Some(page) = resources.page.take() {
            close_page(page).await;
        }
    }

    async fn stop_with(&self, reason: StopReason) -> Option<MeetingResult> {
        let fenced = self.inner.status.send_if_modified(|status| {
            if status.is_live() {
                *status = RecordingStatus::Stopped;
                true
            } else {
                false
            }
        });

        if !fenced {
            debug!(parent: &self.inner.span, "Stop ignored, session is {}", self.status());
            return None;
        }

        {
            let mut details = self.details();
            details.stop_reason = Some(reason);
            details.ended_at = Some(Utc::now());
        }

        let result = self
            .finalize(reason)
            .instrument(self.inner.span.clone())
            .await;

        Some(result)
    }

    async fn finalize(&self, reason: StopReason) -> MeetingResult {
        info!("Stopping session ({:?})", reason);

        let mut resources = self.inner.resources.lock().await;

        let recording_degraded = resources.stop_recording().await;

        if let Some(mut watcher) = resources.watcher.take() {
            watcher.stop().await;
        }

        self.inner.transcript.close();
        for task in resources.tasks.drain(..) {
            task.abort();
        }

        let transcript = self.inner.transcript.snapshot().await;
        let transcript_text = to_text(&transcript);
        info!("Transcript captured: {} entries", transcript.len());

        let summary = self.summarize(&transcript_text).await;

        if let Some(page) = resources.page.take() {
            close_page(page).await;
        }

        drop(resources);

        let details = self.details().clone();
        let config = &self.inner.config;

        let result = MeetingResult {
            session_id: self.inner.id.clone(),
            title: details.title.unwrap_or_default(),
            meeting_url: config.meeting_url.clone(),
            recording_location: if config.record_meeting {
                details.output_path
            } else {
                None
            },
            recording_degraded,
            transcript,
            transcript_text,
            summary,
            stop_reason: reason,
            started_at: details.started_at,
            ended_at: details.ended_at.unwrap_or_else(Utc::now),
        };

        self.emit(&result);

        result
    }

    async fn summarize(&self, transcript_text: &str) -> Option<String> {
        let credential = self
            .inner
            .config
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())?;

        let Some(summarizer) = &self.inner.summarizer else {
            warn!("Summarization credential set but no summarizer configured");
            return None;
        };

        if transcript_text.is_empty() {
            info!("Transcript is empty, skipping summary");
            return None;
        }

        match summarizer
            .summarize(credential, self.inner.config.prompt(), transcript_text)
            .await
        {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!("Summary failed: {:#}", e);
                None
            }
        }
    }

    fn emit(&self, result: &MeetingResult) {
        let handlers = {
            let mut handlers = lock(&self.inner.end_handlers);
            self.inner.result.send_replace(Some(result.clone()));
            std::mem::take(&mut *handlers)
        };

        info!("Session ended, notifying {} handlers", handlers.len());

        for handler in handlers {
            handler(result);
        }
    }
}

async fn read_title(page: &Arc<dyn PageDriver>, locator: &str) -> anyhow::Result<String> {
    let element = page
        .wait_for(locator, WaitOptions::default())
        .await?
        .context("meeting title not found")?;
    Ok(page.text_content(&element).await?.trim().to_string())
}

async fn close_page(page: Arc<dyn PageDriver>) {
    if let Err(e) = page.close().await {
        warn!("Failed to close browser: {:#}", e);
    }
}

impl Resources {
    /// Stop capture, then drain the pipeline; true if the recording is degraded
    async fn stop_recording(&mut self) -> bool {
        // Stopping capture ends the media stream the pipeline drains
        if let Some(mut capture) = self.capture.take() {
            if capture.is_capturing() {
                if let Err(e) = capture.stop().await {
                    warn!("Failed to stop media capture: {:#}", e);
                }
            }
        }

        let Some(pipeline) = self.pipeline.take() else {
            return false;
        };

        match pipeline.stop().await.error {
            Some(e) => {
                error!("Recording may be incomplete: {}", e);
                true
            }
            None => false,
        }
    }
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Which capture source produced a transcript entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureSource {
    /// Live captions rendered by the meeting UI
    Captions,
    /// Browser speech recognition fallback
    SpeechRecognition,
}

/// The participant a transcript entry is attributed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Speaker {
    pub name: String,

    /// Avatar image URL, if the UI shows one
    pub profile_picture: Option<String>,
}

/// A single caption or speech fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub speaker: Speaker,

    pub text: String,

    /// When the fragment was produced
    pub timestamp: DateTime<Utc>,

    pub source: CaptureSource,
}

impl TranscriptEntry {
    pub fn new(speaker: impl Into<String>, text: impl Into<String>, source: CaptureSource) -> Self {
        Self {
            speaker: Speaker {
                name: speaker.into(),
                profile_picture: None,
            },
            text: text.into(),
            timestamp: Utc::now(),
            source,
        }
    }

    /// Parse a message sent by the page-side transcript scripts
    pub fn from_page_message(message: serde_json::Value) -> Result<Self> {
        let message: PageMessage =
            serde_json::from_value(message).context("Malformed transcript message")?;

        let timestamp = message
            .date
            .and_then(|ms| Utc.timestamp_millis_opt(ms as i64).single())
            .unwrap_or_else(Utc::now);

        let source = match message.source.as_deref() {
            Some("speech_recognition") => CaptureSource::SpeechRecognition,
            _ => CaptureSource::Captions,
        };

        Ok(Self {
            speaker: Speaker {
                name: message.speaker.name,
                profile_picture: message.speaker.profile_picture.filter(|p| !p.is_empty()),
            },
            text: message.text,
            timestamp,
            source,
        })
    }
}

#[derive(Debug, Deserialize)]
struct PageMessage {
    speaker: PageSpeaker,
    text: String,
    date: Option<f64>,
    source: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageSpeaker {
    name: String,
    profile_picture: Option<String>,
}

struct Shared {
    entries: Mutex<Vec<TranscriptEntry>>,
    accepting: AtomicBool,
    closed: AtomicBool,
}

impl Shared {
    fn admits(&self) -> bool {
        self.accepting.load(Ordering::SeqCst) && !self.closed.load(Ordering::SeqCst)
    }
}

/// Collects transcript fragments from every capture source in arrival order
///
/// Fragments from different sources are not deduplicated.
pub struct TranscriptAggregator {
    shared: Arc<Shared>,
}

impl TranscriptAggregator {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                entries: Mutex::new(Vec::new()),
                accepting: AtomicBool::new(true),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Push capability handed to capture sources
    pub fn sink(&self) -> TranscriptSink {
        TranscriptSink {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Copy of everything accumulated so far
    pub async fn snapshot(&self) -> Vec<TranscriptEntry> {
        self.shared.entries.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.shared.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Temporarily reject (false) or accept (true) new fragments
    pub fn set_accepting(&self, accepting: bool) {
        self.shared.accepting.store(accepting, Ordering::SeqCst);
    }

    /// Reject every further fragment
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
    }
}

impl Default for TranscriptAggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// Append-only handle to a [`TranscriptAggregator`]
#[derive(Clone)]
pub struct TranscriptSink {
    shared: Arc<Shared>,
}

impl TranscriptSink {
    /// Append an entry; returns false when the aggregator rejects it
    pub async fn push(&self, entry: TranscriptEntry) -> bool {
        let mut entries = self.shared.entries.lock().await;
        // Checked under the lock so nothing lands after a snapshot taken on close
        if !self.shared.admits() {
            return false;
        }
        entries.push(entry);
        true
    }
}

/// Flatten a transcript into one `Speaker: text` line per entry
pub fn to_text(entries: &[TranscriptEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("{}: {}", e.speaker.name, e.text))
        .collect::<Vec<_>>()
        .join("\n")
}

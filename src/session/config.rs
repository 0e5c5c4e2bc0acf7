use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::error::SessionError;
use crate::browser::Locators;
use crate::capture::{StreamConfig, StreamOverrides};
use crate::summary::DEFAULT_PROMPT;

/// Configuration for one meeting session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Display name the bot joins with
    pub name: String,

    /// Meeting address
    pub meeting_url: String,

    /// Caption language (informational, e.g. "en-US")
    #[serde(default = "default_language")]
    pub language: String,

    /// Summarization credential; no summary is produced without it
    #[serde(default)]
    pub api_key: Option<String>,

    /// Summarization prompt, defaults to the note-taker prompt
    #[serde(default)]
    pub prompt: Option<String>,

    /// Show the browser window
    #[serde(default)]
    pub debug: bool,

    /// Record audio/video to a file
    #[serde(default = "default_record_meeting")]
    pub record_meeting: bool,

    /// Directory recordings are written to
    #[serde(default = "default_recording_location")]
    pub recording_location: String,

    /// Overrides merged over the default stream options
    #[serde(default)]
    pub stream_config: StreamOverrides,

    /// Element locators for the meeting UI
    #[serde(default)]
    pub locators: Locators,

    /// Termination probe polling interval
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,

    /// Timeout for best-effort steps such as dismissing the mic prompt
    #[serde(default = "default_optional_step_timeout_ms")]
    pub optional_step_timeout_ms: u64,

    /// Deadline for the required join steps; unbounded when unset
    #[serde(default)]
    pub join_timeout_ms: Option<u64>,
}

fn default_language() -> String {
    "en-US".to_string()
}

fn default_record_meeting() -> bool {
    true
}

fn default_recording_location() -> String {
    "./".to_string()
}

fn default_probe_interval_ms() -> u64 {
    1000
}

fn default_optional_step_timeout_ms() -> u64 {
    2000
}

impl SessionConfig {
    pub fn new(name: impl Into<String>, meeting_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            meeting_url: meeting_url.into(),
            language: default_language(),
            api_key: None,
            prompt: None,
            debug: false,
            record_meeting: default_record_meeting(),
            recording_location: default_recording_location(),
            stream_config: StreamOverrides::default(),
            locators: Locators::default(),
            probe_interval_ms: default_probe_interval_ms(),
            optional_step_timeout_ms: default_optional_step_timeout_ms(),
            join_timeout_ms: None,
        }
    }

    pub fn prompt(&self) -> &str {
        self.prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(DEFAULT_PROMPT)
    }

    /// Stream options with the overrides applied
    pub fn stream(&self) -> StreamConfig {
        StreamConfig::default().merged(&self.stream_config)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn optional_step_timeout(&self) -> Duration {
        Duration::from_millis(self.optional_step_timeout_ms)
    }

    pub fn join_timeout(&self) -> Option<Duration> {
        self.join_timeout_ms.map(Duration::from_millis)
    }

    fn recording_dir(&self) -> &str {
        if self.recording_location.trim().is_empty() {
            "./"
        } else {
            &self.recording_location
        }
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        if self.name.trim().is_empty() {
            return Err(SessionError::Config("name must not be empty".to_string()));
        }
        if self.meeting_url.trim().is_empty() {
            return Err(SessionError::Config("meeting_url must not be empty".to_string()));
        }
        if self.probe_interval_ms == 0 {
            return Err(SessionError::Config(
                "probe_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Compute the recording path and, when recording, make sure its
    /// directory exists
    pub fn prepare_output(&self, created_at_ms: i64) -> Result<PathBuf, SessionError> {
        let dir = self.recording_dir();

        if self.record_meeting {
            let dir_path = Path::new(dir);
            std::fs::create_dir_all(dir_path).map_err(|e| {
                SessionError::Config(format!("cannot create recording directory {}: {}", dir, e))
            })?;
            if !dir_path.is_dir() {
                return Err(SessionError::Config(format!(
                    "recording location {} is not a directory",
                    dir
                )));
            }
        }

        Ok(recording_file_path(dir, created_at_ms))
    }
}

/// `<dir>/meeting-<millis>.mp4` with duplicate separators removed
pub fn recording_file_path(dir: &str, created_at_ms: i64) -> PathBuf {
    PathBuf::from(normalize_path(&format!("{}/meeting-{}.mp4", dir, created_at_ms)))
}

/// Collapse runs of `/` into one, except directly after a `:` (URL schemes)
pub fn normalize_path(path: &str) -> String {
    let mut normalized = String::with_capacity(path.len());
    let mut previous: Option<char> = None;
    let mut run_start: Option<char> = None;

    for c in path.chars() {
        if c == '/' && previous == Some('/') && run_start != Some(':') {
            continue;
        }
        if c == '/' && previous != Some('/') {
            run_start = previous;
        }
        normalized.push(c);
        previous = Some(c);
    }

    normalized
}

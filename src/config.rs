use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

use crate::browser::Locators;
use crate::session::SessionConfig;

/// Service configuration
///
/// Loaded from an optional TOML/YAML/JSON file and overridden by
/// `MEET_RECORDER__<SECTION>__<KEY>` environment variables. Every section has
/// defaults so the service runs without a config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub browser: BrowserConfig,
    pub recording: RecordingConfig,
    pub summary: SummaryConfig,
    pub locators: Locators,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "meet-recorder".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// chromedriver endpoint
    pub webdriver_url: String,
    /// Chrome binary, when not the driver's default
    pub chrome_binary: Option<String>,
    /// X display the browser renders to, captured for the recording
    pub display: String,
    /// PulseAudio source carrying the browser's audio output
    pub audio_source: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            chrome_binary: None,
            display: ":99".to_string(),
            audio_source: "default".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Default directory for recordings
    pub output_dir: String,
    pub ffmpeg_path: String,
    pub probe_interval_ms: u64,
    pub optional_step_timeout_ms: u64,
    pub join_timeout_ms: Option<u64>,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            output_dir: "./".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
            probe_interval_ms: 1000,
            optional_step_timeout_ms: 2000,
            join_timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    /// Generative Language API base URL
    pub endpoint: String,
    pub model: String,
    /// Prompt used when a session does not set one
    pub prompt: Option<String>,
    pub timeout_secs: u64,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-1.5-flash".to_string(),
            prompt: None,
            timeout_secs: 60,
        }
    }
}

impl SummaryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("MEET_RECORDER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Session config for a meeting with the service defaults applied
    pub fn session(&self, name: impl Into<String>, meeting_url: impl Into<String>) -> SessionConfig {
        let mut session = SessionConfig::new(name, meeting_url);
        session.recording_location = self.recording.output_dir.clone();
        session.prompt = self.summary.prompt.clone();
        session.locators = self.locators.clone();
        session.probe_interval_ms = self.recording.probe_interval_ms;
        session.optional_step_timeout_ms = self.recording.optional_step_timeout_ms;
        session.join_timeout_ms = self.recording.join_timeout_ms;
        session
    }
}

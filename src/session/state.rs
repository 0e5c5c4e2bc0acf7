use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Lifecycle status of a meeting session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingStatus {
    NotStarted,
    Started,
    Paused,
    Stopped,
}

impl RecordingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Started => "started",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
        }
    }

    /// Whether the session is joined and not yet finalized
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Started | Self::Paused)
    }
}

impl fmt::Display for RecordingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session was stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Explicit stop request
    Requested,
    /// Only the bot is left in the meeting
    AloneInMeeting,
    /// The bot was removed or the meeting was ended for everyone
    Kicked,
}

/// Session fields other than the lifecycle status
#[derive(Debug, Clone, Default)]
pub(crate) struct SessionDetails {
    pub title: Option<String>,
    pub output_path: Option<PathBuf>,
    pub stop_reason: Option<StopReason>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub failure: Option<String>,
}

/// Point-in-time view of a session, for status queries
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub status: RecordingStatus,
    pub meeting_url: String,
    pub title: Option<String>,
    pub output_path: Option<PathBuf>,
    pub transcript_entries: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub stop_reason: Option<StopReason>,
    /// Join failure, if the session never started
    pub error: Option<String>,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::state::StopReason;
use super::transcript::TranscriptEntry;

/// Terminal artifact of a meeting session, produced exactly once
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingResult {
    /// Session identifier
    pub session_id: String,

    /// Meeting title as shown by the meeting UI (empty if it could not be read)
    pub title: String,

    /// Address of the meeting that was attended
    pub meeting_url: String,

    /// Recording file; `None` when recording was disabled
    pub recording_location: Option<PathBuf>,

    /// Whether the recording sink reported a failure
    pub recording_degraded: bool,

    /// Entries in arrival order
    pub transcript: Vec<TranscriptEntry>,

    /// Flattened `Speaker: text` transcript
    pub transcript_text: String,

    /// Summary, when a summarization credential was configured
    pub summary: Option<String>,

    pub stop_reason: StopReason,

    pub started_at: Option<DateTime<Utc>>,

    pub ended_at: DateTime<Utc>,
}

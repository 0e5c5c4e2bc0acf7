//! Meeting session management
//!
//! A `MeetingSession` drives one bot attendance end to end:
//! - Joining the meeting through a page driver
//! - Recording the meeting's audio/video to a file
//! - Collecting the live transcript from captions and speech recognition
//! - Detecting the end of the meeting and finalizing exactly once
//! - Summarizing the transcript when a credential is configured

mod config;
mod error;
mod result;
mod session;
mod state;
mod transcript;

pub use config::{normalize_path, recording_file_path, SessionConfig};
pub use error::SessionError;
pub use result::MeetingResult;
pub use session::{Collaborators, MeetingSession};
pub use state::{RecordingStatus, SessionSnapshot, StopReason};
pub use transcript::{
    to_text, CaptureSource, Speaker, TranscriptAggregator, TranscriptEntry, TranscriptSink,
};

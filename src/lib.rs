pub mod browser;
pub mod capture;
pub mod collaborators;
pub mod config;
pub mod http;
pub mod recording;
pub mod session;
pub mod summary;
pub mod watcher;

pub use browser::{BrowserLauncher, ElementRef, Key, LaunchOptions, Locators, PageDriver, WaitOptions};
pub use capture::{MediaCapture, StreamConfig, StreamOverrides};
pub use collaborators::{CollaboratorFactory, SystemCollaborators};
pub use config::Config;
pub use http::{create_router, AppState};
pub use recording::{EncoderFactory, EncoderSink, RecordingError, RecordingPipeline};
pub use session::{
    Collaborators, MeetingResult, MeetingSession, RecordingStatus, SessionConfig, SessionError,
    SessionSnapshot, StopReason, TranscriptEntry,
};
pub use summary::Summarizer;
pub use watcher::{TerminationProbe, TerminationWatcher};

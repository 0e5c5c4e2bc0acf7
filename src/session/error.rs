use thiserror::Error;

use super::state::RecordingStatus;
use crate::recording::RecordingError;

/// Errors that end a session before it produces a result
#[derive(Debug, Error)]
pub enum SessionError {
    /// Invalid session configuration or unwritable output directory
    #[error("invalid session config: {0}")]
    Config(String),

    /// A required join step did not complete before the join deadline
    #[error("timed out waiting for {step}")]
    JoinTimeout { step: &'static str },

    /// The page driver failed during a required join step
    #[error("join failed at {step}: {source}")]
    JoinProtocol {
        step: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// Recording could not be started
    #[error("recording could not start: {0}")]
    Recording(#[from] RecordingError),

    /// The session was aborted before the meeting was joined
    #[error("session aborted before joining")]
    Aborted,

    /// `start` was called on a session that already joined or is joining
    #[error("session cannot start while {0}")]
    InvalidState(RecordingStatus),
}

impl SessionError {
    pub(crate) fn join(step: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| Self::JoinProtocol { step, source }
    }
}

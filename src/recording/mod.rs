//! Recording pipeline
//!
//! Forwards the captured media byte stream into an encoder sink process that
//! writes the meeting recording to disk.

pub mod ffmpeg;
mod pipeline;

use std::path::Path;
use thiserror::Error;

pub use ffmpeg::{FfmpegSink, FfmpegSinkFactory};
pub use pipeline::{PipelineReport, RecordingPipeline};

/// Failures of the capture → encoder path
#[derive(Debug, Error)]
pub enum RecordingError {
    /// Media capture could not be started
    #[error("media capture failed: {0}")]
    Capture(String),

    /// The encoder process could not be spawned
    #[error("failed to spawn encoder: {0}")]
    Spawn(#[source] std::io::Error),

    /// Writing into the encoder's input failed
    #[error("failed to write to encoder: {0}")]
    Write(#[source] std::io::Error),

    /// Waiting for the encoder to finish failed
    #[error("failed to wait for encoder: {0}")]
    Wait(#[source] std::io::Error),

    /// The encoder exited unsuccessfully
    #[error("encoder exited with status {0:?}")]
    EncoderExit(Option<i32>),

    /// The forwarding task died before reporting
    #[error("forwarding task failed: {0}")]
    Forwarder(String),
}

/// Sink consuming the media byte stream and producing a file
#[async_trait::async_trait]
pub trait EncoderSink: Send {
    /// Append a chunk to the encoder input
    async fn write(&mut self, chunk: &[u8]) -> Result<(), RecordingError>;

    /// Signal end of input and wait until the output file is complete
    async fn finish(&mut self) -> Result<(), RecordingError>;
}

/// Spawns encoder sinks for output files
#[async_trait::async_trait]
pub trait EncoderFactory: Send + Sync {
    async fn spawn(&self, output: &Path) -> Result<Box<dyn EncoderSink>, RecordingError>;
}

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, Command};
use tracing::{info, warn};

use super::{EncoderFactory, EncoderSink, RecordingError};

/// Spawns `ffmpeg -y -i - -c:v copy -c:a copy <output>` sinks
#[derive(Debug, Clone)]
pub struct FfmpegSinkFactory {
    ffmpeg: String,
}

impl FfmpegSinkFactory {
    pub fn new(ffmpeg: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }

    fn args(output: &Path) -> Vec<String> {
        vec![
            "-y".into(),
            "-loglevel".into(),
            "error".into(),
            "-i".into(),
            "-".into(),
            "-c:v".into(),
            "copy".into(),
            "-c:a".into(),
            "copy".into(),
            output.display().to_string(),
        ]
    }
}

impl Default for FfmpegSinkFactory {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait::async_trait]
impl EncoderFactory for FfmpegSinkFactory {
    async fn spawn(&self, output: &Path) -> Result<Box<dyn EncoderSink>, RecordingError> {
        let mut child = Command::new(&self.ffmpeg)
            .args(Self::args(output))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(RecordingError::Spawn)?;

        let stdin = child
            .stdin
            .take()
            .map(|stdin| Box::new(stdin) as Box<dyn AsyncWrite + Send + Unpin>);

        info!("Encoder started for {}", output.display());

        Ok(Box::new(FfmpegSink {
            output: output.to_path_buf(),
            child,
            stdin,
        }))
    }
}

/// A running ffmpeg remux process
pub struct FfmpegSink {
    output: PathBuf,
    child: Child,
    stdin: Option<Box<dyn AsyncWrite + Send + Unpin>>,
}

#[async_trait::async_trait]
impl EncoderSink for FfmpegSink {
    async fn write(&mut self, chunk: &[u8]) -> Result<(), RecordingError> {
        let stdin = self.stdin.as_mut().ok_or_else(|| {
            RecordingError::Write(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "encoder input already closed",
            ))
        })?;

        stdin.write_all(chunk).await.map_err(RecordingError::Write)
    }

    async fn finish(&mut self) -> Result<(), RecordingError> {
        // Dropping stdin is the end-of-stream signal
        let flushed = match self.stdin.take() {
            Some(mut stdin) => stdin.flush().await.map_err(RecordingError::Write),
            None => Ok(()),
        };
        if let Err(e) = &flushed {
            warn!("Failed to flush encoder input: {}", e);
        }

        // The encoder is awaited even when the flush failed
        let status = self.child.wait().await.map_err(RecordingError::Wait)?;
        flushed?;

        if !status.success() {
            return Err(RecordingError::EncoderExit(status.code()));
        }

        info!("Recording saved to {}", self.output.display());

        Ok(())
    }
}

// ffmpeg capture backend
//
// Grabs the X display the browser renders into, plus the PulseAudio source
// carrying the meeting audio, and streams Matroska bytes from ffmpeg's stdout.

use anyhow::{bail, Context, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::{MediaCapture, StreamConfig};

const READ_BUFFER_BYTES: usize = 64 * 1024;
const QUIT_GRACE: Duration = Duration::from_secs(5);

pub struct FfmpegCapture {
    ffmpeg: String,
    display: String,
    audio_source: String,
    child: Option<Child>,
    reader: Option<JoinHandle<()>>,
}

impl FfmpegCapture {
    pub fn new(ffmpeg: impl Into<String>, display: impl Into<String>, audio_source: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            display: display.into(),
            audio_source: audio_source.into(),
            child: None,
            reader: None,
        }
    }

    /// Build the ffmpeg argument list for the given stream caps
    fn args(&self, options: &StreamConfig) -> Result<Vec<String>> {
        if !options.audio && !options.video {
            bail!("Stream config disables both audio and video");
        }

        let mut args: Vec<String> = vec!["-hide_banner".into(), "-loglevel".into(), "error".into()];

        if options.video {
            args.extend([
                "-f".into(),
                "x11grab".into(),
                "-framerate".into(),
                options.max_frame_rate.to_string(),
                "-video_size".into(),
                format!("{}x{}", options.max_width, options.max_height),
                "-i".into(),
                self.display.clone(),
            ]);
        }

        if options.audio {
            args.extend([
                "-f".into(),
                "pulse".into(),
                "-i".into(),
                self.audio_source.clone(),
            ]);
        }

        if options.video {
            args.extend([
                "-c:v".into(),
                "libx264".into(),
                "-preset".into(),
                "veryfast".into(),
                "-b:v".into(),
                options.video_bits_per_second.to_string(),
            ]);
        }

        if options.audio {
            args.extend([
                "-c:a".into(),
                "aac".into(),
                "-b:a".into(),
                options.audio_bits_per_second.to_string(),
            ]);
        }

        args.extend(["-f".into(), "matroska".into(), "pipe:1".into()]);

        Ok(args)
    }
}

#[async_trait::async_trait]
impl MediaCapture for FfmpegCapture {
    async fn start(&mut self, options: &StreamConfig) -> Result<mpsc::Receiver<Vec<u8>>> {
        if self.child.is_some() {
            bail!("Already capturing");
        }

        let args = self.args(options)?;

        info!(
            "Starting ffmpeg capture ({}x{} @ {}fps, audio={}, video={})",
            options.max_width, options.max_height, options.max_frame_rate, options.audio, options.video
        );

        let mut child = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.ffmpeg))?;

        let mut stdout = child
            .stdout
            .take()
            .context("ffmpeg capture has no stdout")?;

        let (tx, rx) = mpsc::channel(256);

        let reader = tokio::spawn(async move {
            let mut buffer = vec![0u8; READ_BUFFER_BYTES];
            loop {
                match stdout.read(&mut buffer).await {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(buffer[..n].to_vec()).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Capture stream read failed: {}", e);
                        break;
                    }
                }
            }
            info!("Capture stream closed");
        });

        self.child = Some(child);
        self.reader = Some(reader);

        info!("ffmpeg capture started");

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        info!("Stopping ffmpeg capture");

        // 'q' on stdin makes ffmpeg close the container cleanly
        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(b"q").await {
                warn!("Failed to ask ffmpeg capture to quit: {}", e);
            }
        }

        match tokio::time::timeout(QUIT_GRACE, child.wait()).await {
            Ok(Ok(status)) => info!("ffmpeg capture exited with {}", status),
            Ok(Err(e)) => warn!("Failed to wait for ffmpeg capture: {}", e),
            Err(_) => {
                warn!("ffmpeg capture did not quit within {}s, killing", QUIT_GRACE.as_secs());
                child.kill().await.context("Failed to kill ffmpeg capture")?;
            }
        }

        if let Some(reader) = self.reader.take() {
            if let Err(e) = reader.await {
                warn!("Capture reader task panicked: {}", e);
            }
        }

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.child.is_some()
    }

    fn name(&self) -> &str {
        "ffmpeg x11grab/pulse"
    }
}

pub mod ffmpeg;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub use ffmpeg::FfmpegCapture;

/// Media capture options for the active page session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Capture the meeting audio
    pub audio: bool,
    /// Capture the meeting video
    pub video: bool,
    /// Target audio bitrate in bits per second
    pub audio_bits_per_second: u32,
    /// Target video bitrate in bits per second
    pub video_bits_per_second: u32,
    /// Maximum frame width in pixels
    pub max_width: u32,
    /// Maximum frame height in pixels
    pub max_height: u32,
    /// Maximum frames per second
    pub max_frame_rate: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
            audio_bits_per_second: 128_000,  // 128kbps
            video_bits_per_second: 2_500_000, // 2.5Mbps
            max_width: 1280,
            max_height: 720,
            max_frame_rate: 15,
        }
    }
}

/// Caller-supplied stream options; every field present overrides the default
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamOverrides {
    pub audio: Option<bool>,
    pub video: Option<bool>,
    pub audio_bits_per_second: Option<u32>,
    pub video_bits_per_second: Option<u32>,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    pub max_frame_rate: Option<u32>,
}

impl StreamConfig {
    /// Merge overrides field by field over this configuration
    pub fn merged(&self, overrides: &StreamOverrides) -> Self {
        Self {
            audio: overrides.audio.unwrap_or(self.audio),
            video: overrides.video.unwrap_or(self.video),
            audio_bits_per_second: overrides
                .audio_bits_per_second
                .unwrap_or(self.audio_bits_per_second),
            video_bits_per_second: overrides
                .video_bits_per_second
                .unwrap_or(self.video_bits_per_second),
            max_width: overrides.max_width.unwrap_or(self.max_width),
            max_height: overrides.max_height.unwrap_or(self.max_height),
            max_frame_rate: overrides.max_frame_rate.unwrap_or(self.max_frame_rate),
        }
    }
}

/// Media capture backend trait
///
/// Implementations:
/// - ffmpeg: grabs the browser's X display and PulseAudio source
/// - tests: in-memory byte feeds
#[async_trait::async_trait]
pub trait MediaCapture: Send + Sync {
    /// Start capturing the active page session
    ///
    /// Returns a channel receiver that yields encoded media chunks until
    /// capture stops.
    async fn start(&mut self, options: &StreamConfig) -> Result<mpsc::Receiver<Vec<u8>>>;

    /// Stop capturing
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

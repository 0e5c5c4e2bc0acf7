//! Wiring of concrete collaborators from the service configuration

use std::sync::Arc;

use crate::browser::{BrowserLauncher, WebDriverLauncher};
use crate::capture::FfmpegCapture;
use crate::config::Config;
use crate::recording::{EncoderFactory, FfmpegSinkFactory};
use crate::session::Collaborators;
use crate::summary::{GeminiSummarizer, Summarizer};

/// Builds a fresh set of collaborators for each new session
pub trait CollaboratorFactory: Send + Sync {
    fn create(&self) -> Collaborators;
}

/// chromedriver + ffmpeg + Gemini
pub struct SystemCollaborators {
    launcher: Arc<dyn BrowserLauncher>,
    encoder: Arc<dyn EncoderFactory>,
    summarizer: Arc<dyn Summarizer>,
    ffmpeg: String,
    display: String,
    audio_source: String,
}

impl SystemCollaborators {
    pub fn new(config: &Config) -> Self {
        Self {
            launcher: Arc::new(WebDriverLauncher::new(
                config.browser.webdriver_url.clone(),
                config.browser.chrome_binary.clone(),
            )),
            encoder: Arc::new(FfmpegSinkFactory::new(config.recording.ffmpeg_path.clone())),
            summarizer: Arc::new(GeminiSummarizer::new(
                config.summary.endpoint.clone(),
                config.summary.model.clone(),
                config.summary.timeout(),
            )),
            ffmpeg: config.recording.ffmpeg_path.clone(),
            display: config.browser.display.clone(),
            audio_source: config.browser.audio_source.clone(),
        }
    }
}

impl CollaboratorFactory for SystemCollaborators {
    fn create(&self) -> Collaborators {
        Collaborators {
            launcher: self.launcher.clone(),
            capture: Box::new(FfmpegCapture::new(
                self.ffmpeg.clone(),
                self.display.clone(),
                self.audio_source.clone(),
            )),
            encoder: self.encoder.clone(),
            summarizer: Some(self.summarizer.clone()),
        }
    }
}

//! Meeting summarization
//!
//! Summaries are optional: a session without a credential never calls the
//! summarizer, and a failing summarizer only drops the summary.

pub mod gemini;

use anyhow::Result;

pub use gemini::GeminiSummarizer;

/// Prompt used when the session does not supply one
pub const DEFAULT_PROMPT: &str = "You are an Assistant Note Taker, based on the meeting results in the form of the transcript below, please make a summary of the meeting\n";

/// Produces a natural-language summary of a transcript
#[async_trait::async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, credential: &str, prompt: &str, transcript: &str) -> Result<String>;
}

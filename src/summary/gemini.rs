use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::info;

use super::Summarizer;

/// Summarizes transcripts with the Gemini `generateContent` API
pub struct GeminiSummarizer {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl GeminiSummarizer {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

fn extract_summary(response: GenerateResponse) -> Option<String> {
    let text: String = response
        .candidates
        .into_iter()
        .next()?
        .content
        .parts
        .into_iter()
        .map(|p| p.text)
        .collect();

    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

#[async_trait::async_trait]
impl Summarizer for GeminiSummarizer {
    async fn summarize(&self, credential: &str, prompt: &str, transcript: &str) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.endpoint, self.model);

        info!("Requesting meeting summary from {}", self.model);

        let body = json!({
            "contents": [{
                "parts": [{ "text": format!("{}{}", prompt, transcript) }]
            }]
        });

        let response = self
            .client
            .post(&url)
            .query(&[("key", credential)])
            .json(&body)
            .send()
            .await
            .context("Summary request failed")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            bail!("Summary request returned {}: {}", status, detail);
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .context("Failed to parse summary response")?;

        extract_summary(parsed).context("Summary response contained no text")
    }
}

//! Audio transcription seam. The production implementation posts to
//! whatever transcription service `TRANSCRIPTION_API_KEY` authenticates
//! against; [`MockTranscriber`] lets the enrichment orchestrator be tested
//! without one.

use std::time::Duration;

use async_trait::async_trait;
use outreach_common::{OutreachError, Result};

const TRANSCRIPTION_TIMEOUT: Duration = Duration::from_secs(120);

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio_url: &str) -> Result<String>;
}

pub struct HttpTranscriber {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl HttpTranscriber {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(TRANSCRIPTION_TIMEOUT)
                .build()
                .expect("failed to build transcription HTTP client"),
            api_key: api_key.into(),
            endpoint: "https://api.openai.com/v1/audio/transcriptions".to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(serde::Serialize)]
struct TranscribeRequest<'a> {
    url: &'a str,
}

#[derive(serde::Deserialize)]
struct TranscribeResponse {
    text: String,
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, audio_url: &str) -> Result<String> {
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&TranscribeRequest { url: audio_url })
            .send()
            .await
            .map_err(|e| OutreachError::TransientExternal(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let retryable = status.is_server_error() || status.as_u16() == 429;
            let text = resp.text().await.unwrap_or_default();
            return Err(if retryable {
                OutreachError::TransientExternal(text)
            } else {
                OutreachError::PermanentExternal(text)
            });
        }

        let body: TranscribeResponse = resp
            .json()
            .await
            .map_err(|e| OutreachError::TransientExternal(e.to_string()))?;
        Ok(body.text)
    }
}

pub struct MockTranscriber {
    pub fixed_text: String,
}

impl MockTranscriber {
    pub fn new(fixed_text: impl Into<String>) -> Self {
        Self {
            fixed_text: fixed_text.into(),
        }
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, _audio_url: &str) -> Result<String> {
        Ok(self.fixed_text.clone())
    }
}

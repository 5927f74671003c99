//! Provider-agnostic LLM call surface. [`LlmClient`] is the seam the
//! pipeline programs against; [`OpenAiClient`] is the only production
//! implementation, but the trait exists so the vetting agent, discovery
//! fetcher, and enrichment orchestrator can all be driven by
//! [`crate::mock::MockLlmClient`] in tests without a network.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::error::AiError;
use crate::schema::StructuredOutput;

const LLM_TIMEOUT: Duration = Duration::from_secs(90);

/// Object-safe LLM call surface — the seam the pipeline programs against so
/// it can hold `Arc<dyn LlmClient>` rather than being generic over a
/// provider. Structured extraction is schema-in/value-out here; the typed
/// [`extract`] free function on top does the `T::json_schema_strict()` /
/// deserialize dance so callers never see raw JSON.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Plain chat completion; returns the assistant's text.
    async fn complete(&self, system: &str, user: &str) -> Result<String, AiError>;

    /// Schema-bound structured extraction, keyed by the target type's schema
    /// and name. Use [`extract`] instead of calling this directly.
    async fn extract_value(
        &self,
        system: &str,
        user: &str,
        schema: serde_json::Value,
        type_name: &str,
    ) -> Result<serde_json::Value, AiError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AiError>;
}

/// Typed structured extraction over any [`LlmClient`] trait object.
pub async fn extract<T: StructuredOutput>(
    client: &(impl LlmClient + ?Sized),
    system: &str,
    user: &str,
) -> Result<T, AiError> {
    let value = client
        .extract_value(system, user, T::json_schema_strict(), &T::type_name())
        .await?;
    serde_json::from_value(value).map_err(|e| AiError::Deserialize(e.to_string()))
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct StructuredRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
    json_schema: JsonSchemaFormat,
}

#[derive(Serialize)]
struct JsonSchemaFormat {
    name: &'static str,
    strict: bool,
    schema: serde_json::Value,
}

#[derive(serde::Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(serde::Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(serde::Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(serde::Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(serde::Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    embedding_model: String,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(LLM_TIMEOUT)
                .build()
                .expect("failed to build OpenAI HTTP client"),
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: model.into(),
            embedding_model: "text-embedding-3-small".to_string(),
        }
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn temperature_for(&self) -> Option<f32> {
        if self.model.starts_with("gpt-5") {
            None
        } else {
            Some(0.0)
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, AiError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                WireMessage { role: "system", content: system },
                WireMessage { role: "user", content: user },
            ],
            temperature: self.temperature_for(),
        };

        debug!(model = %self.model, "openai chat completion request");

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let body: ChatResponse = resp.json().await?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(AiError::EmptyResponse)
    }

    async fn extract_value(
        &self,
        system: &str,
        user: &str,
        schema: serde_json::Value,
        type_name: &str,
    ) -> Result<serde_json::Value, AiError> {
        debug!(model = %self.model, type_name, "openai structured extraction request");

        let request = StructuredRequest {
            model: &self.model,
            messages: vec![
                WireMessage { role: "system", content: system },
                WireMessage { role: "user", content: user },
            ],
            temperature: self.temperature_for(),
            response_format: ResponseFormat {
                format_type: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: "structured_response",
                    strict: true,
                    schema,
                },
            },
        };

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let body: ChatResponse = resp.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(AiError::EmptyResponse)?;

        serde_json::from_str(&content).map_err(|e| AiError::Deserialize(e.to_string()))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AiError> {
        let request = EmbeddingRequest {
            model: &self.embedding_model,
            input: text,
        };

        let resp = self
            .http
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let body: EmbeddingResponse = resp.json().await?;
        body.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or(AiError::EmptyResponse)
    }
}

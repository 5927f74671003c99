//! Deterministic in-memory [`LlmClient`] for exercising the vetting agent,
//! discovery fetcher, and enrichment orchestrator without a network call.
//! Responses are seeded per structured-output type name (or queued as plain
//! completions) so a test controls exactly what the "model" says next.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::client::LlmClient;
use crate::error::AiError;
use crate::schema::StructuredOutput;

#[derive(Default)]
pub struct MockLlmClient {
    completions: Mutex<VecDeque<String>>,
    structured: Mutex<HashMap<String, VecDeque<serde_json::Value>>>,
    embeddings: Mutex<VecDeque<Vec<f32>>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_completion(&self, text: impl Into<String>) {
        self.completions.lock().unwrap().push_back(text.into());
    }

    pub fn queue_structured<T: StructuredOutput>(&self, value: serde_json::Value) {
        self.structured
            .lock()
            .unwrap()
            .entry(T::type_name())
            .or_default()
            .push_back(value);
    }

    pub fn queue_embedding(&self, vector: Vec<f32>) {
        self.embeddings.lock().unwrap().push_back(vector);
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String, AiError> {
        self.completions
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(AiError::EmptyResponse)
    }

    async fn extract_value(
        &self,
        _system: &str,
        _user: &str,
        _schema: serde_json::Value,
        type_name: &str,
    ) -> Result<serde_json::Value, AiError> {
        self.structured
            .lock()
            .unwrap()
            .get_mut(type_name)
            .and_then(|q| q.pop_front())
            .ok_or(AiError::EmptyResponse)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AiError> {
        if let Some(v) = self.embeddings.lock().unwrap().pop_front() {
            return Ok(v);
        }
        // deterministic fallback: a stable low-dimensional hash of the text
        // so callers that only care about relative similarity still work.
        let mut vec = vec![0.0f32; 8];
        for (i, byte) in text.bytes().enumerate() {
            vec[i % 8] += byte as f32;
        }
        Ok(vec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::Deserialize;

    #[derive(Deserialize, JsonSchema)]
    struct Verdict {
        score: u32,
    }

    #[tokio::test]
    async fn returns_queued_structured_response() {
        let mock = MockLlmClient::new();
        mock.queue_structured::<Verdict>(serde_json::json!({ "score": 42 }));
        let result: Verdict = crate::client::extract(&mock, "sys", "user").await.unwrap();
        assert_eq!(result.score, 42);
    }

    #[tokio::test]
    async fn empty_queue_is_an_error() {
        let mock = MockLlmClient::new();
        let result: Result<Verdict, _> = crate::client::extract(&mock, "sys", "user").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn completions_are_fifo() {
        let mock = MockLlmClient::new();
        mock.queue_completion("first");
        mock.queue_completion("second");
        assert_eq!(mock.complete("s", "u").await.unwrap(), "first");
        assert_eq!(mock.complete("s", "u").await.unwrap(), "second");
    }
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AiError {
    #[error("LLM request failed: {0}")]
    Request(String),

    #[error("LLM returned no content")]
    EmptyResponse,

    #[error("failed to deserialize structured output: {0}")]
    Deserialize(String),

    #[error("LLM rate limited: {0}")]
    RateLimit(String),
}

impl AiError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AiError::RateLimit(_) | AiError::Request(_))
    }
}

impl From<reqwest::Error> for AiError {
    fn from(e: reqwest::Error) -> Self {
        if e.status().map(|s| s.as_u16()) == Some(429) {
            AiError::RateLimit(e.to_string())
        } else {
            AiError::Request(e.to_string())
        }
    }
}

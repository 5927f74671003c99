//! Failure taxonomy for source adapters. Adapters never block the pipeline:
//! callers treat [`AdapterError::NotFound`] (and any empty page) as "no
//! result" and continue; only [`AdapterError::Transient`] and
//! [`AdapterError::RateLimit`] are worth a caller-side retry loop.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("adapter auth error: {0}")]
    Auth(String),

    #[error("adapter rate limited: {0}")]
    RateLimit(String),

    #[error("not found")]
    NotFound,

    #[error("transient adapter error: {0}")]
    Transient(String),

    #[error("permanent adapter error: {0}")]
    Permanent(String),
}

impl AdapterError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AdapterError::Transient(_) | AdapterError::RateLimit(_))
    }

    /// Base backoff delay before the next retry attempt. Rate-limit classes
    /// use a larger base delay than plain transient failures.
    pub fn base_backoff(&self) -> std::time::Duration {
        match self {
            AdapterError::RateLimit(_) => std::time::Duration::from_secs(15),
            _ => std::time::Duration::from_secs(2),
        }
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            AdapterError::Transient(e.to_string())
        } else if let Some(status) = e.status() {
            if status.as_u16() == 401 || status.as_u16() == 403 {
                AdapterError::Auth(e.to_string())
            } else if status.as_u16() == 429 {
                AdapterError::RateLimit(e.to_string())
            } else if status.is_server_error() {
                AdapterError::Transient(e.to_string())
            } else if status.as_u16() == 404 {
                AdapterError::NotFound
            } else {
                AdapterError::Permanent(e.to_string())
            }
        } else {
            AdapterError::Transient(e.to_string())
        }
    }
}

/// Exponential backoff with jitter, capped at a handful of attempts. Returns
/// `Ok(value)` from the first successful call, or the last error once
/// attempts are exhausted or the error isn't retryable.
pub async fn retry_with_backoff<T, F, Fut>(
    max_attempts: u32,
    mut call: F,
) -> Result<T, AdapterError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, AdapterError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match call().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let base = e.base_backoff();
                let jitter_ms = rand::random::<u64>() % 500;
                let delay = base + std::time::Duration::from_millis(jitter_ms);
                tracing::warn!(attempt, error = %e, delay_ms = delay.as_millis() as u64, "adapter call failed, retrying");
                tokio::time::sleep(delay * attempt).await;
            }
            Err(e) => return Err(e),
        }
    }
}

use thiserror::Error;

/// The pipeline's error taxonomy, orthogonal to component.
///
/// The core never raises these to an HTTP layer directly (that surface is out of
/// scope here); background paths record the outcome on the owning row and emit an
/// event instead of propagating. This type exists so every layer agrees on the same
/// small set of kinds.
#[derive(Error, Debug)]
pub enum OutreachError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("transient external error: {0}")]
    TransientExternal(String),

    #[error("permanent external error: {0}")]
    PermanentExternal(String),

    #[error("logic error: {0}")]
    Logic(String),

    #[error("quota exceeded")]
    QuotaExceeded,

    #[error("data missing: {0}")]
    DataMissing(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl OutreachError {
    /// True for errors that are safe to retry with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, OutreachError::TransientExternal(_))
    }

    /// True for errors that represent a normal business outcome, not a fault.
    pub fn is_quota(&self) -> bool {
        matches!(self, OutreachError::QuotaExceeded)
    }
}

impl From<sqlx::Error> for OutreachError {
    fn from(e: sqlx::Error) -> Self {
        OutreachError::Database(e.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for OutreachError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        OutreachError::Database(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OutreachError>;

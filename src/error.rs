//! Engine-wide error kind shared by every tier and component.

use thiserror::Error;

/// Semantic error kind produced by any tier, provider, or store operation.
///
/// Tier and provider failures are always mapped into one of these kinds before
/// they cross a component boundary; nothing downstream inspects library-specific
/// error types directly.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found")]
    NotFound,

    #[error("capability disabled")]
    Disabled,

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("permanent failure: {0}")]
    Permanent(String),

    #[error("failed to parse payload: {0}")]
    ParseError(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation timed out")]
    Timeout,
}

impl EngineError {
    /// Only `Transient` errors are eligible for retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Transient(_))
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        EngineError::Transient(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        EngineError::Permanent(msg.into())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::ParseError(e.to_string())
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            EngineError::Timeout
        } else if e.is_connect() || e.is_request() {
            EngineError::Transient(e.to_string())
        } else {
            EngineError::Permanent(e.to_string())
        }
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => EngineError::NotFound,
            sqlx::Error::Database(ref dbe) if dbe.is_unique_violation() => {
                EngineError::Conflict(dbe.message().to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => EngineError::Transient(e.to_string()),
            other => EngineError::Permanent(other.to_string()),
        }
    }
}

impl From<object_store::Error> for EngineError {
    fn from(e: object_store::Error) -> Self {
        match e {
            object_store::Error::NotFound { .. } => EngineError::NotFound,
            _ => EngineError::Transient(e.to_string()),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

//! Cache error types
//!
//! Errors stay inside the crate: drivers convert them into the best-effort
//! signals of the public surface (`bool`, [`ReadOutcome`](crate::cache::ReadOutcome),
//! empty info maps) after logging them. Configuration errors are
//! reported separately as [`ConfigurationError`](crate::config::ConfigurationError).

use thiserror::Error;

/// Errors that can occur during cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backend facility is missing or switched off
    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),

    /// Failed to build a client or open a connection to the backend
    #[error("Cache connection error: {0}")]
    ConnectionError(String),

    /// Backend rejected the supplied credential
    #[error("Cache authentication error: {0}")]
    AuthenticationError(String),

    /// Backend refused to switch to the configured database
    #[error("Cache database selection error: {0}")]
    DatabaseSelectError(String),

    /// A client option could not be applied
    #[error("Cache client option '{name}' rejected: {reason}")]
    OptionError { name: String, reason: String },

    /// Failed to serialize or deserialize a cache value
    #[error("Cache serialization error: {0}")]
    SerializationError(String),

    /// Generic backend error
    #[error("Cache backend error: {0}")]
    BackendError(String),

    /// Operation attempted before a successful `connect()`
    #[error("Cache not connected")]
    NotConnected,
}

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        CacheError::BackendError(e.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::SerializationError(e.to_string())
    }
}

impl From<std::io::Error> for CacheError {
    fn from(e: std::io::Error) -> Self {
        CacheError::BackendError(e.to_string())
    }
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

//! Error types for Synapse core.

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error type.
///
/// The semantic store propagates these to its callers. The policy gate
/// never returns them: every failure there becomes a deny decision.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration or missing credentials.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Embedding provider rejected the input or returned garbage.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Persistence layer failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Encode/decode failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Outbound network request failed.
    #[error("Network error: {0}")]
    Network(String),

    /// Caller supplied invalid input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// HTTP API failure.
    #[error("API error: {0}")]
    Api(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Storage(format!("Blocking task failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_category() {
        let err = Error::Embedding("quota exceeded".to_string());
        assert_eq!(err.to_string(), "Embedding error: quota exceeded");
    }

    #[test]
    fn test_serde_json_error_converts() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}

//! Error types for the query engine
//!
//! One structured error enum covers the whole pipeline. Cache I/O failures
//! are deliberately absent from the query path: the cache layer logs them
//! and degrades to miss/skip instead of failing the request.

use thiserror::Error;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum Error {
    /// Unknown space, dimension or measure; surfaced to callers as a
    /// 404-equivalent
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed query (empty measures, bad pivot index, broken coordinate)
    #[error("invalid query: {0}")]
    Validation(String),

    /// Combinatorial product or aggregation key-count guard tripped.
    /// Deterministic for a given query, so never retried automatically.
    #[error("size limit exceeded: {0}")]
    LimitExceeded(String),

    /// Corrupt or undecodable cache payload; callers treat this as a miss
    #[error("cache error: {0}")]
    Cache(String),

    /// Serialization failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a not-found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Error::NotFound(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    /// Create a size-limit error
    pub fn limit(message: impl Into<String>) -> Self {
        Error::LimitExceeded(message.into())
    }

    /// Create a cache payload error
    pub fn cache(message: impl Into<String>) -> Self {
        Error::Cache(message.into())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::not_found("space 'sales'");
        assert!(format!("{}", err).contains("sales"));

        let err = Error::limit("drill product 2000000 exceeds maximum 1000000");
        assert!(format!("{}", err).starts_with("size limit exceeded"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}

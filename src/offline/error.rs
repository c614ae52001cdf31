use thiserror::Error;

/// A cache region operation failed. Never fatal: callers log it and carry on.
#[derive(Debug, Error)]
pub enum CacheOperationError {
    #[error("Cache storage error: {0}")]
    Storage(String),

    #[error("Cache entry could not be encoded: {0}")]
    Encoding(String),
}

impl From<rusqlite::Error> for CacheOperationError {
    fn from(err: rusqlite::Error) -> Self {
        CacheOperationError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for CacheOperationError {
    fn from(err: serde_json::Error) -> Self {
        CacheOperationError::Encoding(err.to_string())
    }
}

/// The network could not produce a response for a request
#[derive(Debug, Clone, Error, PartialEq)]
pub enum NetworkFetchError {
    #[error("Invalid request URL: {0}")]
    InvalidUrl(String),

    #[error("Network request failed: {0}")]
    Unreachable(String),

    #[error("Failed to read response body: {0}")]
    Body(String),
}

impl From<reqwest::Error> for NetworkFetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_body() || err.is_decode() {
            NetworkFetchError::Body(err.to_string())
        } else {
            NetworkFetchError::Unreachable(err.to_string())
        }
    }
}

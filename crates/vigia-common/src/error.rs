//! Error types for vigia

use thiserror::Error;

/// Result type alias for vigia operations
pub type Result<T> = std::result::Result<T, VigiaError>;

/// Main error type for vigia
#[derive(Error, Debug)]
pub enum VigiaError {
    /// Missing or malformed configuration. Fatal to the operation that
    /// needed it.
    #[error("configuration error: {0}")]
    Config(String),

    /// Bad caller input (inverted date range, future end date, unknown
    /// item or region).
    #[error("validation error: {0}")]
    Validation(String),

    /// Network or HTTP failure, including rate-limit exhaustion.
    #[error("transport error: {0}")]
    Transport(String),

    /// A source payload did not match the expected shape.
    #[error("parse error: {0}")]
    Parse(String),

    /// Cache snapshot missing or ambiguous.
    #[error("not found: {0}")]
    NotFound(String),

    /// Cache snapshot exists but is unreadable.
    #[error("corrupt data: {0}")]
    CorruptData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<reqwest::Error> for VigiaError {
    fn from(err: reqwest::Error) -> Self {
        VigiaError::Transport(err.to_string())
    }
}

impl From<csv::Error> for VigiaError {
    fn from(err: csv::Error) -> Self {
        VigiaError::Parse(err.to_string())
    }
}

impl From<chrono::ParseError> for VigiaError {
    fn from(err: chrono::ParseError) -> Self {
        VigiaError::Parse(err.to_string())
    }
}

//! Error types for chatrelay

use thiserror::Error;

use crate::upstream::UpstreamError;

/// Main error type for chatrelay operations
#[derive(Error, Debug)]
pub enum ChatRelayError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Upstream completion API errors
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// Relay server errors (bind, serve)
    #[error("Relay error: {0}")]
    Relay(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for chatrelay operations
pub type Result<T> = std::result::Result<T, ChatRelayError>;

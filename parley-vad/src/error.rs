//! Error types for VAD operations

use thiserror::Error;

/// Result type for VAD operations
pub type Result<T> = std::result::Result<T, VadError>;

/// VAD error types
#[derive(Error, Debug)]
pub enum VadError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Processing error
    #[error("Processing error: {0}")]
    Processing(String),
}

impl VadError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }
}

//! Error types for wake-word detection

use thiserror::Error;

pub type Result<T> = std::result::Result<T, WakeError>;

#[derive(Error, Debug)]
pub enum WakeError {
    #[error("Wake engine error: {0}")]
    Engine(String),

    #[error("Wake engine initialization failed: {0}")]
    Initialization(String),

    #[error("Audio conversion failed: {0}")]
    Audio(#[from] parley_audio::AudioError),
}

impl WakeError {
    pub fn engine<S: Into<String>>(msg: S) -> Self {
        Self::Engine(msg.into())
    }

    pub fn initialization<S: Into<String>>(msg: S) -> Self {
        Self::Initialization(msg.into())
    }
}

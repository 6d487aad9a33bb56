//! Error types for the voice channel engine

use thiserror::Error;

use crate::transport::SpeakerId;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Failure of a hosted recognition, NLU or synthesis request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The recognizer heard nothing it could transcribe
    #[error("No speech detected")]
    NoSpeech,

    #[error("{service} request failed: {message}")]
    Request { service: String, message: String },
}

impl BackendError {
    pub fn request<S: Into<String>, M: Into<String>>(service: S, message: M) -> Self {
        Self::Request {
            service: service.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    /// No speech was captured before the endpoint deadline
    #[error("No speech captured")]
    EmptyUtterance,

    /// A speaker's wake word cut the current playback short
    #[error("Playback interrupted by {by}")]
    Interrupted { by: SpeakerId },

    /// The speaker's input queue was closed
    #[error("Speaker input closed")]
    InputClosed,

    #[error("Pipeline for {0} is closed")]
    PipelineClosed(SpeakerId),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Audio error: {0}")]
    Audio(#[from] parley_audio::AudioError),

    #[error("VAD error: {0}")]
    Vad(#[from] parley_vad::VadError),

    #[error("Wake word error: {0}")]
    Wake(#[from] parley_wake::WakeError),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Skill {skill} failed: {message}")]
    Skill { skill: String, message: String },

    #[error("Task failed: {0}")]
    Task(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl EngineError {
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Self::Transport(msg.into())
    }

    pub fn skill<S: Into<String>, M: Into<String>>(skill: S, message: M) -> Self {
        Self::Skill {
            skill: skill.into(),
            message: message.into(),
        }
    }

    pub fn task<S: Into<String>>(msg: S) -> Self {
        Self::Task(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Outcomes that end a speech act as part of normal conversation flow
    pub fn is_control_flow(&self) -> bool {
        matches!(self, Self::EmptyUtterance | Self::Interrupted { .. })
    }
}

impl From<tokio::task::JoinError> for EngineError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_flow_classification() {
        assert!(EngineError::EmptyUtterance.is_control_flow());
        assert!(EngineError::Interrupted {
            by: SpeakerId::from("alice")
        }
        .is_control_flow());

        assert!(!EngineError::InputClosed.is_control_flow());
        assert!(!EngineError::from(BackendError::request("nlu", "timeout")).is_control_flow());
    }

    #[test]
    fn test_display() {
        let err = EngineError::Interrupted {
            by: SpeakerId::from("bob"),
        };
        assert_eq!(err.to_string(), "Playback interrupted by bob");

        let err = BackendError::request("recognizer", "connection reset");
        assert_eq!(err.to_string(), "recognizer request failed: connection reset");
    }
}

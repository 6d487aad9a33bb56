//! Hosted service interfaces
//!
//! Recognition, understanding, synthesis and skill execution are all opaque
//! request/response collaborators. The engine never retries them.

use async_trait::async_trait;
use parley_audio::AudioBuffer;
use std::collections::HashMap;
use std::sync::Arc;

use crate::conversation::Conversation;
use crate::error::{BackendError, Result};
use crate::transport::SpeakerId;

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Speech to text
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Transcribe an utterance
    ///
    /// Returns [`BackendError::NoSpeech`] when nothing intelligible was heard,
    /// which callers treat the same as an empty capture.
    async fn recognize(&self, audio: &AudioBuffer, language: &str) -> BackendResult<String>;
}

/// Text to speech
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, language: &str) -> BackendResult<AudioBuffer>;
}

/// What an NLU query carries
#[derive(Debug, Clone)]
pub enum NluInput {
    Text(String),
    Audio(AudioBuffer),
    Event {
        name: String,
        params: HashMap<String, String>,
    },
}

/// One NLU request. `contexts` replaces the session's contexts outright.
#[derive(Debug, Clone)]
pub struct NluQuery {
    pub session_id: String,
    pub input: NluInput,
    pub contexts: Vec<String>,
    pub language: String,
}

/// Structured NLU result
#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    /// Response or prompt text
    pub text: String,
    pub parameters: HashMap<String, String>,
    /// Raw action name, decoded with [`crate::intent::Action::decode`]
    pub action: String,
    pub all_required_present: bool,
    pub output_contexts: Vec<String>,
    /// What the NLU understood the user to have said
    pub query_text: String,
}

impl Default for Intent {
    fn default() -> Self {
        Self {
            text: String::new(),
            parameters: HashMap::new(),
            action: String::new(),
            all_required_present: true,
            output_contexts: Vec::new(),
            query_text: String::new(),
        }
    }
}

impl Intent {
    pub fn with_action<S: Into<String>>(action: S) -> Self {
        Self {
            action: action.into(),
            ..Default::default()
        }
    }

    pub fn text<S: Into<String>>(mut self, text: S) -> Self {
        self.text = text.into();
        self
    }

    pub fn param<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn missing_parameters(mut self) -> Self {
        self.all_required_present = false;
        self
    }
}

/// Natural-language understanding
#[async_trait]
pub trait IntentDetector: Send + Sync {
    async fn detect(&self, query: &NluQuery) -> BackendResult<Intent>;
}

/// Skill execution
///
/// A skill drives the rest of the turn through the [`Conversation`] handle
/// and may return state for the host to persist.
#[async_trait]
pub trait SkillRunner: Send + Sync {
    async fn run(
        &self,
        skill: &str,
        conversation: &mut Conversation<'_>,
        speaker: &SpeakerId,
        params: &HashMap<String, String>,
    ) -> Result<Option<serde_json::Value>>;
}

/// The hosted services a channel talks to
#[derive(Clone)]
pub struct Backends {
    pub recognizer: Arc<dyn Recognizer>,
    pub nlu: Arc<dyn IntentDetector>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub skills: Arc<dyn SkillRunner>,
}

//! Per-turn conversation handle
//!
//! A [`Conversation`] borrows one speaker's input queue and state for the
//! duration of a turn. The turn driver uses it, and so does any skill the turn
//! is handed to.

use parley_audio::AudioBuffer;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::backend::{Intent, NluInput, NluQuery};
use crate::capture::{capture_utterance, EndpointSettings};
use crate::error::{BackendError, EngineError, Result};
use crate::intent::Action;
use crate::playback::{PlaybackEngine, PlaybackOutcome};
use crate::services::ChannelServices;
use crate::task::ScopedTask;
use crate::transport::SpeakerId;

/// NLU contexts carried from one query to the next within a turn
///
/// Each NLU response replaces it outright.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnContext {
    pub contexts: Vec<String>,
}

/// State a speaker pipeline keeps between turns
#[derive(Debug, Clone)]
pub struct SpeakerState {
    pub id: SpeakerId,
    pub language: String,
    pub context: TurnContext,
}

impl SpeakerState {
    pub fn new<S: Into<String>>(id: SpeakerId, language: S) -> Self {
        Self {
            id,
            language: language.into(),
            context: TurnContext::default(),
        }
    }
}

pub struct Conversation<'a> {
    services: &'a ChannelServices,
    speaker: &'a mut SpeakerState,
    input: &'a mut mpsc::UnboundedReceiver<AudioBuffer>,
}

impl<'a> Conversation<'a> {
    pub fn new(
        services: &'a ChannelServices,
        speaker: &'a mut SpeakerState,
        input: &'a mut mpsc::UnboundedReceiver<AudioBuffer>,
    ) -> Self {
        Self {
            services,
            speaker,
            input,
        }
    }

    pub fn services(&self) -> &'a ChannelServices {
        self.services
    }

    pub fn speaker(&self) -> &SpeakerId {
        &self.speaker.id
    }

    pub fn language(&self) -> &str {
        &self.speaker.language
    }

    pub fn set_language<S: Into<String>>(&mut self, language: S) {
        let language = language.into();
        info!("{} language set to {}", self.speaker.id, language);
        self.speaker.language = language;
    }

    pub fn context(&self) -> &TurnContext {
        &self.speaker.context
    }

    /// Replace the contexts sent with the next NLU query
    pub fn set_contexts(&mut self, contexts: Vec<String>) {
        self.speaker.context = TurnContext { contexts };
    }

    /// Speak `text`, interruptible by any tracked speaker
    pub async fn speak(&mut self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Ok(());
        }
        self.services.say(text, &self.speaker.language).await?;
        Ok(())
    }

    /// Play audio to completion
    pub async fn play(&mut self, audio: AudioBuffer) -> Result<PlaybackOutcome> {
        self.services.playback.play(audio).await
    }

    /// Play audio, interruptible by any tracked speaker
    pub async fn play_interruptible(&mut self, audio: AudioBuffer) -> Result<PlaybackOutcome> {
        self.services
            .interrupts
            .play_interruptible(&self.services.playback, audio)
            .await
    }

    /// Play a stream of buffers as one interruptible playback
    pub async fn play_stream(
        &mut self,
        stream: mpsc::Receiver<AudioBuffer>,
    ) -> Result<PlaybackOutcome> {
        let handle = self.services.playback.start_stream(stream);
        self.services.interrupts.race(handle).await
    }

    /// Play the wake acknowledgment cue when enabled
    pub async fn acknowledge(&mut self) -> Result<()> {
        if !self.services.config.conversation.acknowledge_wake {
            return Ok(());
        }
        if let Some(cue) = self.services.assets.acknowledgment.clone() {
            self.services.playback.play(cue).await?;
        }
        Ok(())
    }

    /// Capture one utterance
    ///
    /// `timeout` replaces the initial silence allowance. The ambient cue loops
    /// for as long as the capture runs.
    pub async fn listen_audio(&mut self, timeout: Option<Duration>) -> Result<AudioBuffer> {
        let mut settings = EndpointSettings::from(&self.services.config.endpoint);
        if let Some(timeout) = timeout {
            settings = settings.with_base_timeout(timeout);
        }

        let mut vad = self.services.new_vad()?;
        let ambient = self.start_ambient();

        let result = capture_utterance(
            &mut *self.input,
            vad.as_mut(),
            self.services.config.channel.inbound,
            &settings,
        )
        .await;

        if let Some(ambient) = ambient {
            ambient.stop().await;
        }
        result
    }

    fn start_ambient(&self) -> Option<ScopedTask> {
        let cue = self.services.assets.ambient.clone()?;
        if cue.is_empty() {
            return None;
        }
        let playback = self.services.playback.clone();
        Some(ScopedTask::spawn("ambient", move |token| async move {
            loop_cue(playback, cue, token).await
        }))
    }

    /// Transcribe an utterance in the speaker's language
    ///
    /// No speech and blank transcripts both yield [`EngineError::EmptyUtterance`].
    pub async fn recognize(&mut self, audio: &AudioBuffer) -> Result<String> {
        let transcript = match self
            .services
            .backends
            .recognizer
            .recognize(audio, &self.speaker.language)
            .await
        {
            Ok(text) => text,
            Err(BackendError::NoSpeech) => return Err(EngineError::EmptyUtterance),
            Err(e) => return Err(e.into()),
        };

        let transcript = transcript.trim();
        if transcript.is_empty() {
            return Err(EngineError::EmptyUtterance);
        }
        info!("{} said {:?}", self.speaker.id, transcript);
        Ok(transcript.to_string())
    }

    /// Capture and transcribe, re-prompting on silence
    pub async fn listen(
        &mut self,
        timeout: Option<Duration>,
        tries: Option<usize>,
    ) -> Result<String> {
        let services = self.services;
        let conversation = &services.config.conversation;
        let tries = tries.unwrap_or(conversation.listen_tries).max(1);
        let timeout = timeout.unwrap_or_else(|| conversation.listen_timeout());

        for attempt in 1..=tries {
            let heard = match self.listen_audio(Some(timeout)).await {
                Ok(audio) => self.recognize(&audio).await,
                Err(e) => Err(e),
            };

            match heard {
                Err(EngineError::EmptyUtterance) if attempt < tries => {
                    debug!("Nothing heard from {} (attempt {})", self.speaker.id, attempt);
                    self.speak(&services.config.phrases.silence_reprompt).await?;
                }
                other => return other,
            }
        }
        Err(EngineError::EmptyUtterance)
    }

    /// Speak a question and listen for the answer
    pub async fn ask(
        &mut self,
        question: &str,
        timeout: Option<Duration>,
        tries: Option<usize>,
    ) -> Result<String> {
        self.speak(question).await?;
        self.listen(timeout, tries).await
    }

    /// Query the NLU with the current contexts, then adopt its output contexts
    pub async fn detect(&mut self, input: NluInput) -> Result<Intent> {
        let query = NluQuery {
            session_id: self.speaker.id.to_string(),
            input,
            contexts: self.speaker.context.contexts.clone(),
            language: self.speaker.language.clone(),
        };

        let intent = self.services.backends.nlu.detect(&query).await?;
        debug!(
            "NLU for {}: action={:?} complete={} contexts={:?}",
            self.speaker.id, intent.action, intent.all_required_present, intent.output_contexts
        );

        self.speaker.context = TurnContext {
            contexts: intent.output_contexts.clone(),
        };
        Ok(intent)
    }

    /// Speak a question and send the spoken answer straight to the NLU
    ///
    /// A `repeat` answer replays the question without using up a try. A
    /// `fallback` answer has its text spoken and uses up a try; when the tries
    /// run out the last fallback intent is returned as is.
    pub async fn ask_and_detect_intent(
        &mut self,
        question: &str,
        timeout: Option<Duration>,
        tries: Option<usize>,
    ) -> Result<Intent> {
        let services = self.services;
        let conversation = &services.config.conversation;
        let mut remaining = tries.unwrap_or(conversation.intent_tries).max(1);
        let timeout = timeout.unwrap_or_else(|| conversation.listen_timeout());
        let reprompt = &services.config.phrases.silence_reprompt;

        self.speak(question).await?;
        loop {
            let audio = match self.listen_audio(Some(timeout)).await {
                Ok(audio) => audio,
                Err(EngineError::EmptyUtterance) => {
                    remaining -= 1;
                    if remaining == 0 {
                        return Err(EngineError::EmptyUtterance);
                    }
                    self.speak(reprompt).await?;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let intent = self.detect(NluInput::Audio(audio)).await?;
            match Action::decode(&intent.action) {
                Action::Repeat => {
                    debug!("{} asked for a repeat", self.speaker.id);
                    self.speak(question).await?;
                }
                Action::Fallback => {
                    remaining -= 1;
                    if remaining == 0 {
                        return Ok(intent);
                    }
                    self.speak(&intent.text).await?;
                }
                Action::None if intent.query_text.trim().is_empty() => {
                    remaining -= 1;
                    if remaining == 0 {
                        return Err(EngineError::EmptyUtterance);
                    }
                    self.speak(reprompt).await?;
                }
                _ => return Ok(intent),
            }
        }
    }

    /// Ask a yes/no question
    pub async fn ask_yes_no(&mut self, question: &str) -> Result<bool> {
        self.set_contexts(vec!["yes-no".to_string()]);
        let intent = self.ask_and_detect_intent(question, None, None).await?;
        Ok(Action::decode(&intent.action) == Action::Yes)
    }
}

/// Loop a cue until cancelled
async fn loop_cue(
    playback: PlaybackEngine,
    cue: AudioBuffer,
    token: tokio_util::sync::CancellationToken,
) {
    let mut handle = playback.start_loop(cue);
    tokio::select! {
        _ = token.cancelled() => {
            handle.cancel();
            match handle.join().await {
                Ok(outcome) => debug!("Ambient cue stopped after {} frames", outcome.frames()),
                Err(e) => warn!("Ambient cue failed to stop cleanly: {}", e),
            }
        }
        result = handle.join() => {
            if let Err(e) = result {
                warn!("Ambient cue stopped: {}", e);
            }
        }
    }
}

//! Conversation turn driver
//!
//! One turn moves through explicit states:
//!
//! ```text
//! Listening ─> Captured ─┬─> Dispatch ─> done
//!     ▲                  │
//!     └── follow-up ── AwaitingParameters ─> done (bound reached)
//! ```
//!
//! The number of follow-up captures is bounded by
//! `conversation.max_followups`.

use parley_audio::AudioBuffer;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::backend::{Intent, NluInput};
use crate::conversation::Conversation;
use crate::error::{EngineError, Result};
use crate::intent::{render, Action};

/// How a turn ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The intent was acted on
    Dispatched(Action),
    /// Required parameters were still missing after the last follow-up
    Unresolved,
}

enum TurnState {
    Listening { followups: usize },
    Captured { audio: AudioBuffer, followups: usize },
    AwaitingParameters { prompt: String, followups: usize },
    Dispatch { intent: Intent, transcript: String },
}

/// Run one turn for the woken speaker
///
/// An empty capture is answered with the apology phrase and reported as
/// [`EngineError::EmptyUtterance`].
pub async fn run_turn(conversation: &mut Conversation<'_>) -> Result<TurnOutcome> {
    conversation.acknowledge().await?;

    match drive(conversation).await {
        Err(EngineError::EmptyUtterance) => {
            let apology = &conversation.services().config.phrases.empty_utterance;
            conversation.speak(apology).await?;
            Err(EngineError::EmptyUtterance)
        }
        other => other,
    }
}

async fn drive(conversation: &mut Conversation<'_>) -> Result<TurnOutcome> {
    let max_followups = conversation.services().config.conversation.max_followups;
    let mut state = TurnState::Listening { followups: 0 };

    loop {
        state = match state {
            TurnState::Listening { followups } => TurnState::Captured {
                audio: conversation.listen_audio(None).await?,
                followups,
            },
            TurnState::Captured { audio, followups } => {
                let transcript = conversation.recognize(&audio).await?;
                let intent = conversation
                    .detect(NluInput::Text(transcript.clone()))
                    .await?;

                if !intent.all_required_present && !intent.text.trim().is_empty() {
                    TurnState::AwaitingParameters {
                        prompt: intent.text,
                        followups,
                    }
                } else {
                    TurnState::Dispatch { intent, transcript }
                }
            }
            TurnState::AwaitingParameters { prompt, followups } => {
                conversation.speak(&prompt).await?;
                if followups >= max_followups {
                    info!(
                        "{} still missing parameters after {} follow-ups",
                        conversation.speaker(),
                        followups
                    );
                    return Ok(TurnOutcome::Unresolved);
                }
                debug!("Follow-up {} for {}", followups + 1, conversation.speaker());
                TurnState::Listening {
                    followups: followups + 1,
                }
            }
            TurnState::Dispatch { intent, transcript } => {
                let action = dispatch(conversation, intent, &transcript).await?;
                return Ok(TurnOutcome::Dispatched(action));
            }
        };
    }
}

/// Act on a complete intent
pub async fn dispatch(
    conversation: &mut Conversation<'_>,
    intent: Intent,
    transcript: &str,
) -> Result<Action> {
    let services = conversation.services();
    let action = Action::decode(&intent.action);
    info!("{} -> {}", conversation.speaker(), action);

    let query = if intent.query_text.trim().is_empty() {
        transcript
    } else {
        intent.query_text.as_str()
    };

    match &action {
        Action::Format => {
            let text = render(&intent.text, &intent.parameters, query);
            conversation.speak(&text).await?;
        }
        Action::Skill(skill) => {
            run_skill(conversation, skill, &intent.parameters).await?;
        }
        Action::SetLanguage => {
            match intent.parameters.get("lang").map(|lang| lang.trim()) {
                Some(lang) if !lang.is_empty() => conversation.set_language(lang),
                _ => warn!("set-language without a lang parameter"),
            }
            conversation.speak(&intent.text).await?;
        }
        Action::Fallback => {
            let mut params = HashMap::new();
            params.insert("initial".to_string(), query.to_string());
            let skill = &services.config.conversation.fallback_skill;
            run_skill(conversation, skill, &params).await?;
        }
        Action::None | Action::Repeat | Action::Yes => {
            conversation.speak(&intent.text).await?;
        }
        Action::Other(name) => {
            warn!("Unknown action {:?}", name);
            let notice = services.config.phrases.unknown_action.replace("{action}", name);
            conversation.speak(&notice).await?;
        }
    }

    Ok(action)
}

async fn run_skill(
    conversation: &mut Conversation<'_>,
    skill: &str,
    params: &HashMap<String, String>,
) -> Result<()> {
    let speaker = conversation.speaker().clone();
    let skills = conversation.services().backends.skills.clone();

    info!("Running skill {} for {}", skill, speaker);
    match skills.run(skill, conversation, &speaker, params).await? {
        Some(state) => info!("Skill {} returned state to persist: {}", skill, state),
        None => debug!("Skill {} finished", skill),
    }
    Ok(())
}

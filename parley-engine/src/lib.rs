//! Parley Engine
//!
//! Real-time voice interaction for a multi-speaker voice channel. The engine
//! splits the channel's inbound audio per speaker, listens for a wake word on
//! each, captures the woken speaker's utterance, hands it to hosted
//! recognition and NLU services, and speaks the response back into the channel
//! at real-time pace. Any speaker's wake word interrupts system speech.
//!
//! ## Architecture
//!
//! ```text
//! transport events
//!   │
//!   └─> VoiceChannel (demultiplexer, owns pipelines)
//!         │
//!         ├─> barge-in taps ────────────────────────┐
//!         │                                         │
//!         └─> SpeakerPipeline (one per speaker)      │
//!               │                                   │
//!               ├─> WakeDetector                      │
//!               ├─> AttentionLock (one turn at a time)│
//!               └─> turn: capture ─> recognize ─> NLU ─> dispatch
//!                                                    │
//!                                                    ▼
//!                     InterruptCoordinator ── races ── PlaybackEngine ─> transport
//! ```
//!
//! Hosts provide the [`VoiceTransport`] and the hosted services in
//! [`Backends`], then drive a [`VoiceChannel`] with the transport's events.

pub mod attention;
pub mod backend;
pub mod capture;
pub mod channel;
pub mod config;
pub mod conversation;
pub mod error;
pub mod intent;
pub mod interrupt;
pub mod pipeline;
pub mod playback;
pub mod services;
pub mod task;
pub mod transport;
pub mod turn;

pub use attention::{AttentionGuard, AttentionLock};
pub use backend::{
    Backends, Intent, IntentDetector, NluInput, NluQuery, Recognizer, SkillRunner, Synthesizer,
};
pub use capture::{capture_utterance, EndpointSettings, UtteranceSession};
pub use channel::VoiceChannel;
pub use config::EngineConfig;
pub use conversation::{Conversation, SpeakerState, TurnContext};
pub use error::{BackendError, EngineError, Result};
pub use intent::Action;
pub use interrupt::InterruptCoordinator;
pub use pipeline::SpeakerPipeline;
pub use playback::{PlaybackEngine, PlaybackHandle, PlaybackOutcome};
pub use services::{Assets, ChannelServices, Detectors};
pub use transport::{InboundFrame, SpeakerId, TransportEvent, VoiceTransport};
pub use turn::{run_turn, TurnOutcome};

pub use parley_audio::{AudioBuffer, AudioFormat};

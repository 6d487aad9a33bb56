//! Per-speaker pipeline: wake word → attention → turn
//!
//! Each speaker gets one background task that listens for the wake word on its
//! own queue, waits for the channel's attention, runs a turn with a fresh
//! context, and goes back to listening whatever the turn's outcome.

use parley_audio::AudioBuffer;
use parley_wake::{WakeDetector, WakeMatch};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::conversation::{Conversation, SpeakerState, TurnContext};
use crate::error::{EngineError, Result};
use crate::services::ChannelServices;
use crate::transport::SpeakerId;
use crate::turn::run_turn;

pub struct SpeakerPipeline {
    speaker: SpeakerId,
    queue: mpsc::UnboundedSender<AudioBuffer>,
    task: JoinHandle<()>,
}

impl SpeakerPipeline {
    /// Start the wake-word loop for `speaker`
    pub fn spawn(speaker: SpeakerId, services: Arc<ChannelServices>) -> Result<Self> {
        let detector = services.new_wake_detector()?;
        let (queue, input) = mpsc::unbounded_channel();
        let state = SpeakerState::new(
            speaker.clone(),
            services.config.conversation.default_language.clone(),
        );

        let task = tokio::spawn(run_speaker(state, services, input, detector));
        info!("Started pipeline for {}", speaker);

        Ok(Self {
            speaker,
            queue,
            task,
        })
    }

    pub fn speaker(&self) -> &SpeakerId {
        &self.speaker
    }

    /// Queue one inbound frame
    pub fn push(&self, frame: AudioBuffer) -> Result<()> {
        self.queue
            .send(frame)
            .map_err(|_| EngineError::PipelineClosed(self.speaker.clone()))
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the loop and wait for it to exit
    pub async fn shutdown(self) {
        self.task.abort();
        match self.task.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {}
            Err(e) => error!("Pipeline for {} panicked: {}", self.speaker, e),
        }
        info!("Stopped pipeline for {}", self.speaker);
    }
}

async fn wait_for_wake(
    input: &mut mpsc::UnboundedReceiver<AudioBuffer>,
    detector: &mut WakeDetector,
) -> Result<WakeMatch> {
    while let Some(frame) = input.recv().await {
        if let Some(found) = detector.feed(&frame)? {
            return Ok(found);
        }
    }
    Err(EngineError::InputClosed)
}

async fn run_speaker(
    mut state: SpeakerState,
    services: Arc<ChannelServices>,
    mut input: mpsc::UnboundedReceiver<AudioBuffer>,
    mut detector: WakeDetector,
) {
    loop {
        match wait_for_wake(&mut input, &mut detector).await {
            Ok(found) => info!("{} woke the channel ({:?})", state.id, found.keyword),
            Err(EngineError::InputClosed) => break,
            Err(e) => {
                error!("Wake detection failed for {}: {}", state.id, e);
                detector.reset();
                continue;
            }
        }

        let attention = services.attention.acquire(&state.id).await;
        state.context = TurnContext::default();

        let result = {
            let mut conversation = Conversation::new(&services, &mut state, &mut input);
            run_turn(&mut conversation).await
        };
        drop(attention);
        detector.reset();

        match result {
            Ok(outcome) => info!("Turn for {} finished: {:?}", state.id, outcome),
            Err(e) if e.is_control_flow() => info!("Turn for {} ended: {}", state.id, e),
            Err(EngineError::InputClosed) => break,
            Err(e) => error!("Turn for {} failed: {}", state.id, e),
        }
    }
    debug!("Pipeline loop for {} exited", state.id);
}

//! Voice channel controller and frame demultiplexer
//!
//! The channel owns every speaker pipeline. It routes each labeled inbound
//! frame to its speaker's queue (creating the pipeline on first sight), copies
//! it into any open barge-in taps, and handles join and leave notifications.
//! Errors while routing are logged and never end the loop.

use parley_audio::AudioBuffer;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::backend::{Backends, NluInput, NluQuery};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::pipeline::SpeakerPipeline;
use crate::services::{Assets, ChannelServices, Detectors};
use crate::transport::{InboundFrame, SpeakerId, TransportEvent, VoiceTransport};

pub struct VoiceChannel {
    services: Arc<ChannelServices>,
    pipelines: HashMap<SpeakerId, SpeakerPipeline>,
    /// Greeting and welcome playbacks
    tasks: JoinSet<()>,
}

impl VoiceChannel {
    /// Build a channel, loading the configured audio cues
    pub fn new(
        config: EngineConfig,
        transport: Arc<dyn VoiceTransport>,
        backends: Backends,
        detectors: Detectors,
    ) -> Result<Self> {
        let assets = Assets::load(&config.assets)?;
        Self::with_assets(config, transport, backends, detectors, assets)
    }

    /// Build a channel with already loaded cues
    pub fn with_assets(
        config: EngineConfig,
        transport: Arc<dyn VoiceTransport>,
        backends: Backends,
        detectors: Detectors,
        assets: Assets,
    ) -> Result<Self> {
        let services = ChannelServices::new(config, transport, backends, detectors, assets)?;
        Ok(Self {
            services: Arc::new(services),
            pipelines: HashMap::new(),
            tasks: JoinSet::new(),
        })
    }

    pub fn services(&self) -> Arc<ChannelServices> {
        Arc::clone(&self.services)
    }

    /// Speakers with a live pipeline
    pub fn speakers(&self) -> Vec<SpeakerId> {
        let mut speakers: Vec<SpeakerId> = self.pipelines.keys().cloned().collect();
        speakers.sort();
        speakers
    }

    /// Process transport events until the stream ends, then tear down
    pub async fn run(mut self, mut events: mpsc::Receiver<TransportEvent>) {
        info!("Voice channel started");
        self.greet();

        while let Some(event) = events.recv().await {
            self.handle(event).await;
            self.reap();
        }

        info!("Transport stream ended, shutting down channel");
        self.shutdown().await;
    }

    /// Handle one transport event
    pub async fn handle(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Frame(frame) => {
                let speaker = frame.speaker.clone();
                if let Err(e) = self.route(frame) {
                    error!("Failed to route frame from {}: {}", speaker, e);
                }
            }
            TransportEvent::Joined { speaker, name } => self.join(speaker, name),
            TransportEvent::Left(speaker) => self.leave(&speaker).await,
        }
    }

    fn route(&mut self, frame: InboundFrame) -> Result<()> {
        let inbound = self.services.config.channel.inbound;
        let audio = AudioBuffer::from_bytes(inbound, frame.pcm)?;

        self.ensure_pipeline(&frame.speaker)?;
        self.services.interrupts.dispatch(&frame.speaker, &audio);

        let pushed = match self.pipelines.get(&frame.speaker) {
            Some(pipeline) => pipeline.push(audio),
            None => Ok(()),
        };
        if pushed.is_err() {
            // Recreated on the next frame
            self.pipelines.remove(&frame.speaker);
            self.services.interrupts.untrack(&frame.speaker);
        }
        pushed
    }

    fn ensure_pipeline(&mut self, speaker: &SpeakerId) -> Result<()> {
        if let Some(pipeline) = self.pipelines.get(speaker) {
            if !pipeline.is_finished() {
                return Ok(());
            }
            warn!("Pipeline for {} exited, restarting", speaker);
            self.pipelines.remove(speaker);
        }

        let pipeline = SpeakerPipeline::spawn(speaker.clone(), Arc::clone(&self.services))?;
        self.services.interrupts.track(speaker);
        self.pipelines.insert(speaker.clone(), pipeline);
        Ok(())
    }

    fn join(&mut self, speaker: SpeakerId, name: String) {
        info!("{} ({}) joined", speaker, name);
        if let Err(e) = self.ensure_pipeline(&speaker) {
            error!("Failed to start pipeline for {}: {}", speaker, e);
            return;
        }

        if !self.services.config.conversation.welcome_on_join {
            return;
        }
        let services = Arc::clone(&self.services);
        self.tasks.spawn(async move {
            if let Err(e) = welcome(&services, &speaker, name).await {
                if e.is_control_flow() {
                    info!("Welcome for {} ended: {}", speaker, e);
                } else {
                    warn!("Welcome for {} failed: {}", speaker, e);
                }
            }
        });
    }

    async fn leave(&mut self, speaker: &SpeakerId) {
        info!("{} left", speaker);
        self.services.interrupts.untrack(speaker);
        if let Some(pipeline) = self.pipelines.remove(speaker) {
            pipeline.shutdown().await;
        }
    }

    fn greet(&mut self) {
        if !self.services.config.conversation.greet_on_start {
            return;
        }
        let Some(greeting) = self.services.assets.greeting.clone() else {
            return;
        };
        let services = Arc::clone(&self.services);
        self.tasks.spawn(async move {
            match services.playback.play(greeting).await {
                Ok(outcome) => debug!("Greeting played: {:?}", outcome),
                Err(e) => warn!("Greeting failed: {}", e),
            }
        });
    }

    /// Collect finished background tasks
    fn reap(&mut self) {
        while let Some(joined) = self.tasks.try_join_next() {
            if let Err(e) = joined {
                if !e.is_cancelled() {
                    warn!("Channel task failed: {}", e);
                }
            }
        }
    }

    /// Cancel and await every pipeline and background task
    pub async fn shutdown(&mut self) {
        for (speaker, pipeline) in self.pipelines.drain() {
            self.services.interrupts.untrack(&speaker);
            pipeline.shutdown().await;
        }
        self.tasks.shutdown().await;
        if self.services.playback.is_busy() {
            debug!("Playback still draining at shutdown");
        }
        info!("Voice channel stopped");
    }
}

/// Greet a newly joined speaker through the NLU welcome event
async fn welcome(services: &ChannelServices, speaker: &SpeakerId, name: String) -> Result<()> {
    let _attention = services.attention.acquire(speaker).await;
    let language = services.config.conversation.default_language.clone();

    let mut params = HashMap::new();
    params.insert("name".to_string(), name);
    let query = NluQuery {
        session_id: speaker.to_string(),
        input: NluInput::Event {
            name: "WELCOME".to_string(),
            params,
        },
        contexts: Vec::new(),
        language: language.clone(),
    };

    let intent = services.backends.nlu.detect(&query).await?;
    if !intent.text.trim().is_empty() {
        services.say(&intent.text, &language).await?;
    }
    Ok(())
}

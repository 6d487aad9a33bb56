//! Channel services shared by every speaker pipeline
//!
//! Pipelines hold an `Arc<ChannelServices>`, never a reference back to the
//! channel that owns them.

use parley_audio::AudioBuffer;
use parley_vad::{VadFactory, VoiceActivity};
use parley_wake::{WakeDetector, WakeEngineFactory};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::attention::AttentionLock;
use crate::backend::Backends;
use crate::config::{AssetsConfig, EngineConfig};
use crate::error::{EngineError, Result};
use crate::interrupt::InterruptCoordinator;
use crate::playback::{PlaybackEngine, PlaybackOutcome};
use crate::transport::VoiceTransport;

/// Local audio cues, loaded once
#[derive(Debug, Clone, Default)]
pub struct Assets {
    pub greeting: Option<AudioBuffer>,
    pub ambient: Option<AudioBuffer>,
    pub acknowledgment: Option<AudioBuffer>,
}

impl Assets {
    pub fn load(config: &AssetsConfig) -> Result<Self> {
        Ok(Self {
            greeting: load_asset("greeting", config.greeting.as_deref())?,
            ambient: load_asset("ambient", config.ambient.as_deref())?,
            acknowledgment: load_asset("acknowledgment", config.acknowledgment.as_deref())?,
        })
    }
}

fn load_asset(name: &str, path: Option<&Path>) -> Result<Option<AudioBuffer>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let audio = AudioBuffer::load_wav(path)?;
    info!(
        "Loaded {} cue from {} ({:?})",
        name,
        path.display(),
        audio.duration()
    );
    Ok(Some(audio))
}

/// Detector factories for new pipelines and captures
#[derive(Clone)]
pub struct Detectors {
    pub vad: Arc<dyn VadFactory>,
    pub wake: Arc<dyn WakeEngineFactory>,
}

pub struct ChannelServices {
    pub config: EngineConfig,
    pub backends: Backends,
    pub playback: PlaybackEngine,
    pub attention: AttentionLock,
    pub interrupts: InterruptCoordinator,
    pub assets: Assets,
    pub detectors: Detectors,
}

impl ChannelServices {
    pub fn new(
        config: EngineConfig,
        transport: Arc<dyn VoiceTransport>,
        backends: Backends,
        detectors: Detectors,
        assets: Assets,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| EngineError::config(format!("{:#}", e)))?;

        let playback = PlaybackEngine::new(
            transport,
            config.channel.output,
            config.channel.frame_length(),
        )?;

        Ok(Self {
            interrupts: InterruptCoordinator::new(detectors.wake.clone()),
            attention: AttentionLock::new(),
            playback,
            assets,
            backends,
            detectors,
            config,
        })
    }

    pub fn new_vad(&self) -> Result<Box<dyn VoiceActivity>> {
        Ok(self.detectors.vad.create()?)
    }

    pub fn new_wake_detector(&self) -> Result<WakeDetector> {
        Ok(WakeDetector::from_factory(self.detectors.wake.as_ref())?)
    }

    /// Synthesize `text` and play it, interruptible by any tracked speaker
    pub async fn say(&self, text: &str, language: &str) -> Result<PlaybackOutcome> {
        debug!("Saying {:?} ({})", text, language);
        let audio = self
            .backends
            .synthesizer
            .synthesize(text, language)
            .await?;
        self.interrupts
            .play_interruptible(&self.playback, audio)
            .await
    }
}

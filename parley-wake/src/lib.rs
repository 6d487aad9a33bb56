//! Parley Wake
//!
//! Per-speaker wake-word detection. A [`WakeDetector`] owns one
//! [`WakeWordEngine`] and adapts arbitrary transport packets to the fixed
//! frame size and rate the engine was built for:
//!
//! ```text
//! packet (transport format)
//!   │
//!   ├─> to_mono ─> 16-bit ─> engine rate
//!   │
//!   └─> accumulator ─> [frame_length samples] ─> engine.process ─> keyword index
//! ```
//!
//! Detectors are never shared. Each speaker pipeline owns one, and every
//! barge-in race builds fresh ones from a [`WakeEngineFactory`].

mod error;

use parley_audio::AudioBuffer;
use tracing::{debug, info};

pub use error::{Result, WakeError};

/// Keyword-spotting engine with a fixed frame size and sample rate
pub trait WakeWordEngine: Send {
    /// Samples per frame passed to [`WakeWordEngine::process`]
    fn frame_length(&self) -> usize;

    /// Sample rate the engine expects
    fn sample_rate(&self) -> u32;

    /// Process one frame of mono 16-bit samples
    ///
    /// Returns the index of the matched keyword, if any.
    fn process(&mut self, frame: &[i16]) -> Result<Option<usize>>;
}

/// Builds engines for new detectors
pub trait WakeEngineFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn WakeWordEngine>>;
}

impl<F> WakeEngineFactory for F
where
    F: Fn() -> Result<Box<dyn WakeWordEngine>> + Send + Sync,
{
    fn create(&self) -> Result<Box<dyn WakeWordEngine>> {
        self()
    }
}

/// A keyword match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeMatch {
    pub index: usize,
    pub keyword: Option<String>,
}

/// Stateful frame accumulator in front of a wake-word engine
pub struct WakeDetector {
    engine: Box<dyn WakeWordEngine>,
    keywords: Vec<String>,
    pending: Vec<i16>,
}

impl WakeDetector {
    pub fn new(engine: Box<dyn WakeWordEngine>) -> Self {
        let capacity = engine.frame_length() * 2;
        Self {
            engine,
            keywords: Vec::new(),
            pending: Vec::with_capacity(capacity),
        }
    }

    /// Build a detector from a factory
    pub fn from_factory(factory: &dyn WakeEngineFactory) -> Result<Self> {
        Ok(Self::new(factory.create()?))
    }

    /// Keyword names reported alongside match indices
    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn frame_length(&self) -> usize {
        self.engine.frame_length()
    }

    pub fn sample_rate(&self) -> u32 {
        self.engine.sample_rate()
    }

    /// Samples waiting for a full frame
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Feed one packet of audio in any format
    ///
    /// Stops at the first match: the accumulator is cleared and samples after
    /// the matching frame are discarded.
    pub fn feed(&mut self, packet: &AudioBuffer) -> Result<Option<WakeMatch>> {
        let mono = packet
            .to_mono()
            .to_width(2)?
            .to_rate(self.engine.sample_rate())?;
        self.feed_samples(&mono.samples_i16())
    }

    /// Feed mono 16-bit samples already at the engine rate
    pub fn feed_samples(&mut self, samples: &[i16]) -> Result<Option<WakeMatch>> {
        self.pending.extend_from_slice(samples);

        let frame_length = self.engine.frame_length().max(1);
        let mut consumed = 0;
        while self.pending.len() - consumed >= frame_length {
            let frame = &self.pending[consumed..consumed + frame_length];
            consumed += frame_length;

            if let Some(index) = self.engine.process(frame)? {
                let keyword = self.keywords.get(index).cloned();
                info!(
                    "Wake word detected (index: {}, keyword: {:?})",
                    index, keyword
                );
                self.pending.clear();
                return Ok(Some(WakeMatch { index, keyword }));
            }
        }

        self.pending.drain(..consumed);
        debug!("Wake accumulator holding {} samples", self.pending.len());
        Ok(None)
    }

    /// Drop any partially accumulated frame
    pub fn reset(&mut self) {
        self.pending.clear();
    }
}

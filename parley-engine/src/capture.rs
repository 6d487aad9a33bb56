//! Utterance capture with adaptive endpointing
//!
//! A capture keeps an absolute deadline. It starts at `base_timeout` from now,
//! and each counted speech frame pushes it out to `fast_timeout` (once the
//! speaker is clearly talking) or `base_timeout` (before that). Non-speech
//! frames are kept but never extend it. A frame counts as speech when the VAD
//! marks it voiced and its RMS clears the loudness threshold.

use parley_audio::{AudioBuffer, AudioFormat};
use parley_vad::VoiceActivity;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info};

use crate::config::EndpointConfig;
use crate::error::{EngineError, Result};

/// Endpointing parameters for one capture
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointSettings {
    pub base_timeout: Duration,
    pub fast_timeout: Duration,
    pub speech_frames: usize,
    pub rms_threshold: f64,
    pub max_duration: Duration,
}

impl From<&EndpointConfig> for EndpointSettings {
    fn from(config: &EndpointConfig) -> Self {
        Self {
            base_timeout: config.base_timeout(),
            fast_timeout: config.fast_timeout(),
            speech_frames: config.speech_frames,
            rms_threshold: config.rms_threshold,
            max_duration: config.max_duration(),
        }
    }
}

impl EndpointSettings {
    /// Same settings with a different initial silence allowance
    pub fn with_base_timeout(mut self, base_timeout: Duration) -> Self {
        self.base_timeout = base_timeout;
        if self.fast_timeout > base_timeout {
            self.fast_timeout = base_timeout;
        }
        self
    }
}

/// Accumulator for an in-progress capture
pub struct UtteranceSession {
    buffer: AudioBuffer,
    speech_frames: usize,
    deadline: Instant,
}

impl UtteranceSession {
    pub fn new(format: AudioFormat, settings: &EndpointSettings) -> Self {
        Self {
            buffer: AudioBuffer::new(format),
            speech_frames: 0,
            deadline: Instant::now() + settings.base_timeout,
        }
    }

    pub fn speech_frames(&self) -> usize {
        self.speech_frames
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn buffer(&self) -> &AudioBuffer {
        &self.buffer
    }

    /// Append a frame and classify it
    ///
    /// Returns whether the frame counted as speech.
    pub fn push(
        &mut self,
        frame: &AudioBuffer,
        vad: &mut dyn VoiceActivity,
        settings: &EndpointSettings,
    ) -> Result<bool> {
        self.buffer.append(frame)?;

        let block = frame.to_mono().to_width(2)?.to_rate(vad.sample_rate())?;
        let voiced = vad.is_speech(&block.samples_i16())?;
        let rms = frame.rms();
        let speech = voiced && rms > settings.rms_threshold;

        debug!(
            "Capture frame: voiced={} rms={:.1} counted={}",
            voiced, rms, self.speech_frames
        );

        if speech {
            self.speech_frames += 1;
            let timeout = if self.speech_frames >= settings.speech_frames {
                settings.fast_timeout
            } else {
                settings.base_timeout
            };
            self.deadline = Instant::now() + timeout;
        }

        Ok(speech)
    }

    /// Finish the capture
    pub fn finish(self) -> Result<AudioBuffer> {
        if self.speech_frames == 0 {
            return Err(EngineError::EmptyUtterance);
        }
        Ok(self.buffer)
    }
}

/// Capture one utterance from a speaker's queue
///
/// Frames queued before the call are discarded. Ends when the endpoint
/// deadline passes or `max_duration` is reached; yields
/// [`EngineError::EmptyUtterance`] if no frame counted as speech.
pub async fn capture_utterance(
    input: &mut mpsc::UnboundedReceiver<AudioBuffer>,
    vad: &mut dyn VoiceActivity,
    format: AudioFormat,
    settings: &EndpointSettings,
) -> Result<AudioBuffer> {
    let mut stale = 0;
    while input.try_recv().is_ok() {
        stale += 1;
    }
    if stale > 0 {
        debug!("Dropped {} stale frames before capture", stale);
    }

    let hard_stop = Instant::now() + settings.max_duration;
    let mut session = UtteranceSession::new(format, settings);

    loop {
        let deadline = session.deadline().min(hard_stop);
        match timeout_at(deadline, input.recv()).await {
            Err(_) => break,
            Ok(None) => return Err(EngineError::InputClosed),
            Ok(Some(frame)) => {
                session.push(&frame, vad, settings)?;
            }
        }
    }

    info!(
        "Capture ended ({:?} of audio, {} speech frames)",
        session.buffer().duration(),
        session.speech_frames()
    );
    session.finish()
}

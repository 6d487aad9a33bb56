//! WebRTC VAD wrapper
//!
//! WebRTC VAD only accepts 10, 20 or 30ms windows. Arbitrary blocks are split
//! into the largest valid windows and the block counts as speech when any
//! window is voiced. A trailing remainder shorter than 10ms is ignored.

use tracing::{debug, info};
use webrtc_vad::{SampleRate, Vad, VadMode};

use crate::error::{Result, VadError};
use crate::{VadConfig, VoiceActivity};

/// Voice activity detector using WebRTC VAD
pub struct WebRtcVad {
    vad: Vad,
    sample_rate: u32,
}

// SAFETY: `Vad` holds a raw pointer to a heap-allocated fvad instance with no
// thread affinity. The wrapper is only ever used through `&mut self`, so moving
// it between worker threads never produces concurrent access.
unsafe impl Send for WebRtcVad {}

impl WebRtcVad {
    pub fn new(config: &VadConfig) -> Result<Self> {
        config.validate()?;

        let mode = match config.mode {
            0 => VadMode::Quality,
            1 => VadMode::LowBitrate,
            2 => VadMode::Aggressive,
            _ => VadMode::VeryAggressive,
        };

        let rate = match config.sample_rate {
            8000 => SampleRate::Rate8kHz,
            16000 => SampleRate::Rate16kHz,
            32000 => SampleRate::Rate32kHz,
            48000 => SampleRate::Rate48kHz,
            other => {
                return Err(VadError::config(format!("Invalid sample rate: {}", other)));
            }
        };

        info!(
            "Initializing WebRTC VAD (sample_rate: {}Hz, mode: {})",
            config.sample_rate, config.mode
        );

        Ok(Self {
            vad: Vad::new_with_rate_and_mode(rate, mode),
            sample_rate: config.sample_rate,
        })
    }

    /// Samples in one 10ms window
    fn window_10ms(&self) -> usize {
        self.sample_rate as usize / 100
    }
}

impl VoiceActivity for WebRtcVad {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn is_speech(&mut self, samples: &[i16]) -> Result<bool> {
        let unit = self.window_10ms();
        let mut offset = 0;
        let mut voiced = false;

        while samples.len() - offset >= unit {
            let remaining = (samples.len() - offset) / unit;
            let window = remaining.min(3) * unit;
            let chunk = &samples[offset..offset + window];

            let speech = self.vad.is_voice_segment(chunk).map_err(|_| {
                VadError::processing(format!("invalid frame length {}", chunk.len()))
            })?;
            voiced |= speech;
            offset += window;
        }

        debug!(
            "VAD result: {} ({} samples)",
            if voiced { "SPEECH" } else { "SILENCE" },
            samples.len()
        );
        Ok(voiced)
    }
}

//! PCM stream format descriptor

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::{AudioError, Result};

/// Channel count, sample width and rate of an interleaved PCM stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Interleaved channel count (1 = mono, 2 = stereo)
    pub channels: u16,
    /// Bytes per sample (1 = unsigned 8-bit, 2/3/4 = signed little-endian)
    pub sample_width: u16,
    /// Frames per second
    pub sample_rate: u32,
}

impl AudioFormat {
    pub const fn new(channels: u16, sample_width: u16, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_width,
            sample_rate,
        }
    }

    /// 16-bit mono at the given rate, the format wake-word engines and VADs consume
    pub const fn mono_i16(sample_rate: u32) -> Self {
        Self::new(1, 2, sample_rate)
    }

    /// 16-bit stereo at the given rate
    pub const fn stereo_i16(sample_rate: u32) -> Self {
        Self::new(2, 2, sample_rate)
    }

    /// Bytes per frame (one sample for every channel)
    pub fn frame_width(&self) -> usize {
        self.channels as usize * self.sample_width as usize
    }

    /// Number of frames covering `duration` (rounded to nearest)
    pub fn frames_for(&self, duration: Duration) -> usize {
        (duration.as_secs_f64() * self.sample_rate as f64).round() as usize
    }

    /// Duration of `frames` frames
    pub fn duration_of(&self, frames: usize) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let nanos = frames as u128 * 1_000_000_000 / self.sample_rate as u128;
        Duration::from_nanos(nanos as u64)
    }

    pub fn with_channels(self, channels: u16) -> Self {
        Self { channels, ..self }
    }

    pub fn with_rate(self, sample_rate: u32) -> Self {
        Self {
            sample_rate,
            ..self
        }
    }

    pub fn with_width(self, sample_width: u16) -> Self {
        Self {
            sample_width,
            ..self
        }
    }

    /// Check that the format describes a representable stream
    pub fn validate(&self) -> Result<()> {
        if self.channels == 0 {
            return Err(AudioError::invalid_format("Channel count cannot be zero"));
        }
        if self.sample_rate == 0 {
            return Err(AudioError::invalid_format("Sample rate cannot be zero"));
        }
        if !(1..=4).contains(&self.sample_width) {
            return Err(AudioError::UnsupportedWidth(self.sample_width));
        }
        Ok(())
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "channels={} width={} rate={}Hz",
            self.channels, self.sample_width, self.sample_rate
        )
    }
}

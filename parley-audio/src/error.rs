//! Error types for buffer arithmetic and conversion

use thiserror::Error;

use crate::format::AudioFormat;

pub type Result<T> = std::result::Result<T, AudioError>;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Incompatible audio formats: {left} vs {right}")]
    FormatMismatch { left: AudioFormat, right: AudioFormat },

    #[error("Data length {len} is not a multiple of the frame width {frame_width}")]
    MisalignedData { len: usize, frame_width: usize },

    #[error("Unsupported sample width: {0} bytes")]
    UnsupportedWidth(u16),

    #[error("Cannot {operation} audio with {channels} channels")]
    UnsupportedChannels {
        channels: u16,
        operation: &'static str,
    },

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Resampling error: {0}")]
    ResampleError(String),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AudioError {
    pub fn format_mismatch(left: AudioFormat, right: AudioFormat) -> Self {
        Self::FormatMismatch { left, right }
    }

    pub fn invalid_format<S: Into<String>>(msg: S) -> Self {
        Self::InvalidFormat(msg.into())
    }

    pub fn resample<S: Into<String>>(msg: S) -> Self {
        Self::ResampleError(msg.into())
    }
}

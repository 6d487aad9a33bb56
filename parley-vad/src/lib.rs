//! Voice Activity Detection (VAD) for utterance endpointing
//!
//! Classifies short mono 16-bit frames as speech or non-speech. The engine
//! runs one detector per active capture and pairs the classification with a
//! loudness gate before counting a frame as speech.
//!
//! # Example
//!
//! ```no_run
//! use parley_vad::{VadConfig, VadFactory};
//!
//! let config = VadConfig::default();
//! let mut vad = config.create()?;
//!
//! // 20ms of 16kHz mono audio
//! let frame = vec![0i16; 320];
//! if vad.is_speech(&frame)? {
//!     println!("speech");
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod error;
mod webrtc;

use serde::{Deserialize, Serialize};

pub use error::{Result, VadError};
pub use webrtc::WebRtcVad;

/// Speech / non-speech classifier over mono 16-bit samples
pub trait VoiceActivity: Send {
    /// Sample rate the classifier expects its input at
    fn sample_rate(&self) -> u32;

    /// Classify a block of samples at [`VoiceActivity::sample_rate`]
    fn is_speech(&mut self, samples: &[i16]) -> Result<bool>;
}

/// Produces a fresh classifier for each capture
pub trait VadFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn VoiceActivity>>;
}

impl<F> VadFactory for F
where
    F: Fn() -> Result<Box<dyn VoiceActivity>> + Send + Sync,
{
    fn create(&self) -> Result<Box<dyn VoiceActivity>> {
        self()
    }
}

/// VAD configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    /// Aggressiveness (0-3, where 3 filters the most non-speech)
    pub mode: u8,

    /// Classifier sample rate (8000, 16000, 32000 or 48000 Hz)
    pub sample_rate: u32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            mode: 3,
            sample_rate: 16000,
        }
    }
}

impl VadConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.mode > 3 {
            return Err(VadError::config(format!(
                "VAD mode must be 0-3, got {}",
                self.mode
            )));
        }

        if !matches!(self.sample_rate, 8000 | 16000 | 32000 | 48000) {
            return Err(VadError::config(format!(
                "WebRTC VAD only supports 8000, 16000, 32000, or 48000 Hz, got {}",
                self.sample_rate
            )));
        }

        Ok(())
    }
}

impl VadFactory for VadConfig {
    fn create(&self) -> Result<Box<dyn VoiceActivity>> {
        Ok(Box::new(WebRtcVad::new(self)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        assert!(VadConfig::default().validate().is_ok());

        let bad_mode = VadConfig {
            mode: 4,
            ..Default::default()
        };
        assert!(bad_mode.validate().is_err());

        let bad_rate = VadConfig {
            sample_rate: 44100,
            ..Default::default()
        };
        assert!(bad_rate.validate().is_err());
    }

    #[test]
    fn test_closure_factory() {
        struct Never;
        impl VoiceActivity for Never {
            fn sample_rate(&self) -> u32 {
                16000
            }
            fn is_speech(&mut self, _samples: &[i16]) -> Result<bool> {
                Ok(false)
            }
        }

        let factory = || -> Result<Box<dyn VoiceActivity>> { Ok(Box::new(Never)) };
        let mut vad = factory.create().unwrap();
        assert_eq!(vad.sample_rate(), 16000);
        assert!(!vad.is_speech(&[0; 160]).unwrap());
    }

    #[test]
    fn test_config_factory() {
        let mut vad = VadConfig::default().create().unwrap();
        assert!(!vad.is_speech(&vec![0i16; 320]).unwrap());
    }
}

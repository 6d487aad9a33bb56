//! Configuration management

use anyhow::{bail, Context, Result};
use parley_audio::AudioFormat;
use parley_vad::VadConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Seconds to a `Duration`, treating invalid values as zero
fn secs(value: f32) -> Duration {
    Duration::try_from_secs_f32(value).unwrap_or(Duration::ZERO)
}

/// Channel audio formats
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Outbound frame duration (seconds)
    pub frame_duration: f32,

    /// Format of inbound per-speaker PCM
    pub inbound: AudioFormat,

    /// Mandatory format of outbound PCM
    pub output: AudioFormat,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            frame_duration: 0.02,
            inbound: AudioFormat::stereo_i16(48000),
            output: AudioFormat::stereo_i16(48000),
        }
    }
}

impl ChannelConfig {
    pub fn frame_length(&self) -> Duration {
        secs(self.frame_duration)
    }
}

/// Utterance endpointing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Silence tolerated before any speech (seconds)
    pub base_timeout: f32,

    /// Silence that ends the utterance once the speaker is clearly talking (seconds)
    pub fast_timeout: f32,

    /// Speech frames before switching to the fast timeout
    pub speech_frames: usize,

    /// Minimum RMS for a VAD-positive frame to count as speech
    pub rms_threshold: f64,

    /// Hard cap on one capture (seconds)
    pub max_duration: f32,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_timeout: 2.3,
            fast_timeout: 0.4,
            speech_frames: 10,
            rms_threshold: 50.0,
            max_duration: 20.0,
        }
    }
}

impl EndpointConfig {
    pub fn base_timeout(&self) -> Duration {
        secs(self.base_timeout)
    }

    pub fn fast_timeout(&self) -> Duration {
        secs(self.fast_timeout)
    }

    pub fn max_duration(&self) -> Duration {
        secs(self.max_duration)
    }
}

/// Conversation behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Language for new speakers (BCP-47)
    pub default_language: String,

    /// Follow-up captures allowed while required parameters are missing
    pub max_followups: usize,

    /// Default `listen` timeout for skills (seconds)
    pub listen_timeout: f32,

    /// Default `listen` attempts for skills
    pub listen_tries: usize,

    /// Default `ask_and_detect_intent` attempts
    pub intent_tries: usize,

    /// Skill that handles the `fallback` action
    pub fallback_skill: String,

    /// Play the greeting asset when the channel starts
    pub greet_on_start: bool,

    /// Send the WELCOME event when a speaker joins
    pub welcome_on_join: bool,

    /// Play the acknowledgment asset after a wake word
    pub acknowledge_wake: bool,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            default_language: "en-US".to_string(),
            max_followups: 2,
            listen_timeout: 4.0,
            listen_tries: 1,
            intent_tries: 3,
            fallback_skill: "parlai".to_string(),
            greet_on_start: true,
            welcome_on_join: true,
            acknowledge_wake: false,
        }
    }
}

impl ConversationConfig {
    pub fn listen_timeout(&self) -> Duration {
        secs(self.listen_timeout)
    }
}

/// Local WAV cues, loaded once at channel start
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    pub greeting: Option<PathBuf>,
    pub ambient: Option<PathBuf>,
    pub acknowledgment: Option<PathBuf>,
}

/// Localized fixed phrases
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhraseConfig {
    /// Spoken when a turn captured nothing
    pub empty_utterance: String,

    /// Spoken for unknown NLU actions; `{action}` is replaced
    pub unknown_action: String,

    /// Spoken between `listen` attempts
    pub silence_reprompt: String,
}

impl Default for PhraseConfig {
    fn default() -> Self {
        Self {
            empty_utterance: "Sorry, I didn't catch that.".to_string(),
            unknown_action: "Sorry, I don't know how to do {action} yet.".to_string(),
            silence_reprompt: "I'm listening.".to_string(),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Path to configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    pub channel: ChannelConfig,
    pub endpoint: EndpointConfig,
    pub vad: VadConfig,
    pub conversation: ConversationConfig,
    pub assets: AssetsConfig,
    pub phrases: PhraseConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            config_path: Self::default_config_path(),
            channel: ChannelConfig::default(),
            endpoint: EndpointConfig::default(),
            vad: VadConfig::default(),
            conversation: ConversationConfig::default(),
            assets: AssetsConfig::default(),
            phrases: PhraseConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from the default location, or create it
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Self::default();
            config.save().context("Failed to save default config")?;
            Ok(config)
        }
    }

    /// Load configuration from a specific file
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let mut config: EngineConfig =
            toml::from_str(&contents).context("Failed to parse config file")?;

        config.config_path = path.to_path_buf();
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&self.config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        self.channel
            .inbound
            .validate()
            .context("Invalid inbound format")?;
        self.channel
            .output
            .validate()
            .context("Invalid output format")?;

        if !(self.channel.frame_duration > 0.0) {
            bail!("frame_duration must be positive");
        }
        if self.channel.output.frames_for(self.channel.frame_length()) == 0 {
            bail!("frame_duration is shorter than one output frame");
        }

        let endpoint = &self.endpoint;
        if !(endpoint.base_timeout > 0.0) || !(endpoint.fast_timeout > 0.0) {
            bail!("Endpoint timeouts must be positive");
        }
        if endpoint.fast_timeout > endpoint.base_timeout {
            bail!(
                "fast_timeout ({}) must not exceed base_timeout ({})",
                endpoint.fast_timeout,
                endpoint.base_timeout
            );
        }
        if !(endpoint.max_duration > 0.0) {
            bail!("max_duration must be positive");
        }

        self.vad.validate().context("Invalid VAD config")?;

        if self.conversation.intent_tries == 0 || self.conversation.listen_tries == 0 {
            bail!("Retry budgets must be at least 1");
        }

        Ok(())
    }

    /// Get default config path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("parley")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.channel.frame_length(), Duration::from_millis(20));
        assert_eq!(config.endpoint.speech_frames, 10);
        assert_eq!(config.conversation.max_followups, 2);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.config_path = dir.path().join("nested").join("config.toml");
        config.conversation.default_language = "de-DE".to_string();
        config.endpoint.fast_timeout = 0.5;
        config.save().unwrap();

        let loaded = EngineConfig::load_from(&config.config_path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[endpoint]\nbase_timeout = 3.0\n\n[conversation]\nacknowledge_wake = true\n",
        )
        .unwrap();

        let config = EngineConfig::load_from(&path).unwrap();
        assert_eq!(config.endpoint.base_timeout, 3.0);
        assert_eq!(config.endpoint.fast_timeout, 0.4);
        assert!(config.conversation.acknowledge_wake);
        assert_eq!(config.channel.inbound, AudioFormat::stereo_i16(48000));
    }

    #[test]
    fn test_validation_rejects_inverted_timeouts() {
        let mut config = EngineConfig::default();
        config.endpoint.fast_timeout = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_formats() {
        let mut config = EngineConfig::default();
        config.channel.output.sample_width = 5;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.vad.mode = 7;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.channel.frame_duration = 0.0;
        assert!(config.validate().is_err());
    }
}

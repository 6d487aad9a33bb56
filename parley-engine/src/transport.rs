//! Channel transport interface
//!
//! The transport delivers labeled inbound PCM and membership notifications,
//! and accepts paced outbound frames. Connecting, authenticating and
//! reconnecting all happen on the host side.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;

/// Opaque speaker identity assigned by the transport
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SpeakerId(String);

impl SpeakerId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SpeakerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SpeakerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for SpeakerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One packet of inbound PCM in the channel's negotiated format
#[derive(Debug, Clone)]
pub struct InboundFrame {
    pub speaker: SpeakerId,
    pub pcm: Vec<u8>,
}

impl InboundFrame {
    pub fn new<S: Into<SpeakerId>>(speaker: S, pcm: Vec<u8>) -> Self {
        Self {
            speaker: speaker.into(),
            pcm,
        }
    }
}

/// Everything the transport delivers to the channel
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Frame(InboundFrame),
    Joined { speaker: SpeakerId, name: String },
    Left(SpeakerId),
}

/// Outbound half of the channel transport
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Send one frame in the channel's output format
    async fn send_frame(&self, pcm: &[u8]) -> Result<()>;

    /// Toggle the channel's speaking indicator
    async fn set_speaking(&self, speaking: bool) -> Result<()>;
}

//! Parley Audio
//!
//! Immutable-shape PCM containers for the voice channel: format-checked
//! arithmetic, channel conversion, resampling and frame-indexed slicing.
//!
//! ## Architecture
//!
//! ```text
//! inbound PCM bytes (transport format)
//!   │
//!   ├─> AudioBuffer (format + raw interleaved samples)
//!   │     │
//!   │     ├─> to_mono / to_stereo
//!   │     ├─> Resampler (rubato) -> detector / VAD rate
//!   │     └─> slice / split_at (frame indexed)
//!   │
//!   └─> WAV assets (hound) -> greeting, ambient cue, acknowledgments
//! ```

pub mod buffer;
pub mod error;
pub mod format;
pub mod resampler;
pub mod wav;

pub use buffer::AudioBuffer;
pub use error::{AudioError, Result};
pub use format::AudioFormat;
pub use resampler::Resampler;

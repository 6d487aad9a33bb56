//! Format-checked PCM buffer
//!
//! `AudioBuffer` pairs raw interleaved little-endian samples with the
//! [`AudioFormat`] describing them. The byte length is always a whole number
//! of frames, arithmetic between buffers requires identical formats, and all
//! slicing is expressed in frames rather than bytes.

use std::fmt;
use std::ops::{Bound, RangeBounds};
use std::time::Duration;

use crate::error::{AudioError, Result};
use crate::format::AudioFormat;
use crate::resampler::Resampler;

/// Interleaved PCM samples with their format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBuffer {
    format: AudioFormat,
    data: Vec<u8>,
}

impl AudioBuffer {
    /// Empty buffer of the given format
    pub fn new(format: AudioFormat) -> Self {
        Self {
            format,
            data: Vec::new(),
        }
    }

    /// Wrap raw bytes, rejecting partial frames
    ///
    /// # Example
    ///
    /// ```
    /// use parley_audio::{AudioBuffer, AudioFormat};
    ///
    /// let format = AudioFormat::stereo_i16(48000);
    /// assert!(AudioBuffer::from_bytes(format, vec![0; 8]).is_ok());
    /// assert!(AudioBuffer::from_bytes(format, vec![0; 7]).is_err());
    /// ```
    pub fn from_bytes(format: AudioFormat, data: Vec<u8>) -> Result<Self> {
        format.validate()?;

        let frame_width = format.frame_width();
        if data.len() % frame_width != 0 {
            return Err(AudioError::MisalignedData {
                len: data.len(),
                frame_width,
            });
        }

        Ok(Self { format, data })
    }

    /// Build a 16-bit buffer from interleaved samples
    pub fn from_i16(channels: u16, sample_rate: u32, samples: &[i16]) -> Result<Self> {
        let format = AudioFormat::new(channels, 2, sample_rate);
        let data = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self::from_bytes(format, data)
    }

    /// Build a buffer from normalized `[-1.0, 1.0]` interleaved samples
    pub fn from_f32(format: AudioFormat, samples: &[f32]) -> Result<Self> {
        format.validate()?;

        let (min, max) = sample_range(format.sample_width);
        let scale = full_scale(format.sample_width);
        let values: Vec<i32> = samples
            .iter()
            .map(|&s| {
                let v = (s.clamp(-1.0, 1.0) as f64 * scale).round() as i64;
                v.clamp(min, max) as i32
            })
            .collect();

        Self::from_bytes(format, encode(&values, format.sample_width))
    }

    /// `frames` frames of silence in `format`
    pub fn silence(format: AudioFormat, frames: usize) -> Self {
        let fill = if format.sample_width == 1 { 0x80 } else { 0x00 };
        Self {
            format,
            data: vec![fill; frames * format.frame_width()],
        }
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn channels(&self) -> u16 {
        self.format.channels
    }

    pub fn sample_width(&self) -> u16 {
        self.format.sample_width
    }

    pub fn sample_rate(&self) -> u32 {
        self.format.sample_rate
    }

    /// Raw interleaved bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Length in frames
    pub fn frames(&self) -> usize {
        match self.format.frame_width() {
            0 => 0,
            width => self.data.len() / width,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn duration(&self) -> Duration {
        self.format.duration_of(self.frames())
    }

    /// Fail unless `other` has exactly this buffer's format
    pub fn ensure_same_format(&self, other: &AudioBuffer) -> Result<()> {
        if self.format != other.format {
            return Err(AudioError::format_mismatch(self.format, other.format));
        }
        Ok(())
    }

    /// Append `other` in place
    pub fn append(&mut self, other: &AudioBuffer) -> Result<()> {
        self.ensure_same_format(other)?;
        self.data.extend_from_slice(&other.data);
        Ok(())
    }

    /// New buffer holding `self` followed by `other`
    pub fn concat(&self, other: &AudioBuffer) -> Result<AudioBuffer> {
        let mut joined = self.clone();
        joined.append(other)?;
        Ok(joined)
    }

    /// Sample-wise sum with saturation
    ///
    /// The shorter operand is treated as trailing silence.
    pub fn mix(&self, other: &AudioBuffer) -> Result<AudioBuffer> {
        self.ensure_same_format(other)?;

        let (min, max) = sample_range(self.format.sample_width);
        let left = self.decode();
        let right = other.decode();
        let len = left.len().max(right.len());

        let mixed: Vec<i32> = (0..len)
            .map(|i| {
                let a = left.get(i).copied().unwrap_or(0) as i64;
                let b = right.get(i).copied().unwrap_or(0) as i64;
                (a + b).clamp(min, max) as i32
            })
            .collect();

        Ok(self.with_samples(&mixed))
    }

    /// Multiply every sample by `factor`, clamping to the sample range
    pub fn scale(&self, factor: f64) -> AudioBuffer {
        let (min, max) = sample_range(self.format.sample_width);
        let scaled: Vec<i32> = self
            .decode()
            .into_iter()
            .map(|v| ((v as f64 * factor).round() as i64).clamp(min, max) as i32)
            .collect();
        self.with_samples(&scaled)
    }

    /// Frame-indexed slice, clamped to the buffer
    pub fn slice<R: RangeBounds<usize>>(&self, range: R) -> AudioBuffer {
        let frames = self.frames();
        let start = match range.start_bound() {
            Bound::Included(&s) => s,
            Bound::Excluded(&s) => s.saturating_add(1),
            Bound::Unbounded => 0,
        }
        .min(frames);
        let end = match range.end_bound() {
            Bound::Included(&e) => e.saturating_add(1),
            Bound::Excluded(&e) => e,
            Bound::Unbounded => frames,
        }
        .clamp(start, frames);

        let width = self.format.frame_width();
        Self {
            format: self.format,
            data: self.data[start * width..end * width].to_vec(),
        }
    }

    /// Split into `[0, frame)` and `[frame, len)`
    pub fn split_at(&self, frame: usize) -> (AudioBuffer, AudioBuffer) {
        (self.slice(..frame), self.slice(frame..))
    }

    /// Root mean square over all samples, in native integer units
    pub fn rms(&self) -> f64 {
        let samples = self.decode();
        if samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = samples.iter().map(|&v| (v as f64) * (v as f64)).sum();
        (sum / samples.len() as f64).sqrt()
    }

    /// Average all channels into one
    pub fn to_mono(&self) -> AudioBuffer {
        let channels = self.format.channels as usize;
        if channels <= 1 {
            return self.clone();
        }

        let mono: Vec<i32> = self
            .decode()
            .chunks_exact(channels)
            .map(|frame| {
                let sum: i64 = frame.iter().map(|&v| v as i64).sum();
                (sum / channels as i64) as i32
            })
            .collect();

        Self {
            format: self.format.with_channels(1),
            data: encode(&mono, self.format.sample_width),
        }
    }

    /// Duplicate mono into both channels; stereo is returned unchanged
    pub fn to_stereo(&self) -> Result<AudioBuffer> {
        match self.format.channels {
            2 => Ok(self.clone()),
            1 => {
                let width = self.format.sample_width as usize;
                let mut data = Vec::with_capacity(self.data.len() * 2);
                for sample in self.data.chunks_exact(width) {
                    data.extend_from_slice(sample);
                    data.extend_from_slice(sample);
                }
                Ok(Self {
                    format: self.format.with_channels(2),
                    data,
                })
            }
            channels => Err(AudioError::UnsupportedChannels {
                channels,
                operation: "convert to stereo",
            }),
        }
    }

    /// Convert to one or two channels
    pub fn to_channels(&self, channels: u16) -> Result<AudioBuffer> {
        match channels {
            c if c == self.format.channels => Ok(self.clone()),
            1 => Ok(self.to_mono()),
            2 => self.to_mono().to_stereo(),
            channels => Err(AudioError::UnsupportedChannels {
                channels,
                operation: "convert to",
            }),
        }
    }

    /// Change the sample width, preserving relative amplitude
    pub fn to_width(&self, sample_width: u16) -> Result<AudioBuffer> {
        if sample_width == self.format.sample_width {
            return Ok(self.clone());
        }
        let target = self.format.with_width(sample_width);
        target.validate()?;

        let shift = 8 * (sample_width as i32 - self.format.sample_width as i32);
        let converted: Vec<i32> = self
            .decode()
            .into_iter()
            .map(|v| {
                if shift >= 0 {
                    ((v as i64) << shift) as i32
                } else {
                    ((v as i64) >> -shift) as i32
                }
            })
            .collect();

        Ok(Self {
            format: target,
            data: encode(&converted, sample_width),
        })
    }

    /// Resample to `sample_rate`
    ///
    /// The result holds exactly `round(frames * sample_rate / source_rate)` frames.
    pub fn to_rate(&self, sample_rate: u32) -> Result<AudioBuffer> {
        if sample_rate == self.format.sample_rate {
            return Ok(self.clone());
        }
        let target = self.format.with_rate(sample_rate);
        target.validate()?;

        if self.is_empty() {
            return Ok(Self::new(target));
        }

        let mut resampler =
            Resampler::new(self.format.sample_rate, sample_rate, self.format.channels)?;
        let resampled = resampler.process(&self.samples_f32())?;
        Self::from_f32(target, &resampled)
    }

    /// Convert channels, width and rate to `target`
    pub fn convert(&self, target: AudioFormat) -> Result<AudioBuffer> {
        if self.format == target {
            return Ok(self.clone());
        }
        target.validate()?;

        self.to_channels(target.channels)?
            .to_width(target.sample_width)?
            .to_rate(target.sample_rate)
    }

    /// Interleaved samples as 16-bit integers
    pub fn samples_i16(&self) -> Vec<i16> {
        let (min, max) = sample_range(2);
        let shift = 8 * (2 - self.format.sample_width as i32);
        self.decode()
            .into_iter()
            .map(|v| {
                let v = if shift >= 0 {
                    (v as i64) << shift
                } else {
                    (v as i64) >> -shift
                };
                v.clamp(min, max) as i16
            })
            .collect()
    }

    /// Interleaved samples normalized to `[-1.0, 1.0]`
    pub fn samples_f32(&self) -> Vec<f32> {
        let scale = full_scale(self.format.sample_width);
        self.decode()
            .into_iter()
            .map(|v| (v as f64 / scale) as f32)
            .collect()
    }

    fn with_samples(&self, samples: &[i32]) -> AudioBuffer {
        Self {
            format: self.format,
            data: encode(samples, self.format.sample_width),
        }
    }

    fn decode(&self) -> Vec<i32> {
        let width = self.format.sample_width as usize;
        if width == 0 {
            return Vec::new();
        }
        self.data
            .chunks_exact(width)
            .map(|bytes| read_sample(bytes))
            .collect()
    }
}

impl fmt::Display for AudioBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} frames={} duration={:.3}s",
            self.format,
            self.frames(),
            self.duration().as_secs_f64()
        )
    }
}

fn read_sample(bytes: &[u8]) -> i32 {
    match bytes.len() {
        1 => bytes[0] as i32 - 128,
        2 => i16::from_le_bytes([bytes[0], bytes[1]]) as i32,
        3 => {
            let v = (bytes[0] as i32) | (bytes[1] as i32) << 8 | (bytes[2] as i32) << 16;
            (v << 8) >> 8
        }
        _ => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
    }
}

fn encode(samples: &[i32], width: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * width as usize);
    for &v in samples {
        match width {
            1 => out.push((v + 128).clamp(0, 255) as u8),
            2 => out.extend_from_slice(&(v as i16).to_le_bytes()),
            3 => out.extend_from_slice(&v.to_le_bytes()[..3]),
            _ => out.extend_from_slice(&v.to_le_bytes()),
        }
    }
    out
}

fn sample_range(width: u16) -> (i64, i64) {
    let bits = 8 * width.clamp(1, 4) as u32;
    let half = 1i64 << (bits - 1);
    (-half, half - 1)
}

fn full_scale(width: u16) -> f64 {
    (1u64 << (8 * width.clamp(1, 4) as u32 - 1)) as f64
}

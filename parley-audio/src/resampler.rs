//! Audio resampling with rubato
//!
//! Converts interleaved audio between sample rates. Every call produces exactly
//! `round(frames * target / source)` frames so that per-packet conversion never
//! drifts the stream duration.

use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResampler};

use crate::error::{AudioError, Result};

/// Resampler for converting interleaved audio to a target sample rate
pub struct Resampler {
    source_rate: u32,
    target_rate: u32,
    channels: u16,
}

impl Resampler {
    /// Create new resampler
    ///
    /// # Arguments
    ///
    /// * `source_rate` - Source sample rate (e.g., 48000)
    /// * `target_rate` - Target sample rate (e.g., 16000 for the VAD)
    /// * `channels` - Number of interleaved channels
    pub fn new(source_rate: u32, target_rate: u32, channels: u16) -> Result<Self> {
        if source_rate == 0 || target_rate == 0 {
            return Err(AudioError::invalid_format("Sample rate cannot be zero"));
        }

        if channels == 0 {
            return Err(AudioError::invalid_format("Channel count cannot be zero"));
        }

        Ok(Self {
            source_rate,
            target_rate,
            channels,
        })
    }

    /// Create rubato resampler instance sized for one chunk
    fn create_resampler(&self, chunk_size: usize) -> Result<FastFixedIn<f32>> {
        FastFixedIn::<f32>::new(
            self.target_rate as f64 / self.source_rate as f64,
            2.0, // max_resample_ratio_relative
            PolynomialDegree::Cubic,
            chunk_size,
            self.channels as usize,
        )
        .map_err(|e| AudioError::resample(format!("Failed to create resampler: {}", e)))
    }

    /// Resample audio data
    ///
    /// # Arguments
    ///
    /// * `input` - Input audio samples (interleaved if multi-channel)
    ///
    /// # Returns
    ///
    /// Resampled interleaved audio at the target sample rate
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        if self.source_rate == self.target_rate {
            return Ok(input.to_vec());
        }

        let channels = self.channels as usize;
        let frames = input.len() / channels;
        if frames == 0 {
            return Ok(Vec::new());
        }

        // Convert interleaved to planar format (rubato expects Vec<Vec<f32>>)
        let mut planar_input = vec![vec![0.0f32; frames]; channels];
        for (frame_idx, frame) in input.chunks_exact(channels).enumerate() {
            for (ch_idx, &sample) in frame.iter().enumerate() {
                planar_input[ch_idx][frame_idx] = sample;
            }
        }

        let mut resampler = self.create_resampler(frames)?;
        let delay = resampler.output_delay();

        let mut planar_output = resampler
            .process(&planar_input, None)
            .map_err(|e| AudioError::resample(format!("Resampling failed: {}", e)))?;

        // Flush the interpolation delay with a zero-input pass
        let tail = resampler
            .process_partial::<Vec<f32>>(None, None)
            .map_err(|e| AudioError::resample(format!("Resampler flush failed: {}", e)))?;
        for (channel, rest) in planar_output.iter_mut().zip(tail) {
            channel.extend(rest);
        }

        // Drop the leading delay and fit the exact expected length
        let expected = self.expected_output_frames(frames);
        let mut interleaved_output = Vec::with_capacity(expected * channels);
        for frame_idx in delay..delay + expected {
            for channel_data in planar_output.iter().take(channels) {
                interleaved_output.push(channel_data.get(frame_idx).copied().unwrap_or(0.0));
            }
        }

        Ok(interleaved_output)
    }

    /// Output frame count for `frames` input frames
    pub fn expected_output_frames(&self, frames: usize) -> usize {
        if self.source_rate == self.target_rate {
            return frames;
        }
        (frames as f64 * self.target_rate as f64 / self.source_rate as f64).round() as usize
    }

    /// Get expected output length (in samples) for given input length
    pub fn expected_output_len(&self, input_len: usize) -> usize {
        let frames = input_len / self.channels as usize;
        self.expected_output_frames(frames) * self.channels as usize
    }
}

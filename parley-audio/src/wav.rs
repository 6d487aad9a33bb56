//! WAV encoding and decoding with hound
//!
//! Used for the channel's local cue assets and for backends that exchange
//! LINEAR16 WAV payloads.

use std::io::{Cursor, Read, Seek};
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::buffer::AudioBuffer;
use crate::error::{AudioError, Result};
use crate::format::AudioFormat;

impl AudioBuffer {
    /// Load a WAV file from disk
    pub fn load_wav<P: AsRef<Path>>(path: P) -> Result<AudioBuffer> {
        let reader = WavReader::open(path)?;
        Self::read_wav(reader)
    }

    /// Decode an in-memory WAV payload
    pub fn from_wav_bytes(bytes: &[u8]) -> Result<AudioBuffer> {
        let reader = WavReader::new(Cursor::new(bytes))?;
        Self::read_wav(reader)
    }

    /// Encode as a WAV payload
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, self.wav_spec())?;
            self.write_samples(&mut writer)?;
            writer.finalize()?;
        }
        Ok(cursor.into_inner())
    }

    /// Write a WAV file to disk
    pub fn save_wav<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = WavWriter::create(path, self.wav_spec())?;
        self.write_samples(&mut writer)?;
        writer.finalize()?;
        Ok(())
    }

    fn read_wav<R: Read>(mut reader: WavReader<R>) -> Result<AudioBuffer> {
        let spec = reader.spec();

        match spec.sample_format {
            SampleFormat::Int => {
                let width = spec.bits_per_sample.div_ceil(8);
                let format = AudioFormat::new(spec.channels, width, spec.sample_rate);
                format.validate()?;

                let shift = width as u32 * 8 - spec.bits_per_sample as u32;
                let mut data = Vec::with_capacity(reader.len() as usize * width as usize);
                for sample in reader.samples::<i32>() {
                    let value = sample? << shift;
                    match width {
                        1 => data.push((value + 128) as u8),
                        2 => data.extend_from_slice(&(value as i16).to_le_bytes()),
                        3 => data.extend_from_slice(&value.to_le_bytes()[..3]),
                        _ => data.extend_from_slice(&value.to_le_bytes()),
                    }
                }
                AudioBuffer::from_bytes(format, data)
            }
            SampleFormat::Float => {
                // Float payloads are narrowed to 16-bit PCM
                let format = AudioFormat::new(spec.channels, 2, spec.sample_rate);
                let samples = reader
                    .samples::<f32>()
                    .collect::<std::result::Result<Vec<f32>, _>>()?;
                AudioBuffer::from_f32(format, &samples)
            }
        }
    }

    fn wav_spec(&self) -> WavSpec {
        WavSpec {
            channels: self.channels(),
            sample_rate: self.sample_rate(),
            bits_per_sample: self.sample_width() * 8,
            sample_format: SampleFormat::Int,
        }
    }

    fn write_samples<W: std::io::Write + Seek>(&self, writer: &mut WavWriter<W>) -> Result<()> {
        let width = self.sample_width() as usize;
        if width == 0 {
            return Err(AudioError::UnsupportedWidth(0));
        }
        for bytes in self.data().chunks_exact(width) {
            let value = match width {
                1 => bytes[0] as i32 - 128,
                2 => i16::from_le_bytes([bytes[0], bytes[1]]) as i32,
                3 => {
                    let v = (bytes[0] as i32) | (bytes[1] as i32) << 8 | (bytes[2] as i32) << 16;
                    (v << 8) >> 8
                }
                _ => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            };
            writer.write_sample(value)?;
        }
        Ok(())
    }
}

//! Wave file reading and writing over hound
//!
//! The engine works on whole files offline, so the reader loads and
//! de-interleaves all channels up front and hands out per-channel slices.
//! 16-bit integer and 32-bit float PCM are supported; anything else is
//! rejected as an unsupported format.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::info;

use crate::error::TimestretchError;

/// Convert a 16-bit integer sample to a float in [-1.0, 1.0)
#[inline(always)]
pub fn i16_to_f64(sample: i16) -> f64 {
    sample as f64 / 32768.0
}

/// Convert a float sample to 16-bit integer, clamping out-of-range values
#[inline(always)]
pub fn f64_to_i16(sample: f64) -> i16 {
    (sample * 32768.0).round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

/// In-memory, de-interleaved wave file.
pub struct WaveReader {
    sample_rate: u32,
    bits_per_sample: u16,
    sample_format: SampleFormat,
    channel_data: Vec<Vec<f64>>,
}

impl WaveReader {
    /// Open and fully read a wave file
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TimestretchError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(TimestretchError::MissingInput);
        }

        let mut reader = WavReader::open(path)?;
        let spec = reader.spec();
        if spec.channels == 0 {
            return Err(TimestretchError::UnsupportedFormat("zero channels".into()));
        }

        let interleaved: Vec<f64> = match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Int, 16) => reader
                .samples::<i16>()
                .map(|sample| sample.map(i16_to_f64))
                .collect::<Result<_, _>>()?,
            (SampleFormat::Float, 32) => reader
                .samples::<f32>()
                .map(|sample| sample.map(f64::from))
                .collect::<Result<_, _>>()?,
            (format, bits) => {
                return Err(TimestretchError::UnsupportedFormat(format!(
                    "{bits}-bit {format:?} PCM"
                )));
            }
        };

        let channels = spec.channels as usize;
        let frames = interleaved.len() / channels;
        let mut channel_data = vec![Vec::with_capacity(frames); channels];
        for frame in interleaved.chunks_exact(channels) {
            for (channel, &sample) in channel_data.iter_mut().zip(frame) {
                channel.push(sample);
            }
        }

        info!(
            "read {}: {} Hz, {} channel(s), {} samples/channel",
            path.display(),
            spec.sample_rate,
            channels,
            frames
        );

        Ok(Self {
            sample_rate: spec.sample_rate,
            bits_per_sample: spec.bits_per_sample,
            sample_format: spec.sample_format,
            channel_data,
        })
    }

    /// Sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of audio channels
    pub fn channels(&self) -> usize {
        self.channel_data.len()
    }

    /// Bit depth of the source samples
    pub fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample
    }

    /// Source sample encoding
    pub fn sample_format(&self) -> SampleFormat {
        self.sample_format
    }

    /// Number of samples in each channel
    pub fn sample_count(&self) -> usize {
        self.channel_data.first().map_or(0, Vec::len)
    }

    /// All samples of one channel
    pub fn channel(&self, index: usize) -> &[f64] {
        &self.channel_data[index]
    }

    /// A range of one channel, clamped to the available samples
    pub fn read_range(&self, channel: usize, start: usize, count: usize) -> &[f64] {
        let samples = &self.channel_data[channel];
        let start = start.min(samples.len());
        let end = start.saturating_add(count).min(samples.len());
        &samples[start..end]
    }
}

/// Interleaving wave file writer.
pub struct WaveWriter {
    writer: WavWriter<BufWriter<File>>,
    sample_format: SampleFormat,
    samples_written: usize,
}

impl WaveWriter {
    /// Create a wave file with the given layout
    pub fn create(
        path: impl AsRef<Path>,
        channels: u16,
        sample_rate: u32,
        bits_per_sample: u16,
        sample_format: SampleFormat,
    ) -> Result<Self, TimestretchError> {
        match (sample_format, bits_per_sample) {
            (SampleFormat::Int, 16) | (SampleFormat::Float, 32) => {}
            (format, bits) => {
                return Err(TimestretchError::UnsupportedFormat(format!(
                    "{bits}-bit {format:?} PCM"
                )));
            }
        }

        let spec = WavSpec { channels, sample_rate, bits_per_sample, sample_format };
        Ok(Self {
            writer: WavWriter::create(path, spec)?,
            sample_format,
            samples_written: 0,
        })
    }

    /// Number of samples written so far, per channel
    pub fn sample_count(&self) -> usize {
        self.samples_written
    }

    /// Interleave and write the given per-channel buffers.
    ///
    /// Channels are truncated to the shortest buffer so every written frame
    /// is complete.
    pub fn write_channels(&mut self, channels: &[Vec<f64>]) -> Result<(), TimestretchError> {
        let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
        for frame in 0..frames {
            for channel in channels {
                match self.sample_format {
                    SampleFormat::Int => {
                        self.writer.write_sample(f64_to_i16(channel[frame]))?
                    }
                    SampleFormat::Float => {
                        self.writer.write_sample(channel[frame] as f32)?
                    }
                }
            }
        }
        self.samples_written += frames;
        Ok(())
    }

    /// Finish the file, writing the final header
    pub fn finalize(self) -> Result<(), TimestretchError> {
        self.writer.finalize()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("timestretch-wave-test-{name}.wav"))
    }

    #[test]
    fn test_sample_conversion_round_trip() {
        assert_eq!(f64_to_i16(0.0), 0);
        assert_eq!(f64_to_i16(1.0), i16::MAX);
        assert_eq!(f64_to_i16(-1.0), i16::MIN);
        // Out of range clamps instead of wrapping
        assert_eq!(f64_to_i16(2.0), i16::MAX);
        assert_eq!(f64_to_i16(-2.0), i16::MIN);

        for &value in &[-0.75, -0.1, 0.0, 0.33, 0.9] {
            let round_tripped = i16_to_f64(f64_to_i16(value));
            assert!((round_tripped - value).abs() < 1.0 / 32000.0);
        }
    }

    #[test]
    fn test_missing_file_is_reported() {
        let result = WaveReader::open("/nonexistent/definitely-not-here.wav");
        assert!(matches!(result, Err(TimestretchError::MissingInput)));
    }

    #[test]
    fn test_write_and_read_round_trip_int16() {
        let path = temp_path("int16");
        let samples: Vec<f64> = (0..500).map(|i| ((i as f64) * 0.1).sin() * 0.8).collect();

        let mut writer =
            WaveWriter::create(&path, 1, 44100, 16, SampleFormat::Int).unwrap();
        writer.write_channels(&[samples.clone()]).unwrap();
        assert_eq!(writer.sample_count(), 500);
        writer.finalize().unwrap();

        let reader = WaveReader::open(&path).unwrap();
        assert_eq!(reader.sample_rate(), 44100);
        assert_eq!(reader.channels(), 1);
        assert_eq!(reader.sample_count(), 500);
        for (written, read) in samples.iter().zip(reader.channel(0)) {
            assert!((written - read).abs() < 1.0 / 32000.0);
        }

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_write_and_read_round_trip_float_stereo() {
        let path = temp_path("float-stereo");
        let left: Vec<f64> = (0..100).map(|i| i as f64 / 100.0).collect();
        let right: Vec<f64> = (0..100).map(|i| -(i as f64) / 100.0).collect();

        let mut writer =
            WaveWriter::create(&path, 2, 48000, 32, SampleFormat::Float).unwrap();
        writer.write_channels(&[left.clone(), right.clone()]).unwrap();
        writer.finalize().unwrap();

        let reader = WaveReader::open(&path).unwrap();
        assert_eq!(reader.channels(), 2);
        assert_eq!(reader.sample_count(), 100);
        assert!((reader.channel(0)[50] - left[50]).abs() < 1e-6);
        assert!((reader.channel(1)[50] - right[50]).abs() < 1e-6);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_unsupported_bit_depth_rejected() {
        let result = WaveWriter::create(temp_path("bad"), 1, 44100, 24, SampleFormat::Int);
        assert!(matches!(result, Err(TimestretchError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_read_range_clamps() {
        let path = temp_path("range");
        let samples: Vec<f64> = vec![0.5; 10];
        let mut writer =
            WaveWriter::create(&path, 1, 44100, 16, SampleFormat::Int).unwrap();
        writer.write_channels(&[samples]).unwrap();
        writer.finalize().unwrap();

        let reader = WaveReader::open(&path).unwrap();
        assert_eq!(reader.read_range(0, 5, 100).len(), 5);
        assert_eq!(reader.read_range(0, 50, 10).len(), 0);

        std::fs::remove_file(&path).ok();
    }
}

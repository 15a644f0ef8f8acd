//! The streaming contract shared by the audio processors
//!
//! Every processing stage (phase vocoder, resampler, low-pass filter, and
//! the trivial pass-through used when a stage is not configured) accepts
//! input in arbitrary chunks, makes output available as soon as it can, and
//! drains whatever remains on flush. The engine drives stages through this
//! trait so its routing code does not care which stage it is feeding.

use crate::error::TimestretchError;
use crate::low_pass_filter::LowPassFilter;
use crate::phase_vocoder::PhaseVocoder;
use crate::resampler::Resampler;
use crate::sample_buffer::SampleBuffer;

/// Submit / available / get / flush streaming quartet.
pub trait AudioStream {
    /// Submit input samples for processing
    fn submit_audio_data(&mut self, audio: &[f64]) -> Result<(), TimestretchError>;

    /// Number of output samples ready for retrieval
    fn output_samples_available(&self) -> usize;

    /// Retrieve up to `samples` output samples
    fn get_audio_data(&mut self, samples: usize) -> Vec<f64>;

    /// Finish processing and return all remaining output
    fn flush_audio_data(&mut self) -> Result<Vec<f64>, TimestretchError>;
}

/// Identity stage: output is input, unchanged.
#[derive(Debug, Default)]
pub struct PassThrough {
    buffer: SampleBuffer,
}

impl PassThrough {
    /// Create an empty pass-through stage
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioStream for PassThrough {
    fn submit_audio_data(&mut self, audio: &[f64]) -> Result<(), TimestretchError> {
        self.buffer.append(audio);
        Ok(())
    }

    fn output_samples_available(&self) -> usize {
        self.buffer.len()
    }

    fn get_audio_data(&mut self, samples: usize) -> Vec<f64> {
        self.buffer.retrieve_remove(samples)
    }

    fn flush_audio_data(&mut self) -> Result<Vec<f64>, TimestretchError> {
        Ok(self.buffer.retrieve_remove(self.buffer.len()))
    }
}

impl AudioStream for PhaseVocoder {
    fn submit_audio_data(&mut self, audio: &[f64]) -> Result<(), TimestretchError> {
        PhaseVocoder::submit_audio_data(self, audio)
    }

    fn output_samples_available(&self) -> usize {
        PhaseVocoder::output_samples_available(self)
    }

    fn get_audio_data(&mut self, samples: usize) -> Vec<f64> {
        PhaseVocoder::get_audio_data(self, samples)
    }

    fn flush_audio_data(&mut self) -> Result<Vec<f64>, TimestretchError> {
        PhaseVocoder::flush_audio_data(self)
    }
}

impl AudioStream for Resampler {
    fn submit_audio_data(&mut self, audio: &[f64]) -> Result<(), TimestretchError> {
        Resampler::submit_audio_data(self, audio);
        Ok(())
    }

    fn output_samples_available(&self) -> usize {
        Resampler::output_samples_available(self)
    }

    fn get_audio_data(&mut self, samples: usize) -> Vec<f64> {
        Resampler::get_audio_data(self, samples)
    }

    fn flush_audio_data(&mut self) -> Result<Vec<f64>, TimestretchError> {
        Ok(Resampler::flush_audio_data(self))
    }
}

impl AudioStream for LowPassFilter {
    fn submit_audio_data(&mut self, audio: &[f64]) -> Result<(), TimestretchError> {
        LowPassFilter::submit_audio_data(self, audio);
        Ok(())
    }

    fn output_samples_available(&self) -> usize {
        LowPassFilter::output_samples_available(self)
    }

    fn get_audio_data(&mut self, samples: usize) -> Vec<f64> {
        LowPassFilter::get_audio_data(self, samples)
    }

    fn flush_audio_data(&mut self) -> Result<Vec<f64>, TimestretchError> {
        Ok(LowPassFilter::flush_audio_data(self))
    }
}

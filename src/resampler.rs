//! Sample-rate conversion by upsample, low-pass filter, decimate
//!
//! The conversion ratio is realized as an integer pair L/M: insert L - 1
//! zeros between input samples, low-pass at 0.5 / max(L, M) of the upsampled
//! rate to suppress images and pre-alias, then keep every M-th sample. The
//! filter state persists across submissions so streaming stays
//! sample-accurate, and the decimation phase carries over as well.

use log::{debug, info};

use crate::error::TimestretchError;
use crate::low_pass_filter::LowPassFilter;
use crate::sample_buffer::SampleBuffer;
use crate::utils::math::rational_approximation;

/// Upper bound on the decimation factor when approximating an irrational
/// ratio (e.g. pitch-shift ratios) with a fraction.
const MAX_RATIO_DENOMINATOR: u64 = 256;

/// Streaming arbitrary-ratio resampler.
pub struct Resampler {
    input_sample_rate: u32,
    ratio: f64,
    upsample_factor: u64,
    decimate_factor: u64,
    // None when L == M and samples pass through untouched
    filter: Option<LowPassFilter>,
    decimation_phase: u64,
    output: SampleBuffer,
}

impl Resampler {
    /// Create a resampler for the given conversion ratio
    /// (output rate / input rate).
    pub fn new(input_sample_rate: u32, ratio: f64) -> Result<Self, TimestretchError> {
        if !(ratio > 0.0) || !ratio.is_finite() {
            return Err(TimestretchError::InvalidConfiguration(
                "resample ratio must be positive and finite",
            ));
        }

        let (upsample_factor, decimate_factor) =
            rational_approximation(ratio, MAX_RATIO_DENOMINATOR);

        let filter = if upsample_factor == decimate_factor {
            None
        } else {
            let cutoff = 0.5 / upsample_factor.max(decimate_factor) as f64;
            Some(LowPassFilter::new(cutoff)?)
        };

        info!(
            "resampler ratio {ratio:.6} realized as {upsample_factor}/{decimate_factor} \
             at {input_sample_rate} Hz input"
        );

        Ok(Self {
            input_sample_rate,
            ratio,
            upsample_factor,
            decimate_factor,
            filter,
            decimation_phase: 0,
            output: SampleBuffer::new(),
        })
    }

    /// The requested conversion ratio
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// The integer upsample factor L
    pub fn upsample_factor(&self) -> u64 {
        self.upsample_factor
    }

    /// The integer decimate factor M
    pub fn decimate_factor(&self) -> u64 {
        self.decimate_factor
    }

    /// The input sample rate this resampler was built for
    pub fn input_sample_rate(&self) -> u32 {
        self.input_sample_rate
    }

    /// Submit audio for rate conversion
    pub fn submit_audio_data(&mut self, audio: &[f64]) {
        let Some(filter) = self.filter.as_mut() else {
            self.output.append(audio);
            return;
        };

        // Zero-stuffing spreads each sample's energy over L output slots;
        // scaling by L restores the original level.
        let gain = self.upsample_factor as f64;
        let mut upsampled = Vec::with_capacity(audio.len() * self.upsample_factor as usize);
        for &sample in audio {
            upsampled.push(sample * gain);
            for _ in 1..self.upsample_factor {
                upsampled.push(0.0);
            }
        }

        filter.submit_audio_data(&upsampled);
        let filtered = filter.get_audio_data(filter.output_samples_available());
        self.decimate(&filtered);
    }

    /// Number of converted samples ready for retrieval
    pub fn output_samples_available(&self) -> usize {
        self.output.len()
    }

    /// Retrieve up to `samples` converted samples
    pub fn get_audio_data(&mut self, samples: usize) -> Vec<f64> {
        self.output.retrieve_remove(samples)
    }

    /// Drain the filter tail and return everything still buffered
    pub fn flush_audio_data(&mut self) -> Vec<f64> {
        if let Some(filter) = self.filter.as_mut() {
            let filtered = filter.flush_audio_data();
            self.decimate(&filtered);
        }
        self.output.retrieve_remove(self.output.len())
    }

    /// Clear all streaming state; the ratio and filter kernel stay intact
    pub fn reset(&mut self) {
        if let Some(filter) = self.filter.as_mut() {
            filter.reset();
        }
        self.decimation_phase = 0;
        self.output.clear();
    }

    fn decimate(&mut self, filtered: &[f64]) {
        debug!("decimating {} filtered samples (phase {})", filtered.len(), self.decimation_phase);
        for &sample in filtered {
            if self.decimation_phase == 0 {
                self.output.push_sample(sample);
            }
            self.decimation_phase = (self.decimation_phase + 1) % self.decimate_factor;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peak_frequency::generate_sine_wave;

    #[test]
    fn test_rejects_bad_ratio() {
        assert!(Resampler::new(44100, 0.0).is_err());
        assert!(Resampler::new(44100, -1.0).is_err());
        assert!(Resampler::new(44100, f64::NAN).is_err());
    }

    #[test]
    fn test_factor_selection() {
        let halving = Resampler::new(44100, 0.5).unwrap();
        assert_eq!((halving.upsample_factor(), halving.decimate_factor()), (1, 2));

        let cd_to_dat = Resampler::new(44100, 48000.0 / 44100.0).unwrap();
        assert_eq!((cd_to_dat.upsample_factor(), cd_to_dat.decimate_factor()), (160, 147));
    }

    #[test]
    fn test_unity_ratio_passes_through() {
        let mut resampler = Resampler::new(44100, 1.0).unwrap();
        let audio = vec![0.25, -0.5, 0.75];
        resampler.submit_audio_data(&audio);
        assert_eq!(resampler.get_audio_data(3), audio);
        assert!(resampler.flush_audio_data().is_empty());
    }

    #[test]
    fn test_halving_output_length() {
        let mut resampler = Resampler::new(44100, 0.5).unwrap();
        let input = generate_sine_wave(44100.0, 44100, 440.0, 0.0);
        resampler.submit_audio_data(&input);
        let mut output = resampler.get_audio_data(resampler.output_samples_available());
        output.extend(resampler.flush_audio_data());

        let expected = input.len() / 2;
        assert!(
            (output.len() as i64 - expected as i64).abs() <= 1,
            "length {} vs expected {expected}",
            output.len()
        );
    }

    #[test]
    fn test_dc_level_preserved_when_upsampling() {
        // Gain compensation for zero stuffing: a DC signal doubled in rate
        // keeps its level.
        let mut resampler = Resampler::new(22050, 2.0).unwrap();
        resampler.submit_audio_data(&vec![1.0; 2000]);
        let output = resampler.get_audio_data(resampler.output_samples_available());

        assert!(output.len() > 1000);
        // Skip the filter's warm-up edge
        for &sample in &output[500..output.len() - 500] {
            assert!((sample - 1.0).abs() < 1e-3, "DC drifted to {sample}");
        }
    }

    #[test]
    fn test_streaming_matches_single_shot() {
        let input = generate_sine_wave(44100.0, 4000, 440.0, 0.0);

        let mut single = Resampler::new(44100, 0.5).unwrap();
        single.submit_audio_data(&input);
        let mut single_output = single.get_audio_data(single.output_samples_available());
        single_output.extend(single.flush_audio_data());

        let mut chunked = Resampler::new(44100, 0.5).unwrap();
        let mut chunked_output = Vec::new();
        for chunk in input.chunks(700) {
            chunked.submit_audio_data(chunk);
            chunked_output.extend(chunked.get_audio_data(chunked.output_samples_available()));
        }
        chunked_output.extend(chunked.flush_audio_data());

        assert_eq!(single_output.len(), chunked_output.len());
        for (a, b) in single_output.iter().zip(&chunked_output) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let mut resampler = Resampler::new(44100, 0.5).unwrap();
        resampler.submit_audio_data(&vec![0.5; 500]);
        resampler.reset();
        assert_eq!(resampler.output_samples_available(), 0);

        resampler.submit_audio_data(&vec![0.5; 500]);
        assert!(resampler.output_samples_available() > 0);
    }
}

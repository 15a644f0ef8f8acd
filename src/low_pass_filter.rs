//! Windowed-sinc FIR low-pass filter with streaming submit/get semantics
//!
//! The kernel is a sinc truncated to `filter_length` taps, shaped by a
//! Blackman window and normalized for unity DC gain. It is computed once at
//! construction and reused for every convolution. Convolution is direct;
//! kernels stay short enough that an FFT-based path would not pay off here.

use log::debug;

use crate::error::TimestretchError;
use crate::sample_buffer::SampleBuffer;

/// Default number of filter taps
pub const DEFAULT_FILTER_LENGTH: usize = 100;

const MIN_CUTOFF_RATIO: f64 = 0.0001;
const MAX_CUTOFF_RATIO: f64 = 0.5;

/// Streaming windowed-sinc low-pass filter.
pub struct LowPassFilter {
    cutoff_ratio: f64,
    filter_length: usize,
    kernel: Vec<f64>,
    input: SampleBuffer,
    output: SampleBuffer,
}

impl LowPassFilter {
    /// Create a filter with the default tap count.
    ///
    /// `cutoff_ratio` is the cutoff frequency over the sample rate and must
    /// lie strictly between 0.0001 and 0.5. For example, keeping everything
    /// below 16 kHz in a 44.1 kHz signal takes a ratio of about 0.3628.
    pub fn new(cutoff_ratio: f64) -> Result<Self, TimestretchError> {
        Self::with_filter_length(cutoff_ratio, DEFAULT_FILTER_LENGTH)
    }

    /// Create a filter with an explicit tap count
    pub fn with_filter_length(
        cutoff_ratio: f64,
        filter_length: usize,
    ) -> Result<Self, TimestretchError> {
        if cutoff_ratio <= MIN_CUTOFF_RATIO || cutoff_ratio >= MAX_CUTOFF_RATIO {
            return Err(TimestretchError::CutoffOutOfRange(cutoff_ratio));
        }
        if filter_length < 2 {
            return Err(TimestretchError::InvalidConfiguration(
                "low-pass filter needs at least two taps",
            ));
        }

        let kernel = calculate_filter_kernel(cutoff_ratio, filter_length);
        debug!("low-pass filter ready: cutoff {cutoff_ratio}, {filter_length} taps");

        Ok(Self {
            cutoff_ratio,
            filter_length,
            kernel,
            input: SampleBuffer::new(),
            output: SampleBuffer::new(),
        })
    }

    /// The configured cutoff ratio
    pub fn cutoff_ratio(&self) -> f64 {
        self.cutoff_ratio
    }

    /// Minimum buffered input before any output can be produced. This equals
    /// the filter length.
    pub fn minimum_samples_needed_for_processing(&self) -> usize {
        self.filter_length
    }

    /// Submit audio for filtering
    pub fn submit_audio_data(&mut self, audio: &[f64]) {
        self.input.append(audio);
        self.process();
    }

    /// Number of filtered samples ready for retrieval
    pub fn output_samples_available(&self) -> usize {
        self.output.len()
    }

    /// Retrieve up to `samples` filtered samples
    pub fn get_audio_data(&mut self, samples: usize) -> Vec<f64> {
        self.output.retrieve_remove(samples)
    }

    /// Zero-pad the input to drain the filter tail and return everything
    /// still buffered.
    pub fn flush_audio_data(&mut self) -> Vec<f64> {
        let padding = vec![0.0; self.filter_length];
        self.submit_audio_data(&padding);
        self.input.clear();
        self.output.retrieve_remove(self.output.len())
    }

    /// Clear buffered audio; the kernel stays intact
    pub fn reset(&mut self) {
        self.input.clear();
        self.output.clear();
    }

    // Convolve every fully-covered input position, then drop the consumed
    // prefix keeping filter_length - 1 samples of history for continuity.
    fn process(&mut self) {
        let buffered = self.input.len();
        if buffered < self.filter_length {
            return;
        }

        let producible = buffered - self.filter_length + 1;
        let samples = self.input.samples();
        for position in 0..producible {
            let mut accumulator = 0.0;
            for (tap, &coefficient) in self.kernel.iter().enumerate() {
                accumulator += samples[position + tap] * coefficient;
            }
            self.output.push_sample(accumulator);
        }
        self.input.remove_front_samples(producible);
    }
}

// sinc(2 * fc * (i - centre)) shaped by a Blackman window, normalized so the
// coefficients sum to one.
fn calculate_filter_kernel(cutoff_ratio: f64, filter_length: usize) -> Vec<f64> {
    let centre = (filter_length - 1) as f64 / 2.0;
    let last = (filter_length - 1) as f64;

    let mut kernel: Vec<f64> = (0..filter_length)
        .map(|i| {
            let sinc_argument = 2.0 * cutoff_ratio * (i as f64 - centre);
            let blackman = 0.42
                - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / last).cos()
                + 0.08 * (4.0 * std::f64::consts::PI * i as f64 / last).cos();
            sinc(sinc_argument) * blackman
        })
        .collect();

    let sum: f64 = kernel.iter().sum();
    for coefficient in &mut kernel {
        *coefficient /= sum;
    }
    kernel
}

#[inline(always)]
fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        let scaled = std::f64::consts::PI * x;
        scaled.sin() / scaled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cutoff_validation() {
        assert!(matches!(LowPassFilter::new(0.0), Err(TimestretchError::CutoffOutOfRange(_))));
        assert!(matches!(LowPassFilter::new(0.5), Err(TimestretchError::CutoffOutOfRange(_))));
        assert!(matches!(LowPassFilter::new(0.6), Err(TimestretchError::CutoffOutOfRange(_))));
        assert!(LowPassFilter::new(0.25).is_ok());
    }

    #[test]
    fn test_kernel_is_dc_normalized() {
        let filter = LowPassFilter::new(0.1).unwrap();
        let sum: f64 = filter.kernel.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_output_availability_counts() {
        let mut filter = LowPassFilter::new(0.2).unwrap();

        filter.submit_audio_data(&vec![0.0; 50]);
        assert_eq!(filter.output_samples_available(), 0);

        filter.submit_audio_data(&vec![0.0; 100]);
        assert_eq!(filter.output_samples_available(), 51);
    }

    #[test]
    fn test_dc_passes_unchanged() {
        let mut filter = LowPassFilter::new(0.2).unwrap();
        filter.submit_audio_data(&vec![1.0; 400]);

        let output = filter.get_audio_data(filter.output_samples_available());
        assert_eq!(output.len(), 301);
        for sample in output {
            assert!((sample - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_nyquist_tone_is_attenuated() {
        let mut filter = LowPassFilter::new(0.05).unwrap();
        let alternating: Vec<f64> =
            (0..400).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        filter.submit_audio_data(&alternating);

        let output = filter.get_audio_data(filter.output_samples_available());
        for sample in output {
            assert!(sample.abs() < 1e-3, "Nyquist leak: {sample}");
        }
    }

    #[test]
    fn test_flush_drains_tail() {
        let mut filter = LowPassFilter::new(0.2).unwrap();
        filter.submit_audio_data(&vec![0.5; 150]);
        let streamed = filter.get_audio_data(filter.output_samples_available());

        let flushed = filter.flush_audio_data();
        assert_eq!(streamed.len() + flushed.len(), 151);
        assert_eq!(filter.output_samples_available(), 0);
    }

    #[test]
    fn test_reset_keeps_kernel() {
        let mut filter = LowPassFilter::new(0.2).unwrap();
        let kernel_before = filter.kernel.clone();

        filter.submit_audio_data(&vec![0.3; 200]);
        filter.reset();
        assert_eq!(filter.output_samples_available(), 0);
        assert_eq!(filter.kernel, kernel_before);

        // Still usable after reset
        filter.submit_audio_data(&vec![1.0; 200]);
        assert!(filter.output_samples_available() > 0);
    }
}

//! Time stretching through STFT analysis and resynthesis
//!
//! The vocoder consumes input frames at the analysis hop and writes
//! synthesized frames at the synthesis hop; the ratio of the two hops is the
//! stretch factor. Per bin, the heterodyned phase difference between
//! consecutive frames yields the true (sub-bin) frequency of whatever is in
//! that bin, and the synthesis phase is advanced by that frequency times the
//! synthesis hop. That keeps sinusoids phase-coherent across frames however
//! far apart the synthesis positions drift from the analysis positions.
//!
//! One vocoder instance handles one transient section; the engine creates a
//! fresh instance (zeroed phase history) at every transient so attacks are
//! not smeared by phase memory from before the onset.

use std::f64::consts::PI;

use log::debug;

use crate::error::TimestretchError;
use crate::fourier;
use crate::frequency_domain::{FrequencyBin, FrequencyDomain};
use crate::hann_window::{apply_window, hann_window};
use crate::peak_frequency::peak_frequency_by_quinn;
use crate::sample_buffer::SampleBuffer;
use crate::utils::math::previous_power_of_two;

/// FFT size used for sections at least this long
const DEFAULT_FFT_SIZE: usize = 4096;

/// Analysis hop is the FFT size over this (75% frame overlap)
const OVERLAP_FACTOR: usize = 4;

/// Smallest FFT the vocoder will run; sections shorter than this cannot be
/// stretched and the caller must handle them separately
pub const MIN_FFT_SIZE: usize = 4;

// Below this accumulated window energy a sample has no usable overlap-add
// contribution and is emitted as silence
const WINDOW_ENERGY_FLOOR: f64 = 1e-8;

// Bins quieter than this are not worth a sub-bin frequency estimate
const PEAK_LOCK_MAGNITUDE_FLOOR: f64 = 1e-6;

/// Wrap a phase into (-pi, pi]
#[inline(always)]
pub fn wrap_phase(phase_in: f64) -> f64 {
    if phase_in >= 0.0 {
        (phase_in + PI) % (2.0 * PI) - PI
    } else {
        (phase_in - PI) % (2.0 * PI) + PI
    }
}

/// Phase vocoder for one section of audio.
pub struct PhaseVocoder {
    sample_rate: usize,
    stretch_factor: f64,
    fft_size: usize,
    analysis_hop: usize,
    synthesis_hop: usize,
    window: Vec<f64>,

    // Per-bin state for k in 0..=N/2
    previous_phases: Vec<f64>,
    synthesis_phases: Vec<f64>,
    last_magnitudes: Vec<f64>,
    last_true_frequencies: Vec<f64>,

    // Overlap-add accumulator and the matching squared-window energy
    ola: Vec<f64>,
    ola_window_energy: Vec<f64>,

    input: SampleBuffer,
    output: SampleBuffer,
    samples_submitted: usize,
    total_finalized: usize,
    frames_processed: usize,
}

impl PhaseVocoder {
    /// Create a vocoder for a section of `section_length` samples to be
    /// stretched by `stretch_factor` (output length over input length).
    ///
    /// The FFT size defaults to 4096 and shrinks to the largest power of two
    /// that still fits the section, so every section of at least
    /// [`MIN_FFT_SIZE`] samples yields at least one analysis frame.
    pub fn new(
        sample_rate: usize,
        section_length: usize,
        stretch_factor: f64,
    ) -> Result<Self, TimestretchError> {
        if !(stretch_factor > 0.0) || !stretch_factor.is_finite() {
            return Err(TimestretchError::InvalidConfiguration(
                "stretch factor must be positive and finite",
            ));
        }
        if section_length == 0 {
            return Err(TimestretchError::InvalidConfiguration(
                "cannot stretch an empty section",
            ));
        }

        let fft_size = previous_power_of_two(section_length)
            .unwrap_or(MIN_FFT_SIZE)
            .clamp(MIN_FFT_SIZE, DEFAULT_FFT_SIZE);
        let analysis_hop = (fft_size / OVERLAP_FACTOR).max(1);
        let synthesis_hop = ((analysis_hop as f64 * stretch_factor).round() as usize).max(1);
        let half = fft_size / 2;

        debug!(
            "phase vocoder: section {section_length}, fft {fft_size}, \
             hops {analysis_hop} -> {synthesis_hop}"
        );

        Ok(Self {
            sample_rate,
            stretch_factor,
            fft_size,
            analysis_hop,
            synthesis_hop,
            window: hann_window(fft_size),
            previous_phases: vec![0.0; half + 1],
            synthesis_phases: vec![0.0; half + 1],
            last_magnitudes: vec![0.0; half + 1],
            last_true_frequencies: vec![0.0; half + 1],
            ola: vec![0.0; fft_size],
            ola_window_energy: vec![0.0; fft_size],
            input: SampleBuffer::new(),
            output: SampleBuffer::new(),
            samples_submitted: 0,
            total_finalized: 0,
            frames_processed: 0,
        })
    }

    /// The stretch factor this vocoder realizes
    pub fn stretch_factor(&self) -> f64 {
        self.stretch_factor
    }

    /// The FFT size chosen for this section
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Length of the crossfade tail retained between transient sections:
    /// the extent of the overlap-add region still pending after the last
    /// finalized sample, about one frame.
    pub fn transient_overlap_len(&self) -> usize {
        self.fft_size.saturating_sub(self.synthesis_hop)
    }

    /// Submit input samples, consuming as many full analysis frames as the
    /// staged input allows
    pub fn submit_audio_data(&mut self, audio: &[f64]) -> Result<(), TimestretchError> {
        self.input.append(audio);
        self.samples_submitted += audio.len();

        while self.input.len() >= self.fft_size {
            let frame = self.input.retrieve(self.fft_size);
            self.analyze_frame(&frame)?;
            self.render_frame()?;
            self.frames_processed += 1;
            self.input.remove_front_samples(self.analysis_hop);
        }
        Ok(())
    }

    /// Number of finalized output samples ready for retrieval
    pub fn output_samples_available(&self) -> usize {
        self.output.len()
    }

    /// Retrieve up to `samples` finalized output samples
    pub fn get_audio_data(&mut self, samples: usize) -> Vec<f64> {
        self.output.retrieve_remove(samples)
    }

    /// Finish the section: finalize the pending overlap-add region and, if
    /// the section's output target (round(input length * stretch factor)
    /// plus the crossfade tail) is still short, keep synthesizing frames
    /// from the last analysis spectrum with the phases still advancing.
    ///
    /// Returns every remaining output sample. If no frame was ever analyzed
    /// the result is empty and the caller decides whether that is an error.
    pub fn flush_audio_data(&mut self) -> Result<Vec<f64>, TimestretchError> {
        if self.frames_processed > 0 {
            let target = (self.samples_submitted as f64 * self.stretch_factor).round() as usize;
            let goal = target + self.transient_overlap_len();

            // Continuation frames land on the same synthesis grid and
            // overlap-add into the pending region, so the output stays
            // continuous across the end of the analyzed input
            while self.total_finalized + self.fft_size < goal {
                self.advance_phases();
                self.render_frame()?;
            }
            self.finalize_pending();
        }
        Ok(self.output.retrieve_remove(self.output.len()))
    }

    // Window, transform, and update the per-bin phase state from one input
    // frame.
    fn analyze_frame(&mut self, frame: &[f64]) -> Result<(), TimestretchError> {
        let mut windowed = frame.to_vec();
        apply_window(&mut windowed, &self.window);

        let mut spectrum = fourier::fft(&windowed)?;
        let half = self.fft_size / 2;
        let magnitudes = spectrum.magnitudes()[..=half].to_vec();
        let phases = spectrum.wrapped_phases()[..=half].to_vec();

        let first_frame = self.frames_processed == 0;
        for k in 0..=half {
            let bin_centre_frequency = 2.0 * PI * k as f64 / self.fft_size as f64;

            let true_frequency = if first_frame {
                bin_centre_frequency
            } else {
                let heterodyned = wrap_phase(
                    phases[k]
                        - self.previous_phases[k]
                        - self.analysis_hop as f64 * bin_centre_frequency,
                );
                bin_centre_frequency + heterodyned / self.analysis_hop as f64
            };

            self.previous_phases[k] = phases[k];
            self.last_magnitudes[k] = magnitudes[k];
            self.last_true_frequencies[k] = true_frequency;
        }

        // When actually stretching, lock spectral peaks to their sub-bin
        // frequency so their phase tracks propagate cleanly. At unity hop
        // ratio the heterodyned estimate already reproduces the input
        // phases exactly and must not be perturbed.
        if self.synthesis_hop != self.analysis_hop && !first_frame {
            self.lock_spectral_peaks(&magnitudes, &spectrum);
        }

        if first_frame {
            // Fresh phase history: the first synthesized frame reuses the
            // analysis phases verbatim
            self.synthesis_phases[..=half].copy_from_slice(&phases);
        } else {
            for k in 0..=half {
                self.synthesis_phases[k] = wrap_phase(
                    self.synthesis_phases[k]
                        + self.synthesis_hop as f64 * self.last_true_frequencies[k],
                );
            }
        }
        Ok(())
    }

    // Replace the phase-difference frequency estimate with Quinn's estimate
    // on bins that are local magnitude maxima.
    fn lock_spectral_peaks(&mut self, magnitudes: &[f64], spectrum: &FrequencyDomain) {
        let half = self.fft_size / 2;
        for k in 1..half {
            if magnitudes[k] <= PEAK_LOCK_MAGNITUDE_FLOOR
                || magnitudes[k] <= magnitudes[k - 1]
                || magnitudes[k] < magnitudes[k + 1]
            {
                continue;
            }

            let estimate =
                peak_frequency_by_quinn(k, spectrum, self.sample_rate as f64);
            let bin_offset = estimate * self.fft_size as f64 / self.sample_rate as f64 - k as f64;
            if bin_offset.is_finite() && bin_offset.abs() <= 1.0 {
                self.last_true_frequencies[k] =
                    2.0 * PI * estimate / self.sample_rate as f64;
            }
        }
    }

    // Advance the synthesis phases one hop without new analysis, used when
    // flushing past the end of the input.
    fn advance_phases(&mut self) {
        let half = self.fft_size / 2;
        for k in 0..=half {
            self.synthesis_phases[k] = wrap_phase(
                self.synthesis_phases[k]
                    + self.synthesis_hop as f64 * self.last_true_frequencies[k],
            );
        }
    }

    // Build the synthesis spectrum from the stored magnitudes and phases,
    // transform back, window, overlap-add, and finalize one synthesis hop of
    // output.
    fn render_frame(&mut self) -> Result<(), TimestretchError> {
        let size = self.fft_size;
        let half = size / 2;

        let mut bins = vec![FrequencyBin::new(0.0, 0.0); size];
        for k in 0..=half {
            let magnitude = self.last_magnitudes[k];
            let (sin, cos) = self.synthesis_phases[k].sin_cos();
            let bin = FrequencyBin::new(magnitude * cos, magnitude * sin);
            bins[k] = bin;
            if k > 0 && k < half {
                bins[size - k] = bin.conj();
            }
        }

        let spectrum = FrequencyDomain::from_bins(bins);
        let mut frame = fourier::inverse_fft(&spectrum)?;
        apply_window(&mut frame, &self.window);

        for i in 0..size {
            self.ola[i] += frame[i];
            self.ola_window_energy[i] += self.window[i] * self.window[i];
        }

        // Samples ahead of the next frame's write position are final now
        let hop = self.synthesis_hop;
        for i in 0..hop {
            let sample = if i < size && self.ola_window_energy[i] > WINDOW_ENERGY_FLOOR {
                self.ola[i] / self.ola_window_energy[i]
            } else {
                0.0
            };
            self.output.push_sample(sample);
        }
        self.total_finalized += hop;

        let shift = hop.min(size);
        self.ola.copy_within(shift.., 0);
        self.ola[size - shift..].fill(0.0);
        self.ola_window_energy.copy_within(shift.., 0);
        self.ola_window_energy[size - shift..].fill(0.0);
        Ok(())
    }

    // Emit the whole pending overlap-add region.
    fn finalize_pending(&mut self) {
        let size = self.fft_size;
        for i in 0..size {
            let sample = if self.ola_window_energy[i] > WINDOW_ENERGY_FLOOR {
                self.ola[i] / self.ola_window_energy[i]
            } else {
                0.0
            };
            self.output.push_sample(sample);
        }
        self.total_finalized += size;
        self.ola.fill(0.0);
        self.ola_window_energy.fill(0.0);
    }
}

//! Sub-bin peak frequency estimation using Quinn's second estimator
//!
//! A DFT only resolves frequency to the bin width (sample rate / N). Quinn's
//! second estimator interpolates the true peak frequency from the complex
//! values of the peak bin and its two neighbours, accurate to well under a
//! tenth of a percent for clean sinusoids.

use std::f64::consts::PI;

use crate::error::TimestretchError;
use crate::fourier;
use crate::frequency_domain::FrequencyDomain;

/// Estimate the frequency of the signal component peaking in `peak_bin`.
///
/// Falls back to the bin-centre frequency when the bin has no usable
/// neighbours (edge bins) or negligible energy.
pub fn peak_frequency_by_quinn(
    peak_bin: usize,
    spectrum: &FrequencyDomain,
    sample_rate: f64,
) -> f64 {
    let size = spectrum.len();
    let bin_centre = |bin: usize| bin as f64 * sample_rate / size as f64;

    if peak_bin == 0 || peak_bin + 1 >= size {
        return bin_centre(peak_bin);
    }

    let centre = spectrum.bin(peak_bin);
    let below = spectrum.bin(peak_bin - 1);
    let above = spectrum.bin(peak_bin + 1);

    let energy = centre.re * centre.re + centre.im * centre.im;
    if energy < 1e-24 {
        return bin_centre(peak_bin);
    }

    // alpha = Re(X[k +/- 1] * conj(X[k])) / |X[k]|^2
    let alpha_below = (below.re * centre.re + below.im * centre.im) / energy;
    let alpha_above = (above.re * centre.re + above.im * centre.im) / energy;
    if alpha_below == 1.0 || alpha_above == 1.0 {
        return bin_centre(peak_bin);
    }

    let delta_below = alpha_below / (1.0 - alpha_below);
    let delta_above = -alpha_above / (1.0 - alpha_above);

    let delta = (delta_above + delta_below) / 2.0 + tau(delta_above * delta_above)
        - tau(delta_below * delta_below);
    if !delta.is_finite() {
        return bin_centre(peak_bin);
    }

    (peak_bin as f64 + delta) * sample_rate / size as f64
}

/// Estimate the frequency peaking in `peak_bin` of a time-domain signal.
///
/// Runs the FFT internally; the signal length must be a power of two.
pub fn peak_frequency_of_signal(
    peak_bin: usize,
    time_domain: &[f64],
    sample_rate: f64,
) -> Result<f64, TimestretchError> {
    let spectrum = fourier::fft(time_domain)?;
    Ok(peak_frequency_by_quinn(peak_bin, &spectrum, sample_rate))
}

// Quinn's tau correction term
fn tau(x: f64) -> f64 {
    let root_two_thirds = (2.0f64 / 3.0).sqrt();
    0.25 * (3.0 * x * x + 6.0 * x + 1.0).ln()
        - (6.0f64.sqrt() / 24.0)
            * ((x + 1.0 - root_two_thirds) / (x + 1.0 + root_two_thirds)).ln()
}

/// Generate a sine wave test signal.
pub fn generate_sine_wave(
    sample_rate: f64,
    length_in_samples: usize,
    signal_frequency: f64,
    phase: f64,
) -> Vec<f64> {
    (0..length_in_samples)
        .map(|n| (2.0 * PI * signal_frequency * n as f64 / sample_rate + phase).sin())
        .collect()
}

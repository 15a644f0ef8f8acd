//! Discrete and fast Fourier transforms over real audio frames
//!
//! The naive DFT is the O(N^2) textbook definition and serves as the
//! correctness reference for small sizes. The FFT is an iterative in-place
//! radix-2 Cooley-Tukey and requires a power-of-two input length.

use std::f64::consts::PI;

use num_complex::Complex;

use crate::error::TimestretchError;
use crate::frequency_domain::FrequencyDomain;
use crate::utils::math::is_power_of_two;

/// Apply the discrete Fourier transform to a real signal of any length.
pub fn dft(time_domain: &[f64]) -> FrequencyDomain {
    let size = time_domain.len();
    let mut bins = Vec::with_capacity(size);
    for k in 0..size {
        let mut bin = Complex::new(0.0, 0.0);
        for (n, &sample) in time_domain.iter().enumerate() {
            let angle = -2.0 * PI * k as f64 * n as f64 / size as f64;
            bin += Complex::new(angle.cos(), angle.sin()) * sample;
        }
        bins.push(bin);
    }
    FrequencyDomain::from_bins(bins)
}

/// Apply the inverse discrete Fourier transform, returning the real part.
pub fn inverse_dft(frequency_domain: &FrequencyDomain) -> Vec<f64> {
    let size = frequency_domain.len();
    if size == 0 {
        return Vec::new();
    }
    let bins = frequency_domain.bins();
    let mut samples = Vec::with_capacity(size);
    for n in 0..size {
        let mut sum = Complex::new(0.0, 0.0);
        for (k, bin) in bins.iter().enumerate() {
            let angle = 2.0 * PI * k as f64 * n as f64 / size as f64;
            sum += bin * Complex::new(angle.cos(), angle.sin());
        }
        samples.push(sum.re / size as f64);
    }
    samples
}

/// Apply the fast Fourier transform to a real signal.
///
/// The input length must be a power of two.
pub fn fft(time_domain: &[f64]) -> Result<FrequencyDomain, TimestretchError> {
    let size = time_domain.len();
    if !is_power_of_two(size) {
        return Err(TimestretchError::InvalidFftSize(size));
    }

    let mut buffer: Vec<Complex<f64>> =
        time_domain.iter().map(|&sample| Complex::new(sample, 0.0)).collect();
    transform_in_place(&mut buffer, false);
    Ok(FrequencyDomain::from_bins(buffer))
}

/// Apply the inverse fast Fourier transform, returning the real part as
/// audio samples.
///
/// The frequency domain length must be a power of two.
pub fn inverse_fft(frequency_domain: &FrequencyDomain) -> Result<Vec<f64>, TimestretchError> {
    let size = frequency_domain.len();
    if !is_power_of_two(size) {
        return Err(TimestretchError::InvalidFftSize(size));
    }

    let mut buffer = frequency_domain.bins().to_vec();
    transform_in_place(&mut buffer, true);

    let scale = 1.0 / size as f64;
    Ok(buffer.iter().map(|bin| bin.re * scale).collect())
}

/// Iterative radix-2 Cooley-Tukey: bit-reversal permutation followed by
/// log2(N) butterfly stages. The inverse conjugates the twiddle factors;
/// the caller applies the 1/N scale.
fn transform_in_place(buffer: &mut [Complex<f64>], inverse: bool) {
    let size = buffer.len();
    if size <= 1 {
        return;
    }
    let bits = size.trailing_zeros();

    for i in 0..size {
        let j = (i.reverse_bits() >> (usize::BITS - bits)) as usize;
        if j > i {
            buffer.swap(i, j);
        }
    }

    let sign = if inverse { 1.0 } else { -1.0 };
    let mut span = 2;
    while span <= size {
        let angle = sign * 2.0 * PI / span as f64;
        let twiddle_step = Complex::new(angle.cos(), angle.sin());
        for start in (0..size).step_by(span) {
            let mut twiddle = Complex::new(1.0, 0.0);
            for offset in 0..span / 2 {
                let even = buffer[start + offset];
                let odd = buffer[start + offset + span / 2] * twiddle;
                buffer[start + offset] = even + odd;
                buffer[start + offset + span / 2] = even - odd;
                twiddle *= twiddle_step;
            }
        }
        span <<= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fft_rejects_non_power_of_two() {
        let result = fft(&[0.0; 1000]);
        assert!(matches!(result, Err(TimestretchError::InvalidFftSize(1000))));
    }

    #[test]
    fn test_impulse_has_flat_unit_spectrum() {
        let mut impulse = vec![0.0; 8];
        impulse[0] = 1.0;

        let mut spectrum = fft(&impulse).unwrap();
        for k in 0..8 {
            assert_relative_eq!(spectrum.magnitudes()[k], 1.0, epsilon = 1e-12);
            assert_relative_eq!(spectrum.wrapped_phases()[k], 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_fft_matches_dft() {
        let signal: Vec<f64> =
            (0..64).map(|n| (0.3 * n as f64).sin() + 0.5 * (0.11 * n as f64).cos()).collect();

        let fast = fft(&signal).unwrap();
        let slow = dft(&signal);
        for k in 0..64 {
            assert_relative_eq!(fast.bin(k).re, slow.bin(k).re, epsilon = 1e-9);
            assert_relative_eq!(fast.bin(k).im, slow.bin(k).im, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_fft_round_trip() {
        for exponent in 4..=12 {
            let size = 1usize << exponent;
            let signal: Vec<f64> = (0..size)
                .map(|n| (0.05 * n as f64).sin() * (1.0 - n as f64 / size as f64))
                .collect();
            let peak = signal.iter().fold(0.0f64, |acc, &x| acc.max(x.abs()));

            let spectrum = fft(&signal).unwrap();
            let restored = inverse_fft(&spectrum).unwrap();
            for (original, recovered) in signal.iter().zip(&restored) {
                assert!(
                    (original - recovered).abs() <= 1e-9 * peak,
                    "round trip diverged at size {size}"
                );
            }
        }
    }

    #[test]
    fn test_dft_round_trip_odd_length() {
        let signal: Vec<f64> = (0..10).map(|n| n as f64 / 10.0).collect();
        let restored = inverse_dft(&dft(&signal));
        for (original, recovered) in signal.iter().zip(&restored) {
            assert_relative_eq!(original, recovered, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_sine_lands_in_expected_bin() {
        let size = 256;
        let cycles = 16.0;
        let signal: Vec<f64> =
            (0..size).map(|n| (2.0 * PI * cycles * n as f64 / size as f64).sin()).collect();

        let mut spectrum = fft(&signal).unwrap();
        let magnitudes = spectrum.magnitudes();
        let peak_bin = magnitudes
            .iter()
            .take(size / 2)
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(k, _)| k)
            .unwrap();
        assert_eq!(peak_bin, 16);
    }
}

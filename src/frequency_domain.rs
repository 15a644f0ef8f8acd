//! Container for the frequency-domain representation of a signal

use std::f64::consts::PI;

use num_complex::Complex;

/// A single frequency bin: real and imaginary component of one DFT output.
pub type FrequencyBin = Complex<f64>;

/// Ordered frequency bins with cached magnitude and wrapped-phase views.
///
/// The derived views are guarded by a single dirty flag: any mutation flips
/// it, and the next read of either view rebuilds both.
#[derive(Debug, Clone, Default)]
pub struct FrequencyDomain {
    bins: Vec<FrequencyBin>,
    magnitudes: Vec<f64>,
    wrapped_phases: Vec<f64>,
    dirty: bool,
}

impl FrequencyDomain {
    /// Create an empty frequency domain
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a frequency domain owning the given bins
    pub fn from_bins(bins: Vec<FrequencyBin>) -> Self {
        Self { bins, magnitudes: Vec::new(), wrapped_phases: Vec::new(), dirty: true }
    }

    /// Number of frequency bins
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    /// True when no bins are present
    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Append a bin to the end
    pub fn push_bin(&mut self, bin: FrequencyBin) {
        self.bins.push(bin);
        self.dirty = true;
    }

    /// Replace the bin at `index`
    pub fn set_bin(&mut self, index: usize, bin: FrequencyBin) {
        self.bins[index] = bin;
        self.dirty = true;
    }

    /// The bin at `index`
    pub fn bin(&self, index: usize) -> FrequencyBin {
        self.bins[index]
    }

    /// Read-only view of all bins
    pub fn bins(&self) -> &[FrequencyBin] {
        &self.bins
    }

    /// Magnitudes sqrt(re^2 + im^2) of all bins
    pub fn magnitudes(&mut self) -> &[f64] {
        self.rebuild_caches();
        &self.magnitudes
    }

    /// Wrapped phases in (-pi, pi] of all bins
    pub fn wrapped_phases(&mut self) -> &[f64] {
        self.rebuild_caches();
        &self.wrapped_phases
    }

    /// Real components of all bins
    pub fn real_components(&self) -> Vec<f64> {
        self.bins.iter().map(|bin| bin.re).collect()
    }

    /// Imaginary components of all bins
    pub fn imaginary_components(&self) -> Vec<f64> {
        self.bins.iter().map(|bin| bin.im).collect()
    }

    fn rebuild_caches(&mut self) {
        if !self.dirty && self.magnitudes.len() == self.bins.len() {
            return;
        }
        self.magnitudes.clear();
        self.wrapped_phases.clear();
        self.magnitudes.extend(self.bins.iter().map(|bin| (bin.re * bin.re + bin.im * bin.im).sqrt()));
        self.wrapped_phases.extend(self.bins.iter().map(|bin| wrapped_phase(bin.re, bin.im)));
        self.dirty = false;
    }
}

/// Quadrant-classified arctangent returning a phase in (-pi, pi].
///
/// The real axis maps to 0 (re >= 0) or pi (re < 0), the imaginary axis to
/// +/- pi/2, and the origin to 0.
pub fn wrapped_phase(re: f64, im: f64) -> f64 {
    if re == 0.0 && im == 0.0 {
        return 0.0;
    }
    if re == 0.0 {
        return if im > 0.0 { PI / 2.0 } else { -PI / 2.0 };
    }
    if im == 0.0 {
        return if re > 0.0 { 0.0 } else { PI };
    }

    if re > 0.0 && im > 0.0 {
        // Quadrant 1
        (im / re).atan()
    } else if re < 0.0 && im > 0.0 {
        // Quadrant 2
        PI - (im / -re).atan()
    } else if re < 0.0 && im < 0.0 {
        // Quadrant 3
        -PI + (-im / -re).atan()
    } else {
        // Quadrant 4
        -((-im / re).atan())
    }
}

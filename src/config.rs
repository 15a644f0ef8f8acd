//! Configuration for the stretch engine

use std::path::PathBuf;

use crate::error::TimestretchError;

/// Default transient sensitivity: required growth from valley to peak
pub const DEFAULT_VALLEY_TO_PEAK_RATIO: f64 = 1.5;

/// Everything the engine needs to know about one processing run.
///
/// At least one of `stretch_factor`, `pitch_shift_semitones`,
/// `resample_rate_hz` or a registered transient callback must be present for
/// a run to do anything. When `output_file` is absent the run is
/// transient-reporting only.
#[derive(Debug, Clone, PartialEq)]
pub struct StretchConfig {
    /// Input wave file (mandatory)
    pub input_file: PathBuf,
    /// Output wave file; absent for transient-reporting runs
    pub output_file: Option<PathBuf>,
    /// Output duration over input duration; must be positive
    pub stretch_factor: Option<f64>,
    /// Pitch shift in equal-tempered semitones, positive raising pitch
    pub pitch_shift_semitones: Option<f64>,
    /// Output sample rate target in Hz
    pub resample_rate_hz: Option<u32>,
    /// Transient detection sensitivity (see `TransientDetector`)
    pub valley_to_peak_ratio: f64,
    /// Read transient positions from this file instead of detecting them
    pub transient_config_file: Option<PathBuf>,
}

impl StretchConfig {
    /// Configuration for the given input file with nothing else requested
    pub fn new(input_file: impl Into<PathBuf>) -> Self {
        Self {
            input_file: input_file.into(),
            output_file: None,
            stretch_factor: None,
            pitch_shift_semitones: None,
            resample_rate_hz: None,
            valley_to_peak_ratio: DEFAULT_VALLEY_TO_PEAK_RATIO,
            transient_config_file: None,
        }
    }

    /// Check parameter ranges
    pub fn validate(&self) -> Result<(), TimestretchError> {
        if let Some(stretch_factor) = self.stretch_factor {
            if !(stretch_factor > 0.0) || !stretch_factor.is_finite() {
                return Err(TimestretchError::InvalidConfiguration(
                    "stretch factor must be positive and finite",
                ));
            }
        }
        if let Some(semitones) = self.pitch_shift_semitones {
            if !semitones.is_finite() {
                return Err(TimestretchError::InvalidConfiguration(
                    "pitch shift must be finite",
                ));
            }
        }
        if let Some(rate) = self.resample_rate_hz {
            if rate == 0 {
                return Err(TimestretchError::InvalidConfiguration(
                    "resample rate must be positive",
                ));
            }
        }
        if !(self.valley_to_peak_ratio > 0.0) {
            return Err(TimestretchError::InvalidConfiguration(
                "valley-to-peak ratio must be positive",
            ));
        }
        Ok(())
    }

    /// True when a stretch factor was given
    pub fn stretch_requested(&self) -> bool {
        self.stretch_factor.is_some()
    }

    /// True when a pitch shift was given
    pub fn pitch_shift_requested(&self) -> bool {
        self.pitch_shift_semitones.is_some()
    }

    /// True when an output rate target was given
    pub fn resample_requested(&self) -> bool {
        self.resample_rate_hz.is_some()
    }

    /// The frequency ratio of the requested pitch shift: 2^(semitones / 12),
    /// 1.0 when no shift was requested
    pub fn pitch_shift_ratio(&self) -> f64 {
        match self.pitch_shift_semitones {
            Some(semitones) => 2.0f64.powf(semitones / 12.0),
            None => 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StretchConfig::new("in.wav");
        assert!(config.validate().is_ok());
        assert!(!config.stretch_requested());
        assert!(!config.pitch_shift_requested());
        assert!(!config.resample_requested());
        assert_eq!(config.valley_to_peak_ratio, 1.5);
        assert_eq!(config.pitch_shift_ratio(), 1.0);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = StretchConfig::new("in.wav");
        config.stretch_factor = Some(0.0);
        assert!(config.validate().is_err());

        let mut config = StretchConfig::new("in.wav");
        config.resample_rate_hz = Some(0);
        assert!(config.validate().is_err());

        let mut config = StretchConfig::new("in.wav");
        config.valley_to_peak_ratio = -1.0;
        assert!(config.validate().is_err());

        let mut config = StretchConfig::new("in.wav");
        config.pitch_shift_semitones = Some(f64::NAN);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pitch_shift_ratio() {
        let mut config = StretchConfig::new("in.wav");
        config.pitch_shift_semitones = Some(12.0);
        assert!((config.pitch_shift_ratio() - 2.0).abs() < 1e-12);

        config.pitch_shift_semitones = Some(-12.0);
        assert!((config.pitch_shift_ratio() - 0.5).abs() < 1e-12);

        config.pitch_shift_semitones = Some(1.0);
        assert!((config.pitch_shift_ratio() - 1.059463).abs() < 1e-5);
    }
}

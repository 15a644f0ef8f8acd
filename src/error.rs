//! Error types for the time-stretching engine

use std::fmt;

/// Errors that can occur while configuring or running the pipeline
#[derive(Debug)]
pub enum TimestretchError {
    /// No input file was given, or it does not exist
    MissingInput,
    /// The wave file header violates an invariant (format, bit depth, ...)
    UnsupportedFormat(String),
    /// A non-power-of-two length was passed to the FFT
    InvalidFftSize(usize),
    /// Low-pass cutoff ratio outside the open interval (0.0001, 0.5)
    CutoffOutOfRange(f64),
    /// A phase vocoder flush was asked for more samples than it can produce
    FlushUnderrun { needed: usize, available: usize },
    /// The pipeline was invoked with no stretch, pitch shift, resample or
    /// transient callback configured
    NoActionConfigured,
    /// Configuration parameters are invalid
    InvalidConfiguration(&'static str),
    /// Underlying I/O failure
    Io(std::io::Error),
    /// Wave container failure reported by hound
    Wave(hound::Error),
}

impl fmt::Display for TimestretchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestretchError::MissingInput => {
                write!(f, "No input audio file given")
            }
            TimestretchError::UnsupportedFormat(detail) => {
                write!(f, "Unsupported wave format: {detail}")
            }
            TimestretchError::InvalidFftSize(size) => {
                write!(f, "FFT input length {size} is not a power of two")
            }
            TimestretchError::CutoffOutOfRange(ratio) => {
                write!(f, "Low-pass cutoff ratio {ratio} is outside (0.0001, 0.5)")
            }
            TimestretchError::FlushUnderrun { needed, available } => {
                write!(f, "Flushed output has {available} samples but {needed} are still needed")
            }
            TimestretchError::NoActionConfigured => {
                write!(f, "No stretch, pitch shift, resample or transient callback configured")
            }
            TimestretchError::InvalidConfiguration(detail) => {
                write!(f, "Invalid configuration: {detail}")
            }
            TimestretchError::Io(err) => write!(f, "I/O error: {err}"),
            TimestretchError::Wave(err) => write!(f, "Wave file error: {err}"),
        }
    }
}

impl std::error::Error for TimestretchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TimestretchError::Io(err) => Some(err),
            TimestretchError::Wave(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TimestretchError {
    fn from(err: std::io::Error) -> Self {
        TimestretchError::Io(err)
    }
}

impl From<hound::Error> for TimestretchError {
    fn from(err: hound::Error) -> Self {
        TimestretchError::Wave(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = TimestretchError::InvalidFftSize(1000);
        assert!(err.to_string().contains("1000"));

        let err = TimestretchError::FlushUnderrun { needed: 512, available: 100 };
        assert!(err.to_string().contains("512"));
        assert!(err.to_string().contains("100"));
    }

    #[test]
    fn test_io_source_preserved() {
        use std::error::Error;

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = TimestretchError::from(io);
        assert!(err.source().is_some());
    }
}

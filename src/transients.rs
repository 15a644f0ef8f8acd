//! Harvesting transient positions for a whole input
//!
//! Positions either come from the streaming detector, fed chunk by chunk
//! over the full signal, or from a plain-text config file holding one
//! 0-based ascending sample index per line (blank lines and `#` comments
//! ignored). Either way an optional callback is invoked once per position
//! as it is finalized.

use std::fs;
use std::path::Path;

use log::{debug, info};

use crate::error::TimestretchError;
use crate::transient_detector::TransientDetector;

const DETECTION_CHUNK_SIZE: usize = 4096;

/// The transient positions of one signal, in ascending order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transients {
    positions: Vec<usize>,
}

impl Transients {
    /// Run the detector over the whole signal
    pub fn detect(
        samples: &[f64],
        sample_rate: usize,
        valley_to_peak_ratio: f64,
        mut callback: Option<&mut dyn FnMut(usize)>,
    ) -> Self {
        let mut detector = TransientDetector::new(sample_rate);
        detector.set_valley_to_peak_ratio(valley_to_peak_ratio);

        let mut positions = Vec::new();
        for chunk in samples.chunks(DETECTION_CHUNK_SIZE) {
            for position in detector.find_transients(chunk) {
                debug!("transient at sample {position}");
                if let Some(callback) = callback.as_mut() {
                    callback(position);
                }
                positions.push(position);
            }
        }

        info!("detected {} transient(s)", positions.len());
        Self { positions }
    }

    /// Read precomputed positions from a config file
    pub fn from_config_file(
        path: &Path,
        mut callback: Option<&mut dyn FnMut(usize)>,
    ) -> Result<Self, TimestretchError> {
        let content = fs::read_to_string(path)?;

        let mut positions = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let position: usize = line.parse().map_err(|_| {
                TimestretchError::InvalidConfiguration(
                    "transient config lines must be sample indices",
                )
            })?;
            if let Some(&previous) = positions.last() {
                if position <= previous {
                    return Err(TimestretchError::InvalidConfiguration(
                        "transient config positions must be strictly ascending",
                    ));
                }
            }
            if let Some(callback) = callback.as_mut() {
                callback(position);
            }
            positions.push(position);
        }

        info!("loaded {} transient(s) from {}", positions.len(), path.display());
        Ok(Self { positions })
    }

    /// The harvested positions
    pub fn positions(&self) -> &[usize] {
        &self.positions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp_config(name: &str, content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("timestretch-transients-{name}.txt"));
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_detection_with_callback() {
        let mut audio = vec![0.0; 44100];
        audio[9000] = 0.9;

        let mut reported = Vec::new();
        let mut callback = |position: usize| reported.push(position);
        let transients = Transients::detect(&audio, 44100, 1.5, Some(&mut callback));

        assert_eq!(transients.positions(), reported.as_slice());
        assert!(!transients.positions().is_empty());
    }

    #[test]
    fn test_silence_has_no_transients() {
        let audio = vec![0.0; 44100];
        let transients = Transients::detect(&audio, 44100, 1.5, None);
        assert!(transients.positions().is_empty());
    }

    #[test]
    fn test_config_file_parsing() {
        let path = write_temp_config(
            "good",
            "# leading comment\n0\n4410\n\n8820\n  13230  \n",
        );
        let transients = Transients::from_config_file(&path, None).unwrap();
        assert_eq!(transients.positions(), &[0, 4410, 8820, 13230]);
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_config_file_must_ascend() {
        let path = write_temp_config("descending", "100\n50\n");
        assert!(Transients::from_config_file(&path, None).is_err());
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_config_file_rejects_garbage() {
        let path = write_temp_config("garbage", "100\nnot-a-number\n");
        assert!(Transients::from_config_file(&path, None).is_err());
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_config_file_is_io_error() {
        let result =
            Transients::from_config_file(Path::new("/nonexistent/transients.txt"), None);
        assert!(matches!(result, Err(TimestretchError::Io(_))));
    }
}

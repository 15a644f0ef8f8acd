//! Transient detection through a three-level peak/valley cascade
//!
//! A transient is the short high-amplitude event at a perceptual onset: a
//! drum hit, a plucked string, a consonant. The detector scans per-step
//! amplitude maxima at a coarse step to find candidate peaks, confirms them
//! against the preceding valley, then re-scans the confirmed region twice at
//! finer steps. The finest-level valley position is the reported transient.
//!
//! The detector is streaming: feed it audio in arbitrary chunks and it
//! reports absolute sample positions as they are confirmed, retaining up to
//! one second of past audio so peaks straddling chunk boundaries are not
//! lost.

use log::debug;

use crate::peak_and_valley::PeakAndValley;
use crate::sample_buffer::SampleBuffer;

const DEFAULT_FIRST_LEVEL_STEP_MILLISECONDS: f64 = 11.60998; // 512 samples at 44.1 kHz
const DEFAULT_SECOND_LEVEL_STEP_MILLISECONDS: f64 = 5.80499; // 256 samples at 44.1 kHz
const DEFAULT_THIRD_LEVEL_STEP_MILLISECONDS: f64 = 0.725623; // 32 samples at 44.1 kHz

const DEFAULT_VALLEY_TO_PEAK_GROWTH_RATIO: f64 = 1.5;
const DEFAULT_MIN_PEAK_LEVEL: f64 = 0.1;
const SECONDS_OF_PAST_AUDIO_TO_RETAIN: usize = 1;

/// Which cascade level a step setting applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanLevel {
    First,
    Second,
    Third,
}

/// Streaming three-level transient detector.
pub struct TransientDetector {
    sample_rate: usize,

    first_level_step_milliseconds: f64,
    second_level_step_milliseconds: f64,
    third_level_step_milliseconds: f64,
    first_level_step_size: usize,
    second_level_step_size: usize,
    third_level_step_size: usize,

    // Confirmation thresholds
    min_valley_to_peak_growth_ratio: f64,
    min_peak_level: f64,

    input: SampleBuffer,
    transients_found: bool,
    last_transient_position: usize,
    input_samples_processed: usize,
    samples_of_past_audio_to_retain: usize,
    first_level_peak_positions: Vec<usize>,
}

impl TransientDetector {
    /// Create a detector for audio at the given sample rate (e.g. 44100)
    pub fn new(sample_rate: usize) -> Self {
        let step = |milliseconds: f64| {
            (sample_rate as f64 * (milliseconds / 1000.0) + 0.5) as usize
        };
        Self {
            sample_rate,
            first_level_step_milliseconds: DEFAULT_FIRST_LEVEL_STEP_MILLISECONDS,
            second_level_step_milliseconds: DEFAULT_SECOND_LEVEL_STEP_MILLISECONDS,
            third_level_step_milliseconds: DEFAULT_THIRD_LEVEL_STEP_MILLISECONDS,
            first_level_step_size: step(DEFAULT_FIRST_LEVEL_STEP_MILLISECONDS),
            second_level_step_size: step(DEFAULT_SECOND_LEVEL_STEP_MILLISECONDS),
            third_level_step_size: step(DEFAULT_THIRD_LEVEL_STEP_MILLISECONDS),
            min_valley_to_peak_growth_ratio: DEFAULT_VALLEY_TO_PEAK_GROWTH_RATIO,
            min_peak_level: DEFAULT_MIN_PEAK_LEVEL,
            input: SampleBuffer::new(),
            transients_found: false,
            last_transient_position: 0,
            input_samples_processed: 0,
            samples_of_past_audio_to_retain: sample_rate * SECONDS_OF_PAST_AUDIO_TO_RETAIN,
            first_level_peak_positions: Vec::new(),
        }
    }

    /// Find transients in the given audio, appended to any audio already
    /// buffered. Returns absolute sample positions (from the start of the
    /// session) of transients confirmed by this call, possibly none.
    pub fn find_transients(&mut self, audio_input: &[f64]) -> Vec<usize> {
        // First make sure we're not retaining too much past audio
        self.discard_old_audio();

        self.input.append(audio_input);

        let mut transients = Vec::new();

        // We need a minimum number of samples before any audio can be processed
        if self.input.len() < self.first_level_step_size + self.look_ahead_sample_count() {
            return transients;
        }

        // No sense looking for peaks in silence
        if self.check_for_all_silence() {
            return transients;
        }

        self.scan_for_transients(&mut transients);
        transients
    }

    /// The ratio of valley-to-peak growth required for a peak. Default 1.5.
    pub fn valley_to_peak_ratio(&self) -> f64 {
        self.min_valley_to_peak_growth_ratio
    }

    /// Set the required valley-to-peak growth ratio
    pub fn set_valley_to_peak_ratio(&mut self, ratio: f64) {
        self.min_valley_to_peak_growth_ratio = ratio;
    }

    /// The minimum amplitude for a sample to qualify as a peak. Default 0.1.
    pub fn minimum_peak_level(&self) -> f64 {
        self.min_peak_level
    }

    /// Set the minimum peak amplitude
    pub fn set_minimum_peak_level(&mut self, level: f64) {
        self.min_peak_level = level;
    }

    /// The step setting for a level, in milliseconds
    pub fn step(&self, level: ScanLevel) -> f64 {
        match level {
            ScanLevel::First => self.first_level_step_milliseconds,
            ScanLevel::Second => self.second_level_step_milliseconds,
            ScanLevel::Third => self.third_level_step_milliseconds,
        }
    }

    /// The step setting for a level, in samples
    pub fn step_in_samples(&self, level: ScanLevel) -> usize {
        match level {
            ScanLevel::First => self.first_level_step_size,
            ScanLevel::Second => self.second_level_step_size,
            ScanLevel::Third => self.third_level_step_size,
        }
    }

    /// Set a level's step in milliseconds
    pub fn set_step(&mut self, milliseconds: f64, level: ScanLevel) {
        let samples = (self.sample_rate as f64 * (milliseconds / 1000.0) + 0.5) as usize;
        match level {
            ScanLevel::First => {
                self.first_level_step_milliseconds = milliseconds;
                self.first_level_step_size = samples;
            }
            ScanLevel::Second => {
                self.second_level_step_milliseconds = milliseconds;
                self.second_level_step_size = samples;
            }
            ScanLevel::Third => {
                self.third_level_step_milliseconds = milliseconds;
                self.third_level_step_size = samples;
            }
        }
    }

    /// Set a level's step in samples
    pub fn set_step_in_samples(&mut self, samples: usize, level: ScanLevel) {
        let milliseconds = samples as f64 / self.sample_rate as f64 * 1000.0;
        match level {
            ScanLevel::First => {
                self.first_level_step_size = samples;
                self.first_level_step_milliseconds = milliseconds;
            }
            ScanLevel::Second => {
                self.second_level_step_size = samples;
                self.second_level_step_milliseconds = milliseconds;
            }
            ScanLevel::Third => {
                self.third_level_step_size = samples;
                self.third_level_step_milliseconds = milliseconds;
            }
        }
    }

    /// How far past the nominal scan range the detector reads to confirm a
    /// peak near the end of the given audio
    pub fn look_ahead_sample_count(&self) -> usize {
        3 * self.first_level_step_size
    }

    /// First-level peak positions confirmed so far (absolute)
    pub fn first_level_peak_positions(&self) -> &[usize] {
        &self.first_level_peak_positions
    }

    /// Per-step amplitude maxima of the given audio at the first-level step,
    /// the curve the first-level scan walks
    pub fn first_step_values(&self, audio_input: &[f64]) -> Vec<f64> {
        audio_input.chunks(self.first_level_step_size).map(max_sample).collect()
    }

    /// Clear all state to start detection on fresh audio
    pub fn reset(&mut self) {
        self.input.clear();
        self.transients_found = false;
        self.last_transient_position = 0;
        self.input_samples_processed = 0;
        self.first_level_peak_positions.clear();
    }

    // Drop buffered audio beyond the retention window, advancing the
    // processed-samples counter to keep positions absolute.
    fn discard_old_audio(&mut self) {
        if self.input.len() > self.samples_of_past_audio_to_retain {
            let samples_to_remove = self.input.len() - self.samples_of_past_audio_to_retain;
            self.input.remove_front_samples(samples_to_remove);
            self.input_samples_processed += samples_to_remove;
        }
    }

    // When everything up to the look-ahead boundary is silent, drop it and
    // report that there is nothing to scan yet.
    fn check_for_all_silence(&mut self) -> bool {
        let sample_count = self.input.len() - self.look_ahead_sample_count();
        let samples = self.input.samples();
        for i in 0..sample_count {
            if samples[i].abs() > 0.0 {
                return false;
            }
        }

        self.input.remove_front_samples(sample_count);
        self.input_samples_processed += sample_count;
        true
    }

    fn scan_for_transients(&mut self, transients: &mut Vec<usize>) {
        // The very first transient is a special case: it sits at the first
        // audible sample.
        if !self.transients_found {
            if let Some(position) = self.find_first_audible_sample() {
                let transient_position = position + self.input_samples_processed;
                transients.push(transient_position);
                self.last_transient_position = transient_position;
                self.transients_found = true;
                debug!("first transient at sample {transient_position}");
            } else {
                return;
            }
        }

        let first_step = self.first_level_step_size;
        let mut peak_and_valley = PeakAndValley::new(0, first_step);
        while get_peak_and_valley(
            self.input.samples(),
            first_step,
            self.min_peak_level,
            self.min_valley_to_peak_growth_ratio,
            &mut peak_and_valley,
        ) {
            let transient_position =
                self.input_samples_processed + self.refine_transient_position(&peak_and_valley);

            // Suppress transients crowding the previous one
            if !self.transients_found
                || self.last_transient_position + 3 * first_step <= transient_position
            {
                self.first_level_peak_positions
                    .push(self.input_samples_processed + peak_and_valley.peak_sample_position());
                transients.push(transient_position);
                self.last_transient_position = transient_position;
                self.transients_found = true;
                debug!("transient confirmed at sample {transient_position}");
            }

            // Drop the scanned audio through the confirmed peak
            let consumed = peak_and_valley.peak_sample_position() + first_step;
            self.input.remove_front_samples(consumed);
            self.input_samples_processed += consumed;
            peak_and_valley.reset(0, first_step);
        }
    }

    // Position of the first sample with any audible energy
    fn find_first_audible_sample(&self) -> Option<usize> {
        self.input.samples().iter().position(|sample| sample.abs() > 0.0)
    }

    // Refine a confirmed first-level peak downward through the second and
    // third scan levels; the third-level valley is the transient position
    // (relative to the current input buffer).
    fn refine_transient_position(&self, first_level: &PeakAndValley) -> usize {
        let first_step = self.first_level_step_size;

        let second_level_start = first_level.valley_sample_position();
        let second_level_length = first_level
            .peak_sample_position()
            .saturating_sub(first_level.valley_sample_position())
            + 2 * first_step;
        let second_level_audio = self.input.retrieve_from(second_level_start, second_level_length);

        let mut second_level = PeakAndValley::new(0, self.second_level_step_size);
        get_peak_and_valley(
            &second_level_audio,
            self.second_level_step_size,
            self.min_peak_level,
            self.min_valley_to_peak_growth_ratio,
            &mut second_level,
        );

        let third_level_start =
            first_level.valley_sample_position() + second_level.valley_sample_position();
        let third_level_length = second_level
            .peak_sample_position()
            .saturating_sub(second_level.valley_sample_position())
            + first_step;
        let third_level_audio = self.input.retrieve_from(third_level_start, third_level_length);

        let mut third_level = PeakAndValley::new(0, self.third_level_step_size);
        get_peak_and_valley(
            &third_level_audio,
            self.third_level_step_size,
            self.min_peak_level,
            self.min_valley_to_peak_growth_ratio,
            &mut third_level,
        );

        third_level_start + third_level.valley_sample_position()
    }
}

// Largest absolute sample value in the slice; silence for an empty slice
fn max_sample(samples: &[f64]) -> f64 {
    samples.iter().fold(0.0, |max, &sample| max.max(sample.abs()))
}

#[inline(always)]
fn sample_is_peak(centre: f64, left: f64, right: f64) -> bool {
    centre > left && centre >= right
}

#[inline(always)]
fn meets_peak_requirements(
    peak_value: f64,
    valley_value: f64,
    min_peak_level: f64,
    min_growth_ratio: f64,
) -> bool {
    let growth_ratio = (peak_value - valley_value) / valley_value;
    peak_value > min_peak_level && growth_ratio > min_growth_ratio
}

// Slide a three-point window over per-step amplitude maxima looking for a
// qualifying peak. Returns true when one is found, with the peak and the
// preceding valley recorded in `peak_and_valley`. The valley tracks the
// minimum step-max seen since the last disqualified peak.
fn get_peak_and_valley(
    audio: &[f64],
    step_size: usize,
    min_peak_level: f64,
    min_growth_ratio: f64,
    peak_and_valley: &mut PeakAndValley,
) -> bool {
    // To find a peak, we need to analyze at least 3 data points
    if step_size == 0 || audio.len() < 3 * step_size {
        return false;
    }

    let step_max = |offset: usize| max_sample(&audio[offset..(offset + step_size).min(audio.len())]);

    let mut sample_counter = 0;
    let mut left = step_max(sample_counter);
    peak_and_valley.push_plotted_point(left);
    sample_counter += step_size;

    let mut centre = step_max(sample_counter);
    peak_and_valley.push_plotted_point(centre);
    sample_counter += step_size;

    let mut valley_sample_position: usize = 0;
    let mut valley_value = left;

    while audio.len() - sample_counter >= step_size {
        let right = step_max(sample_counter);
        peak_and_valley.push_plotted_point(right);

        if sample_is_peak(centre, left, right) {
            if meets_peak_requirements(centre, valley_value, min_peak_level, min_growth_ratio) {
                // We're one step past the centre (peak) sample here
                peak_and_valley.set_peak_sample_position(sample_counter - step_size);
                peak_and_valley
                    .set_valley_sample_position(valley_sample_position.saturating_sub(step_size));
                return true;
            }

            // A peak, but not a qualifying one: restart the valley here
            valley_value = centre;
            valley_sample_position = sample_counter;
        } else if valley_value >= centre {
            valley_value = centre;
            valley_sample_position = sample_counter;
        }

        sample_counter += step_size;
        left = centre;
        centre = right;
    }

    false
}

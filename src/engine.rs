//! End-to-end orchestration of stretching, pitch shifting and resampling
//!
//! The engine reads a wave file, harvests transient positions (detected or
//! loaded from a config file), and processes the audio one transient
//! section at a time: a fresh phase vocoder per section so each onset
//! starts with clean phase history, a linear crossfade stitching adjacent
//! sections together, and an optional resampling stage at the end of the
//! chain. Pitch shifting is stretch-then-resample: a shift of `s` semitones
//! stretches by 2^(s/12) and resamples by the inverse ratio, returning the
//! original duration at the new pitch.
//!
//! Each channel runs through its own detector, vocoder and resampler;
//! channels never share state.

use log::{info, warn};

use crate::config::StretchConfig;
use crate::error::TimestretchError;
use crate::phase_vocoder::{MIN_FFT_SIZE, PhaseVocoder};
use crate::resampler::Resampler;
use crate::sample_buffer::linear_crossfade;
use crate::stream::{AudioStream, PassThrough};
use crate::transients::Transients;
use crate::wave_file::{WaveReader, WaveWriter};

/// Samples moved per read/submit while streaming a section
const BUFFER_SIZE: usize = 4096;

/// Offline stretch / pitch-shift / resample pipeline over wave files.
pub struct StretchEngine {
    config: StretchConfig,
    transient_callback: Option<Box<dyn FnMut(usize)>>,
}

impl StretchEngine {
    /// Create an engine for the given configuration
    pub fn new(config: StretchConfig) -> Result<Self, TimestretchError> {
        config.validate()?;
        Ok(Self { config, transient_callback: None })
    }

    /// Invoke `callback` with each transient position of the first channel
    /// as it is finalized
    pub fn set_transient_callback(&mut self, callback: impl FnMut(usize) + 'static) {
        self.transient_callback = Some(Box::new(callback));
    }

    /// Run the pipeline
    pub fn process(&mut self) -> Result<(), TimestretchError> {
        let stretch_requested = self.config.stretch_requested();
        let pitch_requested = self.config.pitch_shift_requested();
        let resample_requested = self.config.resample_requested();
        let callback_given = self.transient_callback.is_some();

        if !stretch_requested && !pitch_requested && !resample_requested && !callback_given {
            return Err(TimestretchError::NoActionConfigured);
        }
        if self.config.output_file.is_none() && !callback_given {
            // Without a sink or a callback nothing could ever be observed
            return Err(TimestretchError::NoActionConfigured);
        }

        let reader = WaveReader::open(&self.config.input_file)?;
        let input_rate = reader.sample_rate();
        let output_rate = self.config.resample_rate_hz.unwrap_or(input_rate);

        let use_vocoder = stretch_requested || pitch_requested;
        let use_resampler = resample_requested || pitch_requested;

        // The plain stretch factor governs silence and, multiplied by the
        // pitch ratio, the vocoder sections
        let pitch_ratio = self.config.pitch_shift_ratio();
        let silence_stretch = self.config.stretch_factor.unwrap_or(1.0);
        let section_stretch =
            silence_stretch * if pitch_requested { pitch_ratio } else { 1.0 };
        let resample_ratio = {
            let mut ratio = 1.0;
            if resample_requested {
                ratio = output_rate as f64 / input_rate as f64;
            }
            if pitch_requested {
                ratio /= pitch_ratio;
            }
            ratio
        };

        info!(
            "processing {}: stretch {silence_stretch}, pitch ratio {pitch_ratio}, \
             resample ratio {resample_ratio}, {} channel(s)",
            self.config.input_file.display(),
            reader.channels()
        );

        let writer = match &self.config.output_file {
            Some(path) => Some(WaveWriter::create(
                path,
                reader.channels() as u16,
                output_rate,
                reader.bits_per_sample(),
                reader.sample_format(),
            )?),
            None => None,
        };

        // Reporting-only runs finish after the transient pass; an output
        // file, if one was opened, stays empty
        if !use_vocoder && !use_resampler {
            self.harvest_transients(&reader, 0, true)?;
            if let Some(writer) = writer {
                writer.finalize()?;
            }
            return Ok(());
        }
        let Some(mut writer) = writer else {
            self.harvest_transients(&reader, 0, true)?;
            return Ok(());
        };

        // A resample-only run never walks the transient pass; fire the
        // callback here if one was registered anyway
        if !use_vocoder && callback_given {
            self.harvest_transients(&reader, 0, true)?;
        }

        let mut channel_outputs = Vec::with_capacity(reader.channels());
        for channel_index in 0..reader.channels() {
            let output = self.process_channel(
                &reader,
                channel_index,
                use_vocoder,
                use_resampler,
                section_stretch,
                silence_stretch,
                resample_ratio,
            )?;
            channel_outputs.push(output);
        }

        writer.write_channels(&channel_outputs)?;
        writer.finalize()?;
        Ok(())
    }

    fn harvest_transients(
        &mut self,
        reader: &WaveReader,
        channel_index: usize,
        fire_callback: bool,
    ) -> Result<Transients, TimestretchError> {
        let callback = if fire_callback {
            self.transient_callback
                .as_mut()
                .map(|callback| &mut **callback as &mut dyn FnMut(usize))
        } else {
            None
        };
        match &self.config.transient_config_file {
            Some(path) => Transients::from_config_file(path, callback),
            None => Ok(Transients::detect(
                reader.channel(channel_index),
                reader.sample_rate() as usize,
                self.config.valley_to_peak_ratio,
                callback,
            )),
        }
    }

    fn process_channel(
        &mut self,
        reader: &WaveReader,
        channel_index: usize,
        use_vocoder: bool,
        use_resampler: bool,
        section_stretch: f64,
        silence_stretch: f64,
        resample_ratio: f64,
    ) -> Result<Vec<f64>, TimestretchError> {
        let samples = reader.channel(channel_index);
        let sample_rate = reader.sample_rate();
        let mut sink = Vec::new();

        let mut output_stage: Box<dyn AudioStream> = if use_resampler {
            Box::new(Resampler::new(sample_rate, resample_ratio)?)
        } else {
            Box::new(PassThrough::new())
        };

        if use_vocoder {
            // The callback reports the first channel only; other channels
            // still run their own detection
            let transients = self.harvest_transients(reader, channel_index, channel_index == 0)?;

            let mut positions = transients.positions().to_vec();
            let before = positions.len();
            positions.retain(|&position| position < samples.len());
            if positions.len() != before {
                warn!("dropped {} transient position(s) past the end of input", before - positions.len());
            }

            if positions.is_empty() {
                // Nothing but silence in this channel
                write_silence(&mut sink, scaled_length(samples.len(), silence_stretch));
            } else {
                // Leading silence is stretched by plain sample replication
                if positions[0] > 0 {
                    write_silence(&mut sink, scaled_length(positions[0], silence_stretch));
                }

                let mut overlap_tail: Vec<f64> = Vec::new();
                for window in positions.windows(2) {
                    process_section(
                        samples,
                        window[0],
                        window[1],
                        sample_rate as usize,
                        section_stretch,
                        &mut overlap_tail,
                        output_stage.as_mut(),
                        &mut sink,
                    )?;
                }
                process_section(
                    samples,
                    *positions.last().expect("positions checked non-empty"),
                    samples.len(),
                    sample_rate as usize,
                    section_stretch,
                    &mut overlap_tail,
                    output_stage.as_mut(),
                    &mut sink,
                )?;
                // The final tail has nothing to crossfade into and is
                // dropped; section output targets are already met
            }
        } else {
            // Resampling only: the whole channel is one section
            for chunk in samples.chunks(BUFFER_SIZE) {
                route(output_stage.as_mut(), chunk, &mut sink)?;
            }
        }

        sink.extend(output_stage.flush_audio_data()?);
        Ok(sink)
    }
}

// One transient section: fresh vocoder, streamed input, output-length
// shortfall supplied by the flush, crossfade bookkeeping with the
// neighbouring sections.
#[allow(clippy::too_many_arguments)]
fn process_section(
    samples: &[f64],
    start: usize,
    end: usize,
    sample_rate: usize,
    stretch_factor: f64,
    overlap_tail: &mut Vec<f64>,
    output_stage: &mut dyn AudioStream,
    sink: &mut Vec<f64>,
) -> Result<(), TimestretchError> {
    let section_length = end - start;
    let expected_output = scaled_length(section_length, stretch_factor);

    // A section too short for even the smallest analysis frame cannot be
    // stretched; its stretched duration is emitted as silence
    if section_length < MIN_FFT_SIZE {
        if !overlap_tail.is_empty() {
            route(output_stage, overlap_tail, sink)?;
            overlap_tail.clear();
        }
        route(output_stage, &vec![0.0; expected_output], sink)?;
        return Ok(());
    }

    let mut vocoder = PhaseVocoder::new(sample_rate, section_length, stretch_factor)?;
    let mut section_output: Vec<f64> = Vec::with_capacity(expected_output);

    let mut position = start;
    while position < end {
        let chunk_length = BUFFER_SIZE.min(end - position);
        vocoder.submit_audio_data(&samples[position..position + chunk_length])?;
        position += chunk_length;

        while vocoder.output_samples_available() > 0 {
            let take = BUFFER_SIZE.min(vocoder.output_samples_available());
            section_output.extend(vocoder.get_audio_data(take));
        }
    }

    let samples_still_needed = expected_output.saturating_sub(section_output.len());
    let flushed = vocoder.flush_audio_data()?;
    if flushed.len() < samples_still_needed {
        return Err(TimestretchError::FlushUnderrun {
            needed: samples_still_needed,
            available: flushed.len(),
        });
    }
    section_output.extend(&flushed[..samples_still_needed]);

    // Save off the samples right after the section target as the crossfade
    // tail for the next section
    let tail_length =
        vocoder.transient_overlap_len().min(flushed.len() - samples_still_needed);
    let next_tail = flushed[samples_still_needed..samples_still_needed + tail_length].to_vec();

    let blended = if overlap_tail.is_empty() {
        section_output
    } else if section_output.len() >= overlap_tail.len() {
        // Fade the previous section's tail out across this section's opening
        let mut blended = linear_crossfade(overlap_tail, &section_output[..overlap_tail.len()]);
        blended.extend_from_slice(&section_output[overlap_tail.len()..]);
        blended
    } else {
        warn!(
            "crossfade tail ({}) outlasts section output ({}); appending it unfaded",
            overlap_tail.len(),
            section_output.len()
        );
        let mut blended = std::mem::take(overlap_tail);
        blended.extend(section_output);
        blended
    };
    *overlap_tail = next_tail;

    route(output_stage, &blended, sink)
}

// Feed audio through the output stage and move everything it produces into
// the sink.
fn route(
    stage: &mut dyn AudioStream,
    audio: &[f64],
    sink: &mut Vec<f64>,
) -> Result<(), TimestretchError> {
    stage.submit_audio_data(audio)?;
    while stage.output_samples_available() > 0 {
        let take = BUFFER_SIZE.min(stage.output_samples_available());
        sink.extend(stage.get_audio_data(take));
    }
    Ok(())
}

fn write_silence(sink: &mut Vec<f64>, count: usize) {
    sink.resize(sink.len() + count, 0.0);
}

#[inline(always)]
fn scaled_length(length: usize, factor: f64) -> usize {
    (length as f64 * factor).round() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_action_is_an_error() {
        let config = StretchConfig::new("whatever.wav");
        let mut engine = StretchEngine::new(config).unwrap();
        assert!(matches!(engine.process(), Err(TimestretchError::NoActionConfigured)));
    }

    #[test]
    fn test_missing_input_is_reported() {
        let mut config = StretchConfig::new("/nonexistent/input.wav");
        config.output_file = Some(std::env::temp_dir().join("timestretch-missing-out.wav"));
        config.stretch_factor = Some(1.5);

        let mut engine = StretchEngine::new(config).unwrap();
        assert!(matches!(engine.process(), Err(TimestretchError::MissingInput)));
    }

    #[test]
    fn test_output_required_without_callback() {
        // A stretch with no output file and no callback has nowhere to go
        let mut config = StretchConfig::new("whatever.wav");
        config.stretch_factor = Some(1.5);
        let mut engine = StretchEngine::new(config).unwrap();
        assert!(matches!(engine.process(), Err(TimestretchError::NoActionConfigured)));
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let mut config = StretchConfig::new("in.wav");
        config.stretch_factor = Some(-1.0);
        assert!(StretchEngine::new(config).is_err());
    }
}

//! Command-line front end for the stretch engine

use std::error::Error;
use std::path::PathBuf;
use std::process;

use timestretch::{StretchConfig, StretchEngine};

const USAGE: &str = "\
Usage: timestretch [options] input.wav [output.wav]

Options:
  --stretch <factor>          Output duration over input duration (> 0)
  --pitch <semitones>         Pitch shift, positive raises pitch
  --rate <hz>                 Output sample rate target
  --valley-to-peak <ratio>    Transient sensitivity (default 1.5)
  --transient-config <file>   Read transient positions instead of detecting
  --show-transients           Print transient positions as they are found

Output may be omitted when --show-transients is given.";

fn parse_args(args: &[String]) -> Result<(StretchConfig, bool), String> {
    let mut input_file: Option<PathBuf> = None;
    let mut output_file: Option<PathBuf> = None;
    let mut stretch_factor = None;
    let mut pitch_shift = None;
    let mut resample_rate = None;
    let mut valley_to_peak = None;
    let mut transient_config = None;
    let mut show_transients = false;

    let mut iter = args.iter();
    while let Some(argument) = iter.next() {
        let mut value_for = |name: &str| {
            iter.next().ok_or_else(|| format!("{name} needs a value"))
        };
        match argument.as_str() {
            "--stretch" => {
                stretch_factor = Some(
                    value_for("--stretch")?
                        .parse::<f64>()
                        .map_err(|_| "--stretch needs a number".to_string())?,
                );
            }
            "--pitch" => {
                pitch_shift = Some(
                    value_for("--pitch")?
                        .parse::<f64>()
                        .map_err(|_| "--pitch needs a number".to_string())?,
                );
            }
            "--rate" => {
                resample_rate = Some(
                    value_for("--rate")?
                        .parse::<u32>()
                        .map_err(|_| "--rate needs a sample rate in Hz".to_string())?,
                );
            }
            "--valley-to-peak" => {
                valley_to_peak = Some(
                    value_for("--valley-to-peak")?
                        .parse::<f64>()
                        .map_err(|_| "--valley-to-peak needs a number".to_string())?,
                );
            }
            "--transient-config" => {
                transient_config = Some(PathBuf::from(value_for("--transient-config")?));
            }
            "--show-transients" => show_transients = true,
            "--help" | "-h" => return Err(USAGE.to_string()),
            other if other.starts_with("--") => {
                return Err(format!("unknown option {other}"));
            }
            path if input_file.is_none() => input_file = Some(PathBuf::from(path)),
            path if output_file.is_none() => output_file = Some(PathBuf::from(path)),
            extra => return Err(format!("unexpected argument {extra}")),
        }
    }

    let Some(input_file) = input_file else {
        return Err(USAGE.to_string());
    };

    let mut config = StretchConfig::new(input_file);
    config.output_file = output_file;
    config.stretch_factor = stretch_factor;
    config.pitch_shift_semitones = pitch_shift;
    config.resample_rate_hz = resample_rate;
    if let Some(ratio) = valley_to_peak {
        config.valley_to_peak_ratio = ratio;
    }
    config.transient_config_file = transient_config;

    Ok((config, show_transients))
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (config, show_transients) = match parse_args(&args) {
        Ok(parsed) => parsed,
        Err(message) => {
            eprintln!("{message}");
            process::exit(2);
        }
    };

    let mut engine = StretchEngine::new(config)?;
    if show_transients {
        engine.set_transient_callback(|position| println!("transient: {position}"));
    }
    engine.process()?;
    Ok(())
}

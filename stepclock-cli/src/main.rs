use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;
use stepclock_audio::{EngineFeedback, SoundSink};
use stepclock_core::{Config, LogSink, MidirSink, Sequencer};
use stepclock_types::{
    midi_note_name, Direction, Key, Scale, Step, StepPattern, TimingDivision, DEFAULT_STEPS,
    MAX_STEPS,
};

const USAGE: &str = "usage: stepclock [--verbose] [--bars N] [--length N] [--direction forward|backward|bounce|random]
                 [--division 1/8|1/8T|1/16|1/16T|1/32|1/32T|1/64] [--no-loop] [--bpm B]
                 [--root C|C#|..|B] [--scale NAME|off] [--midi PORT]";

/// C minor pentatonic riff; rests on every fourth step.
const MOTIF: [u8; 8] = [60, 63, 65, 67, 70, 67, 65, 63];

struct Args {
    verbose: bool,
    bars: u32,
    length: usize,
    direction: Direction,
    division: TimingDivision,
    looping: bool,
    bpm: Option<f32>,
    root: Key,
    /// `None` plays the motif unquantized
    scale: Option<Scale>,
    midi: Option<String>,
}

fn init_logging(verbose: bool) {
    use simplelog::*;

    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Warn };
    if let Err(e) = TermLogger::init(
        log_level,
        simplelog::Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    ) {
        eprintln!("stepclock: logging disabled: {}", e);
        return;
    }
    log::info!("stepclock starting (log level: {:?})", log_level);
}

fn value_of<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let bars = match value_of(args, "--bars") {
        Some(v) => v.parse::<u32>().map_err(|_| format!("invalid --bars {:?}", v))?,
        None => 2,
    };
    let length = match value_of(args, "--length") {
        Some(v) => v
            .parse::<usize>()
            .ok()
            .filter(|n| (1..=MAX_STEPS).contains(n))
            .ok_or_else(|| format!("--length must be 1-{}, got {:?}", MAX_STEPS, v))?,
        None => DEFAULT_STEPS,
    };
    let direction = match value_of(args, "--direction") {
        Some(v) => Direction::parse(v).ok_or_else(|| format!("unknown direction {:?}", v))?,
        None => Direction::Forward,
    };
    let division = match value_of(args, "--division") {
        Some(v) => TimingDivision::parse(v).ok_or_else(|| format!("unknown division {:?}", v))?,
        None => TimingDivision::Normal,
    };
    let root = match value_of(args, "--root") {
        Some(v) => Key::parse(v).ok_or_else(|| format!("unknown root {:?}", v))?,
        None => Key::C,
    };
    let scale = match value_of(args, "--scale") {
        Some("off") => None,
        Some(v) => Some(Scale::parse(v).ok_or_else(|| format!("unknown scale {:?}", v))?),
        None => Some(Scale::MinorPentatonic),
    };
    let bpm = match value_of(args, "--bpm") {
        Some(v) => Some(v.parse::<f32>().map_err(|_| format!("invalid --bpm {:?}", v))?),
        None => None,
    };

    Ok(Args {
        verbose: args.iter().any(|a| a == "--verbose" || a == "-v"),
        bars,
        length,
        direction,
        division,
        looping: !args.iter().any(|a| a == "--no-loop"),
        bpm,
        root,
        scale,
        midi: value_of(args, "--midi").map(str::to_string),
    })
}

fn demo_pattern(args: &Args) -> StepPattern {
    let mut pattern = StepPattern::new(args.length);
    pattern.direction = args.direction;
    pattern.division = args.division;
    pattern.looping = args.looping;
    pattern.root = args.root;
    pattern.scale = args.scale;
    pattern.quantize = args.scale.is_some();
    for i in 0..args.length {
        if let Some(step) = pattern.step_mut(i) {
            *step = Step {
                active: i % 4 != 3,
                note: MOTIF[i % MOTIF.len()],
                velocity: if i % 4 == 0 { 100 } else { 70 },
                gate: 60,
            };
        }
    }
    pattern
}

fn open_sink(args: &Args, config: &Config) -> Arc<dyn SoundSink> {
    let wanted = args.midi.as_deref().or(config.midi_port());
    if wanted.is_none() {
        return Arc::new(LogSink);
    }
    match MidirSink::connect(wanted) {
        Ok(sink) => {
            println!("MIDI output: {}", sink.port_name());
            Arc::new(sink)
        }
        Err(e) => {
            log::warn!(target: "midi", "{}, logging notes instead", e);
            Arc::new(LogSink)
        }
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load();
    let pattern = demo_pattern(&args);
    let sink = open_sink(&args, &config);

    let mut seq = Sequencer::start(&config, pattern.clone(), sink)?;
    if let Some(bpm) = args.bpm {
        seq.set_bpm(bpm)?;
    }
    let session = *seq.session();
    let beats = args.bars as u64 * session.beats_per_bar as u64;
    let run_for = Duration::from_secs_f64(beats as f64 * 60.0 / session.bpm as f64);

    println!(
        "{} steps, {}, {} at {} bpm for {} bars{}",
        pattern.length,
        pattern.direction.name(),
        pattern.division.name(),
        session.bpm,
        args.bars,
        if pattern.looping { "" } else { " (one shot)" }
    );
    if let (Some(scale), Some(mask)) = (pattern.scale, pattern.scale_mask()) {
        println!(
            "quantized to {} {} ({} tones)",
            pattern.root.name(),
            scale.name(),
            mask.len()
        );
    }

    seq.play()?;
    let deadline = Instant::now() + run_for;
    loop {
        match seq.feedback().recv_deadline(deadline) {
            Ok(EngineFeedback::StepAdvanced { step }) => match pattern.step(step) {
                Some(s) if s.active => println!("step {:>2}  {}", step, midi_note_name(s.note)),
                _ => println!("step {:>2}  -", step),
            },
            Ok(EngineFeedback::PatternCompleted { .. }) if !pattern.looping => {
                println!("pattern finished");
                break;
            }
            Ok(EngineFeedback::LoopRestarted) => println!("--"),
            Ok(_) => {}
            Err(RecvTimeoutError::Timeout) => break,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    seq.stop()?;
    let state = seq.shutdown()?;
    log::info!("stopped at step {}", state.current_step);
    Ok(())
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("{}", USAGE);
        return ExitCode::SUCCESS;
    }
    let args = match parse_args(&args) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("stepclock: {}\n{}", e, USAGE);
            return ExitCode::from(2);
        }
    };
    init_logging(args.verbose);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("stepclock: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(s: &str) -> Vec<String> {
        std::iter::once("stepclock")
            .chain(s.split_whitespace())
            .map(String::from)
            .collect()
    }

    #[test]
    fn defaults() {
        let args = parse_args(&argv("")).unwrap();
        assert_eq!(args.bars, 2);
        assert_eq!(args.length, DEFAULT_STEPS);
        assert_eq!(args.direction, Direction::Forward);
        assert_eq!(args.division, TimingDivision::Normal);
        assert!(args.looping);
        assert!(!args.verbose);
        assert!(args.bpm.is_none());
        assert_eq!(args.root, Key::C);
        assert_eq!(args.scale, Some(Scale::MinorPentatonic));
    }

    #[test]
    fn all_flags() {
        let args = parse_args(&argv(
            "--verbose --bars 4 --length 12 --direction bounce --division 1/8T --no-loop --bpm 98.5 --root F# --scale harmonic-minor --midi IAC",
        ))
        .unwrap();
        assert!(args.verbose);
        assert_eq!(args.bars, 4);
        assert_eq!(args.length, 12);
        assert_eq!(args.direction, Direction::Bounce);
        assert_eq!(args.division, TimingDivision::Triplet);
        assert!(!args.looping);
        assert_eq!(args.bpm, Some(98.5));
        assert_eq!(args.root, Key::Fs);
        assert_eq!(args.scale, Some(Scale::HarmonicMinor));
        assert_eq!(args.midi.as_deref(), Some("IAC"));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(parse_args(&argv("--length 0")).is_err());
        assert!(parse_args(&argv("--length 65")).is_err());
        assert!(parse_args(&argv("--direction sideways")).is_err());
        assert!(parse_args(&argv("--division 1/5")).is_err());
        assert!(parse_args(&argv("--bpm fast")).is_err());
        assert!(parse_args(&argv("--root H")).is_err());
        assert!(parse_args(&argv("--scale klingon")).is_err());
    }

    #[test]
    fn demo_pattern_is_playable() {
        let args = parse_args(&argv("--length 7 --no-loop")).unwrap();
        let pattern = demo_pattern(&args);
        assert_eq!(pattern.validate(), Ok(()));
        assert_eq!(pattern.length, 7);
        assert!(!pattern.looping);
        assert!(pattern.step(3).is_some_and(|s| !s.active));
        assert!(pattern.step(4).is_some_and(|s| s.active && s.velocity == 100));
    }

    #[test]
    fn root_and_scale_feed_the_quantizer() {
        let args = parse_args(&argv("--root D --scale major")).unwrap();
        let pattern = demo_pattern(&args);
        assert_eq!(pattern.root, Key::D);
        assert_eq!(pattern.scale, Some(Scale::Major));
        assert!(pattern.quantize);
        let mask = pattern.scale_mask().unwrap();
        // D major has F#, not F
        assert!(mask.contains(6));
        assert!(!mask.contains(5));

        let off = demo_pattern(&parse_args(&argv("--scale off")).unwrap());
        assert!(!off.quantize);
        assert_eq!(off.validate(), Ok(()));
    }
}

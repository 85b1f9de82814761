//! # stepclock-core
//!
//! Host side of stepclock: configuration, output sinks, and the `Sequencer`
//! that starts and stops the clock, engine and dispatcher threads together.

pub mod config;
pub mod log_sink;
pub mod midi;
pub mod sequencer;

pub use config::{Config, ConfigError};
pub use log_sink::LogSink;
pub use midi::{MidiError, MidirSink};
pub use sequencer::{Sequencer, SequencerError};

//! # stepclock-types
//!
//! Plain data shared by the stepclock crates: step patterns, playback
//! directions, timing divisions, scales and session timing. Nothing here
//! touches threads or devices.

pub mod music;
pub mod pattern;
pub mod session;

pub use music::{midi_note_name, Key, Scale, ScaleMask};
pub use pattern::{
    Direction, PatternError, Step, StepField, StepPattern, TimingDivision, DEFAULT_STEPS,
    MAX_OCTAVE_SHIFT, MAX_STEPS,
};
pub use session::{SessionConfig, SessionError, DEFAULT_BEATS_PER_BAR, DEFAULT_BPM, DEFAULT_PPQ};

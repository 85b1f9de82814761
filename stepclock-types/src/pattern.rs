//! Step pattern types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::music::{Key, Scale, ScaleMask};

pub const MAX_STEPS: usize = 64;
pub const DEFAULT_STEPS: usize = 16;
pub const MAX_OCTAVE_SHIFT: i8 = 3;

/// Order in which steps are visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Direction {
    #[default]
    Forward,
    Backward,
    Bounce,
    Random,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Forward,
        Direction::Backward,
        Direction::Bounce,
        Direction::Random,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Direction::Forward => "Forward",
            Direction::Backward => "Backward",
            Direction::Bounce => "Bounce",
            Direction::Random => "Random",
        }
    }

    pub fn parse(s: &str) -> Option<Direction> {
        Direction::ALL
            .iter()
            .copied()
            .find(|d| d.name().eq_ignore_ascii_case(s))
    }
}

/// Step length relative to a quarter-note beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TimingDivision {
    /// 16th notes
    #[default]
    Normal,
    /// 32nd notes
    Double,
    /// 8th notes
    Half,
    /// 8th-note triplets
    Triplet,
    /// 16th-note triplets
    EighthTriplet,
    /// 64th notes
    Sixteenth,
    /// 32nd-note triplets
    SixteenthTriplet,
}

impl TimingDivision {
    pub const ALL: [TimingDivision; 7] = [
        TimingDivision::Half,
        TimingDivision::Triplet,
        TimingDivision::Normal,
        TimingDivision::EighthTriplet,
        TimingDivision::Double,
        TimingDivision::SixteenthTriplet,
        TimingDivision::Sixteenth,
    ];

    /// Steps per beat (quarter note)
    pub fn steps_per_beat(&self) -> u32 {
        match self {
            TimingDivision::Half => 2,
            TimingDivision::Triplet => 3,
            TimingDivision::Normal => 4,
            TimingDivision::EighthTriplet => 6,
            TimingDivision::Double => 8,
            TimingDivision::SixteenthTriplet => 12,
            TimingDivision::Sixteenth => 16,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TimingDivision::Half => "1/8",
            TimingDivision::Triplet => "1/8T",
            TimingDivision::Normal => "1/16",
            TimingDivision::EighthTriplet => "1/16T",
            TimingDivision::Double => "1/32",
            TimingDivision::SixteenthTriplet => "1/32T",
            TimingDivision::Sixteenth => "1/64",
        }
    }

    /// Accepts the variant name ("Triplet") or the note-value label ("1/8T").
    pub fn parse(s: &str) -> Option<TimingDivision> {
        TimingDivision::ALL.iter().copied().find(|d| {
            d.name().eq_ignore_ascii_case(s) || format!("{:?}", d).eq_ignore_ascii_case(s)
        })
    }
}

/// A single step in a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub active: bool,
    pub note: u8,     // 0-127
    pub velocity: u8, // 0-100, scaled to MIDI by the dispatcher
    pub gate: u8,     // 0-100, scaled to milliseconds by the dispatcher
}

impl Default for Step {
    fn default() -> Self {
        Self {
            active: false,
            note: 60,
            velocity: 80,
            gate: 50,
        }
    }
}

impl Step {
    pub fn on(note: u8) -> Self {
        Self {
            active: true,
            note,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepField {
    Note,
    Velocity,
    Gate,
}

impl std::fmt::Display for StepField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepField::Note => write!(f, "note"),
            StepField::Velocity => write!(f, "velocity"),
            StepField::Gate => write!(f, "gate"),
        }
    }
}

/// Structural problems that make a pattern unplayable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("pattern length must be at least 1")]
    ZeroLength,
    #[error("pattern length {0} exceeds the maximum of 64 steps")]
    TooLong(usize),
    #[error("pattern length is {length} but only {available} steps are defined")]
    MissingSteps { length: usize, available: usize },
    #[error("quantization is enabled but no scale is set")]
    MissingScale,
    #[error("octave shift {0} is outside -3..=3")]
    OctaveShiftOutOfRange(i8),
    #[error("step {index}: {field} value {value} is out of range")]
    StepOutOfRange {
        index: usize,
        field: StepField,
        value: u8,
    },
}

/// A step pattern as edited by the user. The engine only ever sees validated copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepPattern {
    pub steps: Vec<Step>,
    /// Number of steps that play ("last step"), 1-64
    pub length: usize,
    #[serde(rename = "loop")]
    pub looping: bool,
    pub direction: Direction,
    pub division: TimingDivision,
    pub root: Key,
    pub scale: Option<Scale>,
    pub quantize: bool,
    /// Octaves, -3..=3
    pub octave_shift: i8,
}

impl Default for StepPattern {
    fn default() -> Self {
        Self::new(DEFAULT_STEPS)
    }
}

impl StepPattern {
    /// All `MAX_STEPS` slots allocated, the first `length` of them playing.
    pub fn new(length: usize) -> Self {
        Self {
            steps: vec![Step::default(); MAX_STEPS],
            length,
            looping: true,
            direction: Direction::Forward,
            division: TimingDivision::Normal,
            root: Key::C,
            scale: None,
            quantize: false,
            octave_shift: 0,
        }
    }

    pub fn from_notes(notes: &[Option<u8>]) -> Self {
        let mut pattern = Self::new(notes.len());
        for (slot, note) in pattern.steps.iter_mut().zip(notes) {
            if let Some(note) = *note {
                *slot = Step::on(note);
            }
        }
        pattern
    }

    pub fn step(&self, index: usize) -> Option<&Step> {
        if index < self.length {
            self.steps.get(index)
        } else {
            None
        }
    }

    pub fn step_mut(&mut self, index: usize) -> Option<&mut Step> {
        self.steps.get_mut(index)
    }

    /// Scale mask for quantization, present only when a scale is set.
    pub fn scale_mask(&self) -> Option<ScaleMask> {
        self.scale.map(|scale| ScaleMask::new(self.root, scale))
    }

    pub fn validate(&self) -> Result<(), PatternError> {
        if self.length == 0 {
            return Err(PatternError::ZeroLength);
        }
        if self.length > MAX_STEPS {
            return Err(PatternError::TooLong(self.length));
        }
        if self.steps.len() < self.length {
            return Err(PatternError::MissingSteps {
                length: self.length,
                available: self.steps.len(),
            });
        }
        if self.quantize && self.scale.is_none() {
            return Err(PatternError::MissingScale);
        }
        if !(-MAX_OCTAVE_SHIFT..=MAX_OCTAVE_SHIFT).contains(&self.octave_shift) {
            return Err(PatternError::OctaveShiftOutOfRange(self.octave_shift));
        }
        for (index, step) in self.steps[..self.length].iter().enumerate() {
            let checks = [
                (StepField::Note, step.note, 127),
                (StepField::Velocity, step.velocity, 100),
                (StepField::Gate, step.gate, 100),
            ];
            for (field, value, max) in checks {
                if value > max {
                    return Err(PatternError::StepOutOfRange {
                        index,
                        field,
                        value,
                    });
                }
            }
        }
        Ok(())
    }
}

//! Session-wide timing configuration consumed by the engine and the clock.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_PPQ: u32 = 24;
pub const DEFAULT_BPM: f32 = 120.0;
pub const DEFAULT_BEATS_PER_BAR: u32 = 4;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("pulses per quarter note must be at least 1")]
    ZeroPpq,
    #[error("tempo must be a positive number of beats per minute, got {0}")]
    InvalidTempo(f32),
    #[error("beats per bar must be at least 1")]
    ZeroBeatsPerBar,
}

/// Tempo and transport resolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub bpm: f32,
    /// Pulses (ticks) per quarter note
    pub ppq: u32,
    pub beats_per_bar: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bpm: DEFAULT_BPM,
            ppq: DEFAULT_PPQ,
            beats_per_bar: DEFAULT_BEATS_PER_BAR,
        }
    }
}

impl SessionConfig {
    pub fn new(bpm: f32, ppq: u32, beats_per_bar: u32) -> Result<Self, SessionError> {
        let session = Self {
            bpm,
            ppq,
            beats_per_bar,
        };
        session.validate()?;
        Ok(session)
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        if self.ppq == 0 {
            return Err(SessionError::ZeroPpq);
        }
        if !self.bpm.is_finite() || self.bpm <= 0.0 {
            return Err(SessionError::InvalidTempo(self.bpm));
        }
        if self.beats_per_bar == 0 {
            return Err(SessionError::ZeroBeatsPerBar);
        }
        Ok(())
    }

    /// Wall-clock length of one tick in seconds.
    pub fn secs_per_tick(&self) -> f64 {
        60.0 / (self.bpm as f64 * self.ppq as f64)
    }
}

impl std::fmt::Display for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} bpm, {} ppq, {} beats per bar",
            self.bpm, self.ppq, self.beats_per_bar
        )
    }
}

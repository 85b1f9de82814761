//! Sound sink trait: the device boundary the dispatcher talks to.
//!
//! `SoundSink` captures what the dispatcher means to do (start a note, release a
//! note) independently of how the device does it. A MIDI port, a software synth
//! and the recording `TestSink` all implement it.

use std::sync::Mutex;
use std::time::Instant;

use thiserror::Error;

/// Result type for sink operations.
pub type SinkResult<T = ()> = Result<T, SinkError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("sound sink is closed")]
    Closed,
    #[error("send failed: {0}")]
    Send(String),
}

/// A device that can sound notes. Called from the engine thread (immediate
/// mode) and from the note timer thread, hence `Send + Sync`.
pub trait SoundSink: Send + Sync {
    /// `channel` is 0-based (0..=15).
    fn note_on(&self, channel: u8, note: u8, velocity: u8) -> SinkResult;

    fn note_off(&self, channel: u8, note: u8) -> SinkResult;
}

/// An operation recorded by `TestSink` for assertion in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkOp {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8 },
}

/// Sink that records every call with the instant it arrived.
///
/// Interior mutability through `Mutex`, so tests can share it via `Arc`.
pub struct TestSink {
    ops: Mutex<Vec<(Instant, SinkOp)>>,
    failing: Mutex<bool>,
}

impl TestSink {
    pub fn new() -> Self {
        Self {
            ops: Mutex::new(Vec::new()),
            failing: Mutex::new(false),
        }
    }

    /// Make every subsequent call fail with `SinkError::Closed` (nothing is recorded).
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut f) = self.failing.lock() {
            *f = failing;
        }
    }

    /// Return all recorded operations in arrival order.
    pub fn operations(&self) -> Vec<SinkOp> {
        self.timed_operations().into_iter().map(|(_, op)| op).collect()
    }

    pub fn timed_operations(&self) -> Vec<(Instant, SinkOp)> {
        self.ops.lock().map(|ops| ops.clone()).unwrap_or_default()
    }

    /// Notes of every recorded note-on, in order.
    pub fn notes_on(&self) -> Vec<u8> {
        self.operations()
            .into_iter()
            .filter_map(|op| match op {
                SinkOp::NoteOn { note, .. } => Some(note),
                SinkOp::NoteOff { .. } => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut ops) = self.ops.lock() {
            ops.clear();
        }
    }

    fn record(&self, op: SinkOp) -> SinkResult {
        if self.failing.lock().map(|f| *f).unwrap_or(false) {
            return Err(SinkError::Closed);
        }
        self.ops
            .lock()
            .map_err(|e| SinkError::Send(e.to_string()))?
            .push((Instant::now(), op));
        Ok(())
    }
}

impl Default for TestSink {
    fn default() -> Self {
        Self::new()
    }
}

impl SoundSink for TestSink {
    fn note_on(&self, channel: u8, note: u8, velocity: u8) -> SinkResult {
        self.record(SinkOp::NoteOn {
            channel,
            note,
            velocity,
        })
    }

    fn note_off(&self, channel: u8, note: u8) -> SinkResult {
        self.record(SinkOp::NoteOff { channel, note })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_in_order() {
        let sink = TestSink::new();
        sink.note_on(0, 60, 100).unwrap();
        sink.note_off(0, 60).unwrap();
        assert_eq!(
            sink.operations(),
            vec![
                SinkOp::NoteOn {
                    channel: 0,
                    note: 60,
                    velocity: 100
                },
                SinkOp::NoteOff { channel: 0, note: 60 },
            ]
        );
        assert_eq!(sink.notes_on(), vec![60]);
        sink.clear();
        assert!(sink.operations().is_empty());
    }

    #[test]
    fn failing_sink_reports_closed() {
        let sink = TestSink::new();
        sink.set_failing(true);
        assert_eq!(sink.note_on(0, 60, 100), Err(SinkError::Closed));
        assert!(sink.operations().is_empty());
        sink.set_failing(false);
        assert!(sink.note_off(0, 60).is_ok());
    }
}

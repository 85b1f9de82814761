#![allow(dead_code)]
//! Shared helpers for stepclock-core integration tests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use stepclock_audio::{EngineFeedback, SinkResult, SoundSink};
use stepclock_core::Config;
use stepclock_types::StepPattern;

/// Fast tempo so a full loop takes a fraction of a second.
pub fn fast_config(extra: &str) -> Config {
    let toml = format!(
        "[session]\nbpm = 600.0\nppq = 24\nbeats_per_bar = 4\n{}",
        extra
    );
    Config::from_toml_str(&toml).unwrap()
}

pub fn pattern(notes: &[Option<u8>]) -> StepPattern {
    StepPattern::from_notes(notes)
}

/// Collect feedback until `until` matches or `timeout` expires.
pub fn collect_until(
    feedback: &Receiver<EngineFeedback>,
    timeout: Duration,
    until: impl Fn(&EngineFeedback) -> bool,
) -> Vec<EngineFeedback> {
    let deadline = Instant::now() + timeout;
    let mut seen = Vec::new();
    while let Ok(event) = feedback.recv_deadline(deadline) {
        let done = until(&event);
        seen.push(event);
        if done {
            return seen;
        }
    }
    panic!("timed out waiting for feedback, saw {:?}", seen);
}

/// Poll `cond` every few milliseconds until it holds or `timeout` expires.
pub fn wait_for(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

/// Sink whose note-on parks the calling thread until the release sender is dropped.
pub struct BlockingSink {
    entered: Sender<u8>,
    release: Receiver<()>,
}

impl BlockingSink {
    /// Returns the sink, a receiver told about every note-on, and the release handle.
    pub fn new() -> (Arc<Self>, Receiver<u8>, Sender<()>) {
        let (entered, entered_rx) = crossbeam_channel::unbounded();
        let (release_tx, release) = crossbeam_channel::bounded(0);
        (Arc::new(Self { entered, release }), entered_rx, release_tx)
    }
}

impl SoundSink for BlockingSink {
    fn note_on(&self, _channel: u8, note: u8, _velocity: u8) -> SinkResult {
        let _ = self.entered.send(note);
        let _ = self.release.recv();
        Ok(())
    }

    fn note_off(&self, _channel: u8, _note: u8) -> SinkResult {
        Ok(())
    }
}

#![allow(dead_code)]
//! Test harness for driving a StepClockEngine by hand.

use std::sync::Arc;

use crossbeam_channel::Receiver;
use stepclock_audio::{
    update_channel, DispatchConfig, DispatchMode, EngineFeedback, LoopQuantize, NoteDispatcher,
    PatternSnapshot, StepClockEngine, TestSink, UpdateSender,
};
use stepclock_types::{Direction, SessionConfig, StepPattern};

/// Engine wired to a recording sink in immediate mode, so note-ons land
/// synchronously and can be asserted without sleeping.
pub struct Harness {
    pub engine: StepClockEngine,
    pub sink: Arc<TestSink>,
    pub feedback: Receiver<EngineFeedback>,
    pub updates: UpdateSender,
    tick: u64,
    ppq: u64,
}

impl Harness {
    pub fn new(pattern: StepPattern) -> Self {
        Self::with_session(pattern, SessionConfig::default(), LoopQuantize::Beat)
    }

    pub fn with_session(
        pattern: StepPattern,
        session: SessionConfig,
        loop_quantize: LoopQuantize,
    ) -> Self {
        let sink = Arc::new(TestSink::new());
        let config = DispatchConfig {
            mode: DispatchMode::Immediate,
            ..DispatchConfig::default()
        };
        let dispatcher = NoteDispatcher::new(config, sink.clone()).unwrap();
        let (feedback_tx, feedback) = crossbeam_channel::unbounded();
        let (updates, updates_rx) = update_channel();
        let engine = StepClockEngine::new(PatternSnapshot::new(pattern).unwrap(), session, dispatcher)
            .unwrap()
            .with_feedback(feedback_tx)
            .with_updates(updates_rx)
            .with_loop_quantize(loop_quantize);
        Self {
            engine,
            sink,
            feedback,
            updates,
            tick: 0,
            ppq: session.ppq as u64,
        }
    }

    pub fn play(&mut self) {
        self.tick = 0;
        self.engine.on_play();
    }

    /// One transport pulse: the tick, then the beat if this pulse lands on one.
    pub fn pulse(&mut self) {
        self.tick += 1;
        self.engine.on_tick(self.tick);
        if self.tick % self.ppq == 0 {
            self.engine.on_beat(self.tick / self.ppq);
        }
    }

    pub fn pulses(&mut self, count: u64) {
        for _ in 0..count {
            self.pulse();
        }
    }

    /// Ticks only, no beats.
    pub fn ticks_only(&mut self, count: u64) {
        for _ in 0..count {
            self.tick += 1;
            self.engine.on_tick(self.tick);
        }
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn drain_feedback(&self) -> Vec<EngineFeedback> {
        self.feedback.try_iter().collect()
    }
}

/// Every step entered, in order.
pub fn visited(feedback: &[EngineFeedback]) -> Vec<usize> {
    feedback
        .iter()
        .filter_map(|f| match f {
            EngineFeedback::StepAdvanced { step } => Some(*step),
            _ => None,
        })
        .collect()
}

/// Pattern with every step active, note `60 + index`.
pub fn ascending(length: usize, direction: Direction) -> StepPattern {
    let notes: Vec<Option<u8>> = (0..length).map(|i| Some(60 + i as u8)).collect();
    let mut pattern = StepPattern::from_notes(&notes);
    pattern.direction = direction;
    pattern
}

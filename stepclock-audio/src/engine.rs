//! StepClockEngine: turns transport pulses into sequencer steps.
//!
//! The engine is driven synchronously from one thread (see `sequencer_thread`).
//! Each handler drains pending reconfiguration first, then updates
//! `EngineState`. Notes are handed to the `NoteDispatcher`; the engine itself
//! never sleeps.
//!
//! A step's note fires when the step is entered. Reaching the end of a cycle
//! puts the engine in the completed state; a looping pattern restarts on the
//! next beat (or bar), a one-shot pattern holds its final step.

use crossbeam_channel::{Receiver, Sender};
use stepclock_types::{Direction, PatternError, SessionConfig, SessionError};
use thiserror::Error;

use crate::commands::{EngineFeedback, EngineUpdate, TransportEvent};
use crate::direction::{next_step, StepRng};
use crate::dispatcher::{GateCurve, NoteDispatcher};
use crate::quantize::map_note;
use crate::snapshot::PatternSnapshot;

pub const DEFAULT_RANDOM_SEED: u64 = 12345;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("invalid pattern: {0}")]
    Pattern(#[from] PatternError),
    #[error("invalid session: {0}")]
    Session(#[from] SessionError),
    #[error("engine update queue is full")]
    UpdateQueueFull,
    #[error("engine thread is not running")]
    Disconnected,
    #[error("failed to spawn {thread} thread: {reason}")]
    Spawn { thread: &'static str, reason: String },
}

/// Which beats may restart a completed looping pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopQuantize {
    #[default]
    Beat,
    Bar,
}

impl LoopQuantize {
    pub fn name(&self) -> &'static str {
        match self {
            LoopQuantize::Beat => "beat",
            LoopQuantize::Bar => "bar",
        }
    }

    pub fn parse(s: &str) -> Option<LoopQuantize> {
        match s.to_ascii_lowercase().as_str() {
            "beat" => Some(LoopQuantize::Beat),
            "bar" => Some(LoopQuantize::Bar),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    /// Cycle finished; waiting for a beat boundary, or holding if not looping.
    PatternCompleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineState {
    pub is_playing: bool,
    /// Always in `[0, length)`
    pub current_step: usize,
    /// Ticks since the last step boundary
    pub tick_counter: u32,
    pub ticks_per_step: u32,
    pub pattern_completed: bool,
    /// Bounce only: moving toward the last step
    pub bounce_forward: bool,
}

impl EngineState {
    fn new(ticks_per_step: u32) -> Self {
        Self {
            is_playing: false,
            current_step: 0,
            tick_counter: 0,
            ticks_per_step,
            pattern_completed: false,
            bounce_forward: true,
        }
    }

    pub fn playback(&self) -> PlaybackState {
        if !self.is_playing {
            PlaybackState::Stopped
        } else if self.pattern_completed {
            PlaybackState::PatternCompleted
        } else {
            PlaybackState::Playing
        }
    }
}

/// `ppq / steps_per_beat`, rounded to the nearest tick and never below 1.
pub fn ticks_per_step(ppq: u32, steps_per_beat: u32) -> u32 {
    let spb = steps_per_beat.max(1);
    ((2 * ppq + spb) / (2 * spb)).max(1)
}

pub struct StepClockEngine {
    pattern: PatternSnapshot,
    session: SessionConfig,
    loop_quantize: LoopQuantize,
    state: EngineState,
    rng: StepRng,
    /// Steps entered in the current cycle, used to end Random cycles
    cycle_steps: usize,
    dispatcher: NoteDispatcher,
    updates: Option<Receiver<EngineUpdate>>,
    feedback: Option<Sender<EngineFeedback>>,
}

impl StepClockEngine {
    pub fn new(
        pattern: PatternSnapshot,
        session: SessionConfig,
        dispatcher: NoteDispatcher,
    ) -> Result<Self, EngineError> {
        session.validate()?;
        let spb = pattern.division.steps_per_beat();
        let tps = ticks_per_step(session.ppq, spb);
        if session.ppq % spb != 0 {
            log::warn!(
                target: "engine",
                "{} ppq is not divisible by {} steps per beat, rounding to {} ticks per step",
                session.ppq,
                spb,
                tps
            );
        }
        Ok(Self {
            pattern,
            session,
            loop_quantize: LoopQuantize::Beat,
            state: EngineState::new(tps),
            rng: StepRng::new(DEFAULT_RANDOM_SEED),
            cycle_steps: 0,
            dispatcher,
            updates: None,
            feedback: None,
        })
    }

    pub fn with_feedback(mut self, feedback: Sender<EngineFeedback>) -> Self {
        self.feedback = Some(feedback);
        self
    }

    pub fn with_updates(mut self, updates: Receiver<EngineUpdate>) -> Self {
        self.updates = Some(updates);
        self
    }

    pub fn with_loop_quantize(mut self, loop_quantize: LoopQuantize) -> Self {
        self.loop_quantize = loop_quantize;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StepRng::new(seed);
        self
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn playback(&self) -> PlaybackState {
        self.state.playback()
    }

    pub fn current_step(&self) -> usize {
        self.state.current_step
    }

    pub fn pattern(&self) -> &PatternSnapshot {
        &self.pattern
    }

    pub fn session(&self) -> &SessionConfig {
        &self.session
    }

    pub fn dispatcher(&self) -> &NoteDispatcher {
        &self.dispatcher
    }

    /// Give up the engine, keeping the dispatcher so queued notes can be drained.
    pub fn into_dispatcher(self) -> NoteDispatcher {
        self.dispatcher
    }

    pub fn handle(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Play => self.on_play(),
            TransportEvent::Stop => self.on_stop(),
            TransportEvent::Tick(tick) => self.on_tick(tick),
            TransportEvent::Beat(beat) => self.on_beat(beat),
        }
    }

    pub fn on_play(&mut self) {
        self.apply_updates();
        self.state.is_playing = true;
        self.on_division_or_tempo_changed();
        log::debug!(
            target: "engine",
            "play: {} steps, {:?}, {} ticks per step",
            self.pattern.length,
            self.pattern.direction,
            self.state.ticks_per_step
        );
        self.notify(EngineFeedback::Started);
        self.restart();
    }

    pub fn on_stop(&mut self) {
        self.apply_updates();
        if !self.state.is_playing {
            return;
        }
        // Position is kept so the last step stays observable
        self.state.is_playing = false;
        log::debug!(target: "engine", "stop at step {}", self.state.current_step);
        self.notify(EngineFeedback::Stopped);
    }

    pub fn on_tick(&mut self, tick: u64) {
        self.apply_updates();
        if !self.state.is_playing || self.state.pattern_completed {
            return;
        }
        self.state.tick_counter += 1;
        if self.state.tick_counter >= self.state.ticks_per_step {
            log::trace!(target: "engine", "step boundary at tick {}", tick);
            self.advance();
        }
    }

    pub fn on_beat(&mut self, beat: u64) {
        self.apply_updates();
        if !self.state.is_playing || !self.state.pattern_completed || !self.pattern.looping {
            return;
        }
        let on_grid = match self.loop_quantize {
            LoopQuantize::Beat => true,
            LoopQuantize::Bar => beat % self.session.beats_per_bar as u64 == 0,
        };
        if on_grid {
            log::debug!(target: "engine", "loop restart on beat {}", beat);
            self.notify(EngineFeedback::LoopRestarted);
            self.restart();
        }
    }

    /// Replace the pattern. The position is kept, clamped into the new length.
    pub fn set_pattern(&mut self, pattern: PatternSnapshot) {
        let length = pattern.length;
        let division_changed = pattern.division != self.pattern.division;
        self.pattern = pattern;
        if self.state.current_step >= length {
            self.state.current_step = length - 1;
        }
        if self.state.current_step == length - 1 {
            self.state.bounce_forward = false;
        }
        self.cycle_steps = self.cycle_steps.min(length);
        if division_changed {
            self.on_division_or_tempo_changed();
        }
    }

    pub fn set_session(&mut self, session: SessionConfig) -> Result<(), EngineError> {
        session.validate()?;
        self.session = session;
        self.on_division_or_tempo_changed();
        Ok(())
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.pattern = self.pattern.with_looping(looping);
    }

    /// Recompute `ticks_per_step` in place. Position is kept; an overrun
    /// counter is clamped so the next tick advances.
    pub fn on_division_or_tempo_changed(&mut self) {
        let spb = self.pattern.division.steps_per_beat();
        let tps = ticks_per_step(self.session.ppq, spb);
        if tps != self.state.ticks_per_step && self.session.ppq % spb != 0 {
            log::warn!(
                target: "engine",
                "{} ppq is not divisible by {} steps per beat, rounding to {} ticks per step",
                self.session.ppq,
                spb,
                tps
            );
        }
        self.state.ticks_per_step = tps;
        if self.state.tick_counter >= tps {
            self.state.tick_counter = tps - 1;
        }
    }

    /// Play a step's note now through the pad gate curve, whatever the transport is doing.
    /// Returns `false` if `step` is outside the pattern or the note was dropped.
    pub fn trigger_pad(&mut self, step: usize) -> bool {
        self.apply_updates();
        self.play_pad(step)
    }

    /// Another handle on the update queue, for threads that wait on it
    /// alongside transport events.
    pub fn update_receiver(&self) -> Option<Receiver<EngineUpdate>> {
        self.updates.clone()
    }

    /// Apply one queued update immediately.
    pub fn apply(&mut self, update: EngineUpdate) {
        match update {
            EngineUpdate::SetPattern(pattern) => self.set_pattern(pattern),
            EngineUpdate::SetSession(session) => {
                if let Err(e) = self.set_session(session) {
                    log::warn!(target: "engine", "ignoring session update: {}", e);
                }
            }
            EngineUpdate::SetLooping(looping) => self.set_looping(looping),
            EngineUpdate::TriggerPad(step) => {
                if !self.play_pad(step) {
                    log::debug!(target: "engine", "pad {} not played", step);
                }
            }
        }
    }

    fn apply_updates(&mut self) {
        while let Some(update) = self.updates.as_ref().and_then(|rx| rx.try_recv().ok()) {
            self.apply(update);
        }
    }

    fn play_pad(&self, step: usize) -> bool {
        let Some(s) = self.pattern.step(step).copied() else {
            return false;
        };
        let note = self.resolve_note(s.note);
        self.dispatcher
            .dispatch_step(note, s.velocity, s.gate, GateCurve::Pad)
    }

    /// Wall-clock length of a step as the clock actually plays it
    /// (`ticks_per_step` whole ticks).
    fn step_ms(&self) -> f64 {
        self.state.ticks_per_step as f64 * self.session.secs_per_tick() * 1000.0
    }

    fn restart(&mut self) {
        self.state.current_step = 0;
        self.state.tick_counter = 0;
        self.state.pattern_completed = false;
        self.state.bounce_forward = true;
        self.cycle_steps = 0;
        self.enter_step(0);
    }

    fn advance(&mut self) {
        self.state.tick_counter = 0;
        let length = self.pattern.length;
        let direction = self.pattern.direction;
        let current = self.state.current_step;
        let (next, bounce_forward) = next_step(
            current,
            length,
            direction,
            self.state.bounce_forward,
            &mut self.rng,
        );

        let ended = length <= 1
            || match direction {
                Direction::Forward => current == length - 1,
                Direction::Backward => next == 0,
                Direction::Bounce => !self.state.bounce_forward && next == 0,
                Direction::Random => self.cycle_steps >= length,
            };

        if ended {
            self.state.pattern_completed = true;
            if !self.pattern.looping {
                log::debug!(target: "engine", "one-shot pattern finished, holding step {}", current);
            }
            self.notify(EngineFeedback::PatternCompleted { step: current });
            return;
        }

        self.state.current_step = next;
        self.state.bounce_forward = bounce_forward;
        self.enter_step(next);
    }

    fn enter_step(&mut self, index: usize) {
        self.cycle_steps += 1;
        self.notify(EngineFeedback::StepAdvanced { step: index });

        let Some(step) = self.pattern.step(index).copied() else {
            return;
        };
        if !step.active {
            return;
        }
        let note = self.resolve_note(step.note);
        let step_ms = self.step_ms();
        log::trace!(target: "engine", "step {} note {}", index, note);
        self.dispatcher.dispatch_step(
            note,
            step.velocity,
            step.gate,
            GateCurve::Step { step_ms },
        );
    }

    fn resolve_note(&self, note: u8) -> u8 {
        map_note(
            note,
            self.pattern.scale_mask(),
            self.pattern.quantize,
            self.pattern.octave_shift,
        )
    }

    fn notify(&self, event: EngineFeedback) {
        if let Some(tx) = &self.feedback {
            // Feedback is advisory; a slow reader loses updates, never stalls ticks
            let _ = tx.try_send(event);
        }
    }
}

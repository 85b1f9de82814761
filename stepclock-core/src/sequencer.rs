//! Wiring of the running pieces: transport clock → sequencer thread → dispatcher → sink.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::Receiver;
use stepclock_audio::{
    spawn_sequencer_thread, update_channel, EngineError, EngineFeedback, EngineState,
    NoteDispatcher, PatternSnapshot, SoundSink, StepClockEngine, TransportClock, UpdateSender,
};
use stepclock_types::{SessionConfig, StepPattern};
use thiserror::Error;

use crate::config::{Config, ConfigError};

/// Transport events buffered between the clock and the engine thread.
const EVENT_QUEUE_CAPACITY: usize = 1024;
const FEEDBACK_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum SequencerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("failed to start note dispatcher: {0}")]
    Dispatcher(#[from] std::io::Error),
    #[error("sequencer thread panicked")]
    ThreadPanicked,
}

pub struct Sequencer {
    session: SessionConfig,
    clock: Option<TransportClock>,
    thread: Option<JoinHandle<StepClockEngine>>,
    updates: UpdateSender,
    feedback: Receiver<EngineFeedback>,
}

impl Sequencer {
    /// Validate `pattern` and the configured session, then start every thread.
    /// The transport is left stopped.
    pub fn start(
        config: &Config,
        pattern: StepPattern,
        sink: Arc<dyn SoundSink>,
    ) -> Result<Self, SequencerError> {
        let session = config.session()?;
        let snapshot = PatternSnapshot::new(pattern).map_err(EngineError::from)?;
        let dispatcher = NoteDispatcher::new(config.dispatch(), sink)?;

        let (feedback_tx, feedback) = crossbeam_channel::bounded(FEEDBACK_QUEUE_CAPACITY);
        let (updates, updates_rx) = update_channel();
        let engine = StepClockEngine::new(snapshot, session, dispatcher)?
            .with_feedback(feedback_tx)
            .with_updates(updates_rx)
            .with_loop_quantize(config.loop_quantize())
            .with_seed(config.random_seed());

        let (events_tx, events_rx) = crossbeam_channel::bounded(EVENT_QUEUE_CAPACITY);
        let thread = spawn_sequencer_thread(engine, events_rx)?;
        let clock = TransportClock::spawn(session, events_tx)?;

        log::info!(target: "engine", "sequencer ready: {}", session);

        Ok(Self {
            session,
            clock: Some(clock),
            thread: Some(thread),
            updates,
            feedback,
        })
    }

    pub fn play(&self) -> Result<(), SequencerError> {
        Ok(self.clock()?.play()?)
    }

    pub fn stop(&self) -> Result<(), SequencerError> {
        Ok(self.clock()?.stop()?)
    }

    /// Change tempo on both the clock and the engine (gate lengths follow the tempo).
    /// On error neither side has changed.
    pub fn set_bpm(&mut self, bpm: f32) -> Result<(), SequencerError> {
        let session = SessionConfig { bpm, ..self.session };
        session.validate().map_err(EngineError::from)?;
        let clock = self.clock()?;
        // Engine first: a full update queue must not leave the clock on the new tempo
        self.updates.set_session(session)?;
        if let Err(e) = clock.set_bpm(bpm) {
            if let Err(rollback) = self.updates.set_session(self.session) {
                log::error!(target: "engine", "could not restore tempo {}: {}", self.session.bpm, rollback);
            }
            return Err(e.into());
        }
        self.session = session;
        Ok(())
    }

    /// Play step `step` through the pad gate curve, whether or not the transport runs.
    pub fn trigger_pad(&self, step: usize) -> Result<(), SequencerError> {
        Ok(self.updates.trigger_pad(step)?)
    }

    pub fn session(&self) -> &SessionConfig {
        &self.session
    }

    /// Queue pattern edits, loop toggles and session changes for the engine thread.
    pub fn updates(&self) -> &UpdateSender {
        &self.updates
    }

    pub fn feedback(&self) -> &Receiver<EngineFeedback> {
        &self.feedback
    }

    /// Stop the clock, let the engine thread finish, drain notes in flight.
    /// Returns the engine's final state.
    pub fn shutdown(mut self) -> Result<EngineState, SequencerError> {
        self.shutdown_threads()
    }

    fn clock(&self) -> Result<&TransportClock, SequencerError> {
        self.clock
            .as_ref()
            .ok_or(SequencerError::Engine(EngineError::Disconnected))
    }

    fn shutdown_threads(&mut self) -> Result<EngineState, SequencerError> {
        if let Some(clock) = self.clock.take() {
            clock.shutdown();
        }
        let thread = self
            .thread
            .take()
            .ok_or(SequencerError::Engine(EngineError::Disconnected))?;
        let engine = thread.join().map_err(|_| SequencerError::ThreadPanicked)?;
        let state = engine.state();
        engine.into_dispatcher().shutdown();
        log::debug!(target: "engine", "sequencer shut down at step {}", state.current_step);
        Ok(state)
    }
}

impl Drop for Sequencer {
    fn drop(&mut self) {
        if self.thread.is_some() {
            if let Err(e) = self.shutdown_threads() {
                log::error!(target: "engine", "sequencer shutdown failed: {}", e);
            }
        }
    }
}

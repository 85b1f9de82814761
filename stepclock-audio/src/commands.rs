//! Messages into and out of the engine thread.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use stepclock_types::{SessionConfig, StepPattern};

use crate::snapshot::PatternSnapshot;
use crate::EngineError;

/// Capacity of the reconfiguration queue. Edits arrive at human speed.
const UPDATE_QUEUE_CAPACITY: usize = 64;

/// Pulses from the transport clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    Play,
    Stop,
    /// Ticks elapsed since play; the first tick after play is 1
    Tick(u64),
    /// Beats elapsed since play, sent after the tick that lands on it
    Beat(u64),
}

/// Reconfiguration applied at the top of the next engine handler.
#[derive(Debug, Clone)]
pub enum EngineUpdate {
    SetPattern(PatternSnapshot),
    SetSession(SessionConfig),
    SetLooping(bool),
    /// Play a step's note through the pad gate curve, transport running or not
    TriggerPad(usize),
}

/// Informational notifications from the engine thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineFeedback {
    Started,
    StepAdvanced { step: usize },
    /// The final step of the cycle finished; waiting for a beat (looping) or holding.
    PatternCompleted { step: usize },
    LoopRestarted,
    Stopped,
}

/// Handle for editing the running engine from another thread.
#[derive(Clone)]
pub struct UpdateSender {
    tx: Sender<EngineUpdate>,
}

pub fn update_channel() -> (UpdateSender, Receiver<EngineUpdate>) {
    let (tx, rx) = crossbeam_channel::bounded(UPDATE_QUEUE_CAPACITY);
    (UpdateSender { tx }, rx)
}

impl UpdateSender {
    /// Validate `pattern` on the caller's thread and queue it.
    pub fn set_pattern(&self, pattern: StepPattern) -> Result<(), EngineError> {
        let snapshot = PatternSnapshot::new(pattern)?;
        self.send(EngineUpdate::SetPattern(snapshot))
    }

    pub fn set_session(&self, session: SessionConfig) -> Result<(), EngineError> {
        session.validate()?;
        self.send(EngineUpdate::SetSession(session))
    }

    pub fn set_looping(&self, looping: bool) -> Result<(), EngineError> {
        self.send(EngineUpdate::SetLooping(looping))
    }

    pub fn trigger_pad(&self, step: usize) -> Result<(), EngineError> {
        self.send(EngineUpdate::TriggerPad(step))
    }

    fn send(&self, update: EngineUpdate) -> Result<(), EngineError> {
        self.tx.try_send(update).map_err(|e| match e {
            TrySendError::Full(_) => EngineError::UpdateQueueFull,
            TrySendError::Disconnected(_) => EngineError::Disconnected,
        })
    }
}

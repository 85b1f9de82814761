//! # stepclock-audio
//!
//! The real-time side of stepclock: a tick-driven step engine, direction and
//! scale resolution, and a bounded note dispatcher that talks to a `SoundSink`.
//!
//! Threads: `transport-clock` produces `TransportEvent`s, `sequencer` runs the
//! `StepClockEngine` handlers, `note-timer` sends timed note-on/note-off pairs.

pub mod clock;
pub mod commands;
pub mod direction;
pub mod dispatcher;
pub mod engine;
pub mod quantize;
pub mod sequencer_thread;
pub mod sink;
pub mod snapshot;
pub mod telemetry;

pub use clock::TransportClock;
pub use commands::{update_channel, EngineFeedback, EngineUpdate, TransportEvent, UpdateSender};
pub use dispatcher::{
    scale_velocity, DispatchConfig, DispatchMode, GateCurve, NoteDispatcher, NoteRequest,
};
pub use engine::{
    ticks_per_step, EngineError, EngineState, LoopQuantize, PlaybackState, StepClockEngine,
};
pub use sequencer_thread::spawn_sequencer_thread;
pub use sink::{SinkError, SinkOp, SinkResult, SoundSink, TestSink};
pub use snapshot::PatternSnapshot;

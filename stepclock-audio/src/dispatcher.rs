//! Note dispatch: turns a step's velocity/gate into a timed note-on/note-off pair.
//!
//! All waiting happens on a single `note-timer` thread that owns a min-heap of
//! events keyed by absolute fire time. The engine thread only pushes to a
//! bounded channel and never sleeps; when the channel or the heap is full the
//! note is dropped with a warning instead of blocking.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::sink::SoundSink;

pub const DEFAULT_LOOKAHEAD: Duration = Duration::from_millis(20);
pub const DEFAULT_LATENCY_COMPENSATION: Duration = Duration::from_millis(5);
/// Channel capacity between the engine thread and the timer thread.
/// At 64 steps per beat and 300 bpm that is 320 notes/sec; the timer drains faster.
pub const DEFAULT_QUEUE_CAPACITY: usize = 512;
pub const DEFAULT_MAX_PENDING: usize = 4096;

/// Shortest gate the step curve will produce.
const MIN_STEP_GATE_MS: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// Note-on sent from the calling thread, then note-off scheduled.
    Immediate,
    /// Both note-on and note-off scheduled `lookahead - latency_compensation` ahead.
    #[default]
    LookAhead,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchConfig {
    pub mode: DispatchMode,
    pub lookahead: Duration,
    pub latency_compensation: Duration,
    /// 0-based MIDI channel, fixed for the dispatcher's lifetime
    pub channel: u8,
    pub queue_capacity: usize,
    pub max_pending: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            mode: DispatchMode::LookAhead,
            lookahead: DEFAULT_LOOKAHEAD,
            latency_compensation: DEFAULT_LATENCY_COMPENSATION,
            channel: 0,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_pending: DEFAULT_MAX_PENDING,
        }
    }
}

/// Scale a 0-100 step velocity to MIDI 1-127.
pub fn scale_velocity(value: u8) -> u8 {
    ((value as f32 * 1.27).round() as i32).clamp(1, 127) as u8
}

/// Mapping from a 0-100 gate value to a note length.
///
/// Pads and automatic playback use different curves on purpose: a pad hit is
/// an absolute length, a sequenced step is a fraction of the step duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateCurve {
    /// Manual pad trigger: `10 + value * 4.9` ms (10-500 ms).
    Pad,
    /// Automatic step playback: `step_ms * value / 100`, at least 5 ms.
    Step { step_ms: f64 },
}

impl GateCurve {
    pub fn gate(&self, value: u8) -> Duration {
        let value = value.min(100) as f64;
        let ms = match *self {
            GateCurve::Pad => 10.0 + value * 4.9,
            GateCurve::Step { step_ms } => (step_ms * value / 100.0).max(MIN_STEP_GATE_MS),
        };
        Duration::from_secs_f64(ms / 1000.0)
    }
}

/// A fully resolved note ready to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteRequest {
    pub note: u8,
    /// MIDI velocity, 1-127
    pub velocity: u8,
    pub gate: Duration,
}

enum TimerMsg {
    Note {
        note: u8,
        velocity: u8,
        /// `None` when the note-on was already sent (immediate mode)
        on_at: Option<Instant>,
        off_at: Instant,
    },
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NoteEvent {
    On { note: u8, velocity: u8 },
    Off { note: u8 },
}

#[derive(Debug, PartialEq, Eq)]
struct TimedEvent {
    at: Instant,
    seq: u64,
    event: NoteEvent,
}

// Reversed so BinaryHeap pops the earliest event; seq keeps insertion order on ties.
impl Ord for TimedEvent {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for TimedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

pub struct NoteDispatcher {
    config: DispatchConfig,
    sink: Arc<dyn SoundSink>,
    tx: Sender<TimerMsg>,
    pending: Arc<AtomicUsize>,
    handle: Option<JoinHandle<()>>,
}

impl NoteDispatcher {
    /// Spawn the timer thread. Fails only if the OS refuses a new thread.
    pub fn new(config: DispatchConfig, sink: Arc<dyn SoundSink>) -> std::io::Result<Self> {
        let config = DispatchConfig {
            channel: config.channel.min(15),
            queue_capacity: config.queue_capacity.max(1),
            max_pending: config.max_pending.max(2),
            ..config
        };
        let (tx, rx) = crossbeam_channel::bounded::<TimerMsg>(config.queue_capacity);
        let pending = Arc::new(AtomicUsize::new(0));

        let timer = NoteTimer {
            rx,
            sink: Arc::clone(&sink),
            channel: config.channel,
            max_pending: config.max_pending,
            pending: Arc::clone(&pending),
        };
        let handle = thread::Builder::new()
            .name("note-timer".into())
            .spawn(move || timer.run())?;

        log::debug!(
            target: "dispatch",
            "note dispatcher started: mode={:?} lookahead={:?} latency_compensation={:?} channel={}",
            config.mode,
            config.lookahead,
            config.latency_compensation,
            config.channel + 1
        );

        Ok(Self {
            config,
            sink,
            tx,
            pending,
            handle: Some(handle),
        })
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Events queued on the timer thread and not yet sent.
    pub fn pending_events(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    /// Dispatch one note. Never blocks; returns `false` if the note was dropped.
    pub fn dispatch(&self, request: NoteRequest) -> bool {
        match self.config.mode {
            DispatchMode::LookAhead => {
                let on_at = Instant::now()
                    + self
                        .config
                        .lookahead
                        .saturating_sub(self.config.latency_compensation);
                self.queue(TimerMsg::Note {
                    note: request.note,
                    velocity: request.velocity,
                    on_at: Some(on_at),
                    off_at: on_at + request.gate,
                })
            }
            DispatchMode::Immediate => {
                if let Err(e) = self
                    .sink
                    .note_on(self.config.channel, request.note, request.velocity)
                {
                    log::warn!(target: "dispatch", "note-on {} failed: {}", request.note, e);
                }
                // The release is timed from when the note actually started
                let queued = self.queue(TimerMsg::Note {
                    note: request.note,
                    velocity: request.velocity,
                    on_at: None,
                    off_at: Instant::now() + request.gate,
                });
                if !queued {
                    // Cut the note short rather than leave it hanging
                    if let Err(e) = self.sink.note_off(self.config.channel, request.note) {
                        log::warn!(target: "dispatch", "note-off {} failed: {}", request.note, e);
                    }
                }
                queued
            }
        }
    }

    /// Dispatch from raw step values (velocity and gate 0-100).
    pub fn dispatch_step(&self, note: u8, velocity: u8, gate: u8, curve: GateCurve) -> bool {
        self.dispatch(NoteRequest {
            note,
            velocity: scale_velocity(velocity),
            gate: curve.gate(gate),
        })
    }

    /// Stop accepting notes, let queued events fire at their due time, and join the timer thread.
    pub fn shutdown(mut self) {
        let _ = self.tx.send(TimerMsg::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!(target: "dispatch", "note timer thread panicked");
            }
        }
    }

    fn queue(&self, msg: TimerMsg) -> bool {
        match self.tx.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::warn!(target: "dispatch", "note queue full, dropping note");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                log::error!(target: "dispatch", "note timer thread is gone, dropping note");
                false
            }
        }
    }
}

impl Drop for NoteDispatcher {
    fn drop(&mut self) {
        // Detach: notes already in flight still sound and release on time
        if self.handle.take().is_some() {
            let _ = self.tx.try_send(TimerMsg::Shutdown);
        }
    }
}

struct NoteTimer {
    rx: Receiver<TimerMsg>,
    sink: Arc<dyn SoundSink>,
    channel: u8,
    max_pending: usize,
    pending: Arc<AtomicUsize>,
}

impl NoteTimer {
    fn run(self) {
        let mut queue: BinaryHeap<TimedEvent> = BinaryHeap::new();
        let mut seq: u64 = 0;
        let mut draining = false;

        loop {
            let now = Instant::now();
            while queue.peek().is_some_and(|e| e.at <= now) {
                if let Some(due) = queue.pop() {
                    self.pending.fetch_sub(1, Ordering::Relaxed);
                    self.fire(due.event);
                }
            }

            let next_at = queue.peek().map(|e| e.at);
            let msg = if draining {
                match next_at {
                    Some(at) => {
                        thread::sleep(at.saturating_duration_since(Instant::now()));
                        continue;
                    }
                    None => break,
                }
            } else {
                let received = match next_at {
                    Some(at) => self.rx.recv_deadline(at),
                    None => self.rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
                };
                match received {
                    Ok(msg) => msg,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => {
                        draining = true;
                        continue;
                    }
                }
            };

            match msg {
                TimerMsg::Shutdown => draining = true,
                TimerMsg::Note {
                    note,
                    velocity,
                    on_at,
                    off_at,
                } => {
                    if let Some(on_at) = on_at {
                        if queue.len() + 2 > self.max_pending {
                            log::warn!(
                                target: "dispatch",
                                "{} events pending, dropping note {}",
                                queue.len(),
                                note
                            );
                            continue;
                        }
                        queue.push(TimedEvent {
                            at: on_at,
                            seq,
                            event: NoteEvent::On { note, velocity },
                        });
                        seq += 1;
                        self.pending.fetch_add(1, Ordering::Relaxed);
                    }
                    // A release is always accepted: its note-on may already be sounding
                    queue.push(TimedEvent {
                        at: off_at,
                        seq,
                        event: NoteEvent::Off { note },
                    });
                    seq += 1;
                    self.pending.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        log::debug!(target: "dispatch", "note timer thread exiting");
    }

    fn fire(&self, event: NoteEvent) {
        let result = match event {
            NoteEvent::On { note, velocity } => self.sink.note_on(self.channel, note, velocity),
            NoteEvent::Off { note } => self.sink.note_off(self.channel, note),
        };
        if let Err(e) = result {
            log::warn!(target: "dispatch", "{:?} failed: {}", event, e);
        }
    }
}

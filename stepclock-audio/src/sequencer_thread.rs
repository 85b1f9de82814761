//! The tick-processing thread: owns the engine and runs every handler in order.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;

use crate::commands::TransportEvent;
use crate::engine::{EngineError, StepClockEngine};
use crate::telemetry::TickTelemetry;

/// Ticks between telemetry summaries in the debug log.
const TELEMETRY_INTERVAL_TICKS: u64 = 960;

/// Run `engine` on a dedicated thread until every sender of `events` is dropped.
/// Queued engine updates are applied as they arrive, between transport events.
/// The join handle yields the engine back so its dispatcher can be drained.
pub fn spawn_sequencer_thread(
    engine: StepClockEngine,
    events: Receiver<TransportEvent>,
) -> Result<JoinHandle<StepClockEngine>, EngineError> {
    thread::Builder::new()
        .name("sequencer".into())
        .spawn(move || run(engine, events))
        .map_err(|e| EngineError::Spawn {
            thread: "sequencer",
            reason: e.to_string(),
        })
}

fn run(mut engine: StepClockEngine, events: Receiver<TransportEvent>) -> StepClockEngine {
    let mut telemetry = TickTelemetry::new();
    let mut ticks: u64 = 0;
    // Updates also wake the thread so pad hits sound while the transport is stopped
    let mut updates = engine
        .update_receiver()
        .unwrap_or_else(crossbeam_channel::never);
    let mut updates_closed = false;

    loop {
        crossbeam_channel::select! {
            recv(events) -> result => {
                let Ok(event) = result else {
                    break;
                };
                let started = Instant::now();
                engine.handle(event);

                if let TransportEvent::Tick(_) = event {
                    let budget = Duration::from_secs_f64(engine.session().secs_per_tick());
                    telemetry.record(started.elapsed(), budget);
                    ticks += 1;
                    if ticks % TELEMETRY_INTERVAL_TICKS == 0 {
                        let s = telemetry.take_summary();
                        log::debug!(
                            target: "engine",
                            "tick handler avg={}us max={}us p95={}us overruns={} pending_notes={}",
                            s.avg_us,
                            s.max_us,
                            s.p95_us,
                            s.overruns,
                            engine.dispatcher().pending_events()
                        );
                    }
                }
            }
            recv(updates) -> result => match result {
                Ok(update) => engine.apply(update),
                Err(_) => updates_closed = true,
            },
        }
        if updates_closed {
            // Every UpdateSender is gone; keep serving transport events
            updates = crossbeam_channel::never();
            updates_closed = false;
        }
    }
    log::debug!(target: "engine", "transport closed, sequencer thread exiting");
    engine
}

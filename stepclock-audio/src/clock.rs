//! Internal transport clock.
//!
//! A dedicated thread emitting `Play`, `Tick(n)`, `Beat(b)` and `Stop` at the
//! session tempo. Tick deadlines are absolute (`next += period`), so sleep
//! jitter does not accumulate into tempo drift.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use stepclock_types::{SessionConfig, SessionError};

use crate::commands::TransportEvent;
use crate::EngineError;

/// Behind schedule by more than this many ticks: resync instead of bursting.
const MAX_TICK_BACKLOG: u32 = 24;

enum ClockCmd {
    Play,
    Stop,
    SetBpm(f32),
    Shutdown,
}

pub struct TransportClock {
    cmd_tx: Sender<ClockCmd>,
    handle: Option<JoinHandle<()>>,
}

impl TransportClock {
    /// Start the clock thread, stopped. Events go to `events` with a blocking send,
    /// so a bounded channel applies backpressure rather than losing ticks.
    pub fn spawn(
        session: SessionConfig,
        events: Sender<TransportEvent>,
    ) -> Result<Self, EngineError> {
        session.validate()?;
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let handle = thread::Builder::new()
            .name("transport-clock".into())
            .spawn(move || run_clock(session, cmd_rx, events))
            .map_err(|e| EngineError::Spawn {
                thread: "transport-clock",
                reason: e.to_string(),
            })?;
        Ok(Self {
            cmd_tx,
            handle: Some(handle),
        })
    }

    pub fn play(&self) -> Result<(), EngineError> {
        self.send(ClockCmd::Play)
    }

    pub fn stop(&self) -> Result<(), EngineError> {
        self.send(ClockCmd::Stop)
    }

    pub fn set_bpm(&self, bpm: f32) -> Result<(), EngineError> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(SessionError::InvalidTempo(bpm).into());
        }
        self.send(ClockCmd::SetBpm(bpm))
    }

    /// Stop (emitting `Stop` if playing) and join the clock thread.
    pub fn shutdown(mut self) {
        let _ = self.cmd_tx.send(ClockCmd::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!(target: "clock", "transport clock thread panicked");
            }
        }
    }

    fn send(&self, cmd: ClockCmd) -> Result<(), EngineError> {
        self.cmd_tx.send(cmd).map_err(|_| EngineError::Disconnected)
    }
}

impl Drop for TransportClock {
    fn drop(&mut self) {
        if self.handle.take().is_some() {
            let _ = self.cmd_tx.send(ClockCmd::Shutdown);
        }
    }
}

fn tick_period(session: &SessionConfig) -> Duration {
    Duration::from_secs_f64(session.secs_per_tick())
}

fn run_clock(mut session: SessionConfig, cmd_rx: Receiver<ClockCmd>, events: Sender<TransportEvent>) {
    let mut period = tick_period(&session);
    let ppq = session.ppq as u64;
    let mut playing = false;
    let mut tick: u64 = 0;
    let mut next_at = Instant::now();

    log::debug!(target: "clock", "transport clock ready: {} bpm, {} ppq", session.bpm, session.ppq);

    loop {
        let cmd = if playing {
            match cmd_rx.recv_deadline(next_at) {
                Ok(cmd) => Some(cmd),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        } else {
            match cmd_rx.recv() {
                Ok(cmd) => Some(cmd),
                Err(_) => break,
            }
        };

        let sent = match cmd {
            Some(ClockCmd::Play) => {
                if playing {
                    continue;
                }
                playing = true;
                tick = 0;
                next_at = Instant::now() + period;
                log::info!(target: "clock", "play at {} bpm", session.bpm);
                events.send(TransportEvent::Play).is_ok()
            }
            Some(ClockCmd::Stop) => {
                if !playing {
                    continue;
                }
                playing = false;
                log::info!(target: "clock", "stop after {} ticks", tick);
                events.send(TransportEvent::Stop).is_ok()
            }
            Some(ClockCmd::SetBpm(bpm)) => {
                session.bpm = bpm;
                period = tick_period(&session);
                log::debug!(target: "clock", "tempo set to {} bpm", bpm);
                true
            }
            Some(ClockCmd::Shutdown) => {
                if playing {
                    let _ = events.send(TransportEvent::Stop);
                }
                break;
            }
            None => {
                tick += 1;
                let mut ok = events.send(TransportEvent::Tick(tick)).is_ok();
                if ok && tick % ppq == 0 {
                    ok = events.send(TransportEvent::Beat(tick / ppq)).is_ok();
                }
                next_at += period;
                let now = Instant::now();
                if now > next_at + period * MAX_TICK_BACKLOG {
                    log::warn!(
                        target: "clock",
                        "transport clock fell {:?} behind, resyncing",
                        now - next_at
                    );
                    next_at = now + period;
                }
                ok
            }
        };

        if !sent {
            log::debug!(target: "clock", "event receiver gone");
            break;
        }
    }
    log::debug!(target: "clock", "transport clock thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_session() -> SessionConfig {
        // 1200 bpm at 4 ppq: 12.5 ms per tick
        SessionConfig::new(1200.0, 4, 4).unwrap()
    }

    #[test]
    fn emits_ticks_then_beats() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let clock = TransportClock::spawn(fast_session(), tx).unwrap();
        clock.play().unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.recv_timeout(Duration::from_secs(2)) {
            events.push(event);
            if event == TransportEvent::Beat(2) {
                break;
            }
        }
        clock.shutdown();

        let mut expected = vec![TransportEvent::Play];
        for t in 1..=8 {
            expected.push(TransportEvent::Tick(t));
            if t % 4 == 0 {
                expected.push(TransportEvent::Beat(t / 4));
            }
        }
        assert_eq!(events, expected);
        // shutdown while playing emits a final Stop
        assert_eq!(rx.try_iter().last(), Some(TransportEvent::Stop));
    }

    #[test]
    fn stop_then_play_restarts_count() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let clock = TransportClock::spawn(fast_session(), tx).unwrap();
        clock.play().unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)), Ok(TransportEvent::Play));
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)), Ok(TransportEvent::Tick(1)));
        clock.stop().unwrap();
        // drain whatever was in flight before the stop
        let mut event = rx.recv_timeout(Duration::from_secs(1));
        while matches!(event, Ok(TransportEvent::Tick(_)) | Ok(TransportEvent::Beat(_))) {
            event = rx.recv_timeout(Duration::from_secs(1));
        }
        assert_eq!(event, Ok(TransportEvent::Stop));

        clock.play().unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)), Ok(TransportEvent::Play));
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)), Ok(TransportEvent::Tick(1)));
        clock.shutdown();
    }

    #[test]
    fn tick_spacing_follows_tempo() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let clock = TransportClock::spawn(fast_session(), tx).unwrap();
        let start = Instant::now();
        clock.play().unwrap();
        loop {
            match rx.recv_timeout(Duration::from_secs(2)) {
                Ok(TransportEvent::Tick(8)) => break,
                Ok(_) => {}
                Err(e) => panic!("clock stalled: {e}"),
            }
        }
        // 8 ticks at 12.5 ms
        assert!(start.elapsed() >= Duration::from_millis(100));
        clock.shutdown();
    }

    #[test]
    fn rejects_invalid_tempo() {
        let (tx, _rx) = crossbeam_channel::unbounded();
        let clock = TransportClock::spawn(fast_session(), tx).unwrap();
        assert!(matches!(
            clock.set_bpm(0.0),
            Err(EngineError::Session(SessionError::InvalidTempo(_)))
        ));
        assert!(clock.set_bpm(90.0).is_ok());
        clock.shutdown();
    }

    #[test]
    fn rejects_invalid_session() {
        let (tx, _rx) = crossbeam_channel::unbounded();
        let session = SessionConfig {
            ppq: 0,
            ..SessionConfig::default()
        };
        assert!(matches!(
            TransportClock::spawn(session, tx),
            Err(EngineError::Session(SessionError::ZeroPpq))
        ));
    }
}

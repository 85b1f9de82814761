mod common;

use std::sync::Arc;
use std::time::Duration;

use common::ascending;
use stepclock_audio::{
    spawn_sequencer_thread, DispatchConfig, EngineFeedback, NoteDispatcher, PatternSnapshot,
    SinkOp, StepClockEngine, TestSink, TransportClock,
};
use stepclock_types::{Direction, SessionConfig};

#[test]
fn clock_engine_and_dispatcher_play_a_full_loop() {
    // 480 bpm at 24 ppq: 125 ms per beat, 31.25 ms per 16th step
    let session = SessionConfig::new(480.0, 24, 4).unwrap();
    let sink = Arc::new(TestSink::new());
    let dispatcher = NoteDispatcher::new(DispatchConfig::default(), sink.clone()).unwrap();
    let (feedback_tx, feedback_rx) = crossbeam_channel::unbounded();
    let engine = StepClockEngine::new(
        PatternSnapshot::new(ascending(4, Direction::Forward)).unwrap(),
        session,
        dispatcher,
    )
    .unwrap()
    .with_feedback(feedback_tx);

    let (events_tx, events_rx) = crossbeam_channel::bounded(256);
    let sequencer = spawn_sequencer_thread(engine, events_rx).unwrap();
    let clock = TransportClock::spawn(session, events_tx).unwrap();
    clock.play().unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = feedback_rx.recv_timeout(Duration::from_secs(3)) {
        seen.push(event);
        if event == EngineFeedback::LoopRestarted {
            break;
        }
    }
    clock.shutdown();
    let engine = sequencer.join().unwrap();
    engine.into_dispatcher().shutdown();

    assert_eq!(seen.first(), Some(&EngineFeedback::Started));
    assert!(seen.contains(&EngineFeedback::PatternCompleted { step: 3 }));
    assert_eq!(seen.last(), Some(&EngineFeedback::LoopRestarted));

    let notes = sink.notes_on();
    assert!(notes.len() >= 5, "got {:?}", notes);
    assert_eq!(&notes[..5], &[60, 61, 62, 63, 60]);

    // every note-on has a matching note-off once the timer has drained
    let ops = sink.operations();
    let ons = ops.iter().filter(|op| matches!(op, SinkOp::NoteOn { .. })).count();
    let offs = ops.iter().filter(|op| matches!(op, SinkOp::NoteOff { .. })).count();
    assert_eq!(ons, offs);
}

#[test]
fn sequencer_thread_returns_engine_when_transport_closes() {
    let sink = Arc::new(TestSink::new());
    let dispatcher = NoteDispatcher::new(DispatchConfig::default(), sink.clone()).unwrap();
    let engine = StepClockEngine::new(
        PatternSnapshot::new(ascending(4, Direction::Forward)).unwrap(),
        SessionConfig::default(),
        dispatcher,
    )
    .unwrap();

    let (tx, rx) = crossbeam_channel::unbounded();
    let handle = spawn_sequencer_thread(engine, rx).unwrap();
    tx.send(stepclock_audio::TransportEvent::Play).unwrap();
    for t in 1..=6 {
        tx.send(stepclock_audio::TransportEvent::Tick(t)).unwrap();
    }
    drop(tx);

    let engine = handle.join().unwrap();
    assert_eq!(engine.current_step(), 1);
    engine.into_dispatcher().shutdown();
    assert_eq!(sink.notes_on(), vec![60, 61]);
}

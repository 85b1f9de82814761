use stepclock_audio::{SinkResult, SoundSink};
use stepclock_types::midi_note_name;

/// Writes notes to the log instead of a device. Used when no MIDI output is available.
#[derive(Debug, Default)]
pub struct LogSink;

impl SoundSink for LogSink {
    fn note_on(&self, channel: u8, note: u8, velocity: u8) -> SinkResult {
        log::info!(
            target: "sink",
            "ch{} note on  {:>4} ({}) vel {}",
            channel + 1,
            midi_note_name(note),
            note,
            velocity
        );
        Ok(())
    }

    fn note_off(&self, channel: u8, note: u8) -> SinkResult {
        log::debug!(
            target: "sink",
            "ch{} note off {:>4} ({})",
            channel + 1,
            midi_note_name(note),
            note
        );
        Ok(())
    }
}

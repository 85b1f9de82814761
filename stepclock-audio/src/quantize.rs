//! Scale quantization and octave shifting of step notes.

use stepclock_types::ScaleMask;

const MIDI_MAX: i16 = 127;

/// Snap `note` to the nearest pitch in `scale`. Equidistant candidates resolve
/// to the lower tone. Candidates outside 0..=127 are skipped, so the result is
/// always a valid MIDI note that belongs to the scale.
pub fn quantize(note: u8, scale: &ScaleMask, enabled: bool) -> u8 {
    if !enabled {
        return note;
    }
    let note = note.min(MIDI_MAX as u8) as i16;
    for distance in 0..12i16 {
        let below = note - distance;
        if below >= 0 && scale.contains(below as u8 % 12) {
            return below as u8;
        }
        let above = note + distance;
        if above <= MIDI_MAX && scale.contains(above as u8 % 12) {
            return above as u8;
        }
    }
    // Unreachable for a non-empty mask: every pitch class occurs within 12 semitones
    note as u8
}

/// Shift by whole octaves and clamp into 0..=127.
pub fn apply_octave(note: u8, shift: i8) -> u8 {
    (note as i16 + shift as i16 * 12).clamp(0, MIDI_MAX) as u8
}

/// Octave shift first, then quantization, so the emitted note is in range and in scale.
pub fn map_note(note: u8, scale: Option<&ScaleMask>, enabled: bool, octave_shift: i8) -> u8 {
    let shifted = apply_octave(note, octave_shift);
    match scale {
        Some(mask) => quantize(shifted, mask, enabled),
        None => shifted,
    }
}

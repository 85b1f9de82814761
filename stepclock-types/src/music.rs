use serde::{Deserialize, Serialize};

/// Musical key (pitch class of the scale root)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Key {
    #[default]
    C,
    Cs,
    D,
    Ds,
    E,
    F,
    Fs,
    G,
    Gs,
    A,
    As,
    B,
}

impl Key {
    pub const ALL: [Key; 12] = [
        Key::C,
        Key::Cs,
        Key::D,
        Key::Ds,
        Key::E,
        Key::F,
        Key::Fs,
        Key::G,
        Key::Gs,
        Key::A,
        Key::As,
        Key::B,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Key::C => "C",
            Key::Cs => "C#",
            Key::D => "D",
            Key::Ds => "D#",
            Key::E => "E",
            Key::F => "F",
            Key::Fs => "F#",
            Key::G => "G",
            Key::Gs => "G#",
            Key::A => "A",
            Key::As => "A#",
            Key::B => "B",
        }
    }

    /// Pitch class, 0 (C) through 11 (B)
    pub fn semitone(&self) -> u8 {
        Key::ALL
            .iter()
            .position(|k| k == self)
            .unwrap_or(0) as u8
    }

    /// Parse "C", "C#" or "Cs" style names.
    pub fn parse(s: &str) -> Option<Key> {
        match s {
            "C" => Some(Key::C),
            "C#" | "Cs" => Some(Key::Cs),
            "D" => Some(Key::D),
            "D#" | "Ds" => Some(Key::Ds),
            "E" => Some(Key::E),
            "F" => Some(Key::F),
            "F#" | "Fs" => Some(Key::Fs),
            "G" => Some(Key::G),
            "G#" | "Gs" => Some(Key::Gs),
            "A" => Some(Key::A),
            "A#" | "As" => Some(Key::As),
            "B" => Some(Key::B),
            _ => None,
        }
    }
}

/// Scale definition as intervals from root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scale {
    Major,
    Minor,
    Dorian,
    Phrygian,
    Lydian,
    Mixolydian,
    Locrian,
    HarmonicMinor,
    Pentatonic,
    MinorPentatonic,
    Blues,
    Chromatic,
}

impl Scale {
    pub const ALL: [Scale; 12] = [
        Scale::Major,
        Scale::Minor,
        Scale::Dorian,
        Scale::Phrygian,
        Scale::Lydian,
        Scale::Mixolydian,
        Scale::Locrian,
        Scale::HarmonicMinor,
        Scale::Pentatonic,
        Scale::MinorPentatonic,
        Scale::Blues,
        Scale::Chromatic,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Scale::Major => "Major",
            Scale::Minor => "Minor",
            Scale::Dorian => "Dorian",
            Scale::Phrygian => "Phrygian",
            Scale::Lydian => "Lydian",
            Scale::Mixolydian => "Mixolydian",
            Scale::Locrian => "Locrian",
            Scale::HarmonicMinor => "Harmonic Minor",
            Scale::Pentatonic => "Pentatonic",
            Scale::MinorPentatonic => "Minor Pentatonic",
            Scale::Blues => "Blues",
            Scale::Chromatic => "Chromatic",
        }
    }

    /// Semitone intervals from root for this scale
    pub fn intervals(&self) -> &'static [u8] {
        match self {
            Scale::Major => &[0, 2, 4, 5, 7, 9, 11],
            Scale::Minor => &[0, 2, 3, 5, 7, 8, 10],
            Scale::Dorian => &[0, 2, 3, 5, 7, 9, 10],
            Scale::Phrygian => &[0, 1, 3, 5, 7, 8, 10],
            Scale::Lydian => &[0, 2, 4, 6, 7, 9, 11],
            Scale::Mixolydian => &[0, 2, 4, 5, 7, 9, 10],
            Scale::Locrian => &[0, 1, 3, 5, 6, 8, 10],
            Scale::HarmonicMinor => &[0, 2, 3, 5, 7, 8, 11],
            Scale::Pentatonic => &[0, 2, 4, 7, 9],
            Scale::MinorPentatonic => &[0, 3, 5, 7, 10],
            Scale::Blues => &[0, 3, 5, 6, 7, 10],
            Scale::Chromatic => &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
        }
    }

    /// Lookup by display name, ignoring case, spaces, dashes and underscores.
    pub fn parse(s: &str) -> Option<Scale> {
        fn squash(s: &str) -> String {
            s.chars()
                .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
                .collect()
        }
        let wanted = squash(s);
        Scale::ALL
            .iter()
            .copied()
            .find(|scale| squash(scale.name()).eq_ignore_ascii_case(&wanted))
    }
}

/// The twelve pitch classes allowed by a scale transposed to a root.
///
/// Bit `n` is set when pitch class `n` (0 = C) belongs to the scale. A mask is
/// never empty; the only constructors either start from a `Scale`, which always
/// contains its root, or reject an empty bit set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScaleMask(u16);

impl ScaleMask {
    const ALL_BITS: u16 = 0x0FFF;

    pub fn new(root: Key, scale: Scale) -> Self {
        let root = root.semitone();
        let bits = scale
            .intervals()
            .iter()
            .fold(0u16, |acc, &i| acc | 1 << ((root + i) % 12));
        Self(bits)
    }

    /// Build from raw pitch-class bits. Returns `None` for an empty mask.
    pub fn from_bits(bits: u16) -> Option<Self> {
        let bits = bits & Self::ALL_BITS;
        if bits == 0 {
            None
        } else {
            Some(Self(bits))
        }
    }

    pub fn contains(&self, pitch_class: u8) -> bool {
        self.0 & (1 << (pitch_class % 12)) != 0
    }

    /// Number of pitch classes in the mask, 1-12.
    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

pub fn midi_note_name(note: u8) -> String {
    let key = Key::ALL[(note % 12) as usize];
    let octave = (note / 12) as i32 - 1;
    format!("{}{}", key.name(), octave)
}

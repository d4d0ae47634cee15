//! Chord symbols as consumed by the generator. Parsing chord text is not done here.

use serde::{Deserialize, Deserializer, Serialize};

use crate::Position;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "Eb", "E", "F", "F#", "G", "Ab", "A", "Bb", "B",
];

/// A chord symbol: root pitch class (0 = C) plus a quality suffix like `m7` or `maj7`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChordSymbol {
    /// Always a pitch class, `0..12`.
    #[serde(deserialize_with = "pitch_class")]
    root: u8,
    pub quality: String,
}

fn pitch_class<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    Ok(u8::deserialize(deserializer)? % 12)
}

impl ChordSymbol {
    pub fn new(root: u8, quality: impl Into<String>) -> Self {
        Self {
            root: root % 12,
            quality: quality.into(),
        }
    }

    pub fn root(&self) -> u8 {
        self.root
    }

    pub fn name(&self) -> String {
        format!("{}{}", NOTE_NAMES[self.root as usize], self.quality)
    }

    /// Intervals above the root, in semitones.
    pub fn intervals(&self) -> &'static [u8] {
        match self.quality.as_str() {
            "m" | "min" => &[0, 3, 7],
            "m7" | "min7" => &[0, 3, 7, 10],
            "m6" => &[0, 3, 7, 9],
            "7" => &[0, 4, 7, 10],
            "maj7" | "M7" => &[0, 4, 7, 11],
            "6" => &[0, 4, 7, 9],
            "dim" => &[0, 3, 6],
            "dim7" => &[0, 3, 6, 9],
            "m7b5" => &[0, 3, 6, 10],
            "sus4" => &[0, 5, 7],
            "7sus4" => &[0, 5, 7, 10],
            "aug" | "+" => &[0, 4, 8],
            _ => &[0, 4, 7],
        }
    }

    /// Absolute MIDI pitches of the chord tones with the root at `base_pitch`'s octave.
    pub fn pitches_from(&self, base_pitch: u8) -> Vec<u8> {
        let root = (base_pitch.min(127) / 12) as u16 * 12 + self.root as u16;
        self.intervals()
            .iter()
            .map(|i| (root + *i as u16).min(127) as u8)
            .collect()
    }
}

impl std::fmt::Display for ChordSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A chord symbol placed in the chord leadsheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordEvent {
    /// Leadsheet position (bar index in the leadsheet, not in the song).
    pub position: Position,
    pub chord: ChordSymbol,
}

impl ChordEvent {
    pub fn new(position: Position, chord: ChordSymbol) -> Self {
        Self { position, chord }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chord_names() {
        assert_eq!(ChordSymbol::new(0, "maj7").name(), "Cmaj7");
        assert_eq!(ChordSymbol::new(10, "7").name(), "Bb7");
        assert_eq!(ChordSymbol::new(14, "m").name(), "Dm");
    }

    #[test]
    fn pitches_follow_quality() {
        let am7 = ChordSymbol::new(9, "m7");
        assert_eq!(am7.pitches_from(60), vec![69, 72, 76, 79]);
    }

    #[test]
    fn deserialized_root_is_a_pitch_class() {
        let chord: ChordSymbol = serde_json::from_str(r#"{"root":200,"quality":"7"}"#).unwrap();
        assert_eq!(chord.root(), 200 % 12);
        assert_eq!(chord.pitches_from(60), vec![68, 72, 75, 78]);
    }

    #[test]
    fn high_base_pitch_is_clamped() {
        assert_eq!(ChordSymbol::new(11, "maj7").pitches_from(125), vec![127, 127, 127, 127]);
    }

    #[test]
    fn unknown_quality_falls_back_to_major_triad() {
        assert_eq!(ChordSymbol::new(0, "13#11").intervals(), &[0, 4, 7]);
    }
}

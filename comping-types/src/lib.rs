//! # comping-types
//!
//! Shared data definitions for the comping playback core: song structure,
//! chord leadsheet, rhythms, MIDI mix, phrases and the bar/beat/tick ranges
//! they are measured in. Plain data only; observation and scheduling live in
//! comping-core.

mod chord;
mod midi_mix;
mod phrase;
mod position;
mod range;
mod rhythm;
mod song;
mod time_signature;

pub use chord::{ChordEvent, ChordSymbol};
pub use midi_mix::{DrumKeyMap, Instrument, InstrumentMix, MidiMix, DRUMS_CHANNEL};
pub use phrase::{NoteEvent, Phrase};
pub use position::Position;
pub use range::{FloatRange, IntRange, LongRange};
pub use rhythm::{Rhythm, RhythmVoice, RhythmVoiceId, VoiceKind};
pub use song::{ChordLeadSheet, Section, Song, SongPart};
pub use time_signature::TimeSignature;

/// Tick resolution: pulses per quarter note.
pub const PPQ_RESOLUTION: i64 = 960;

/// Convert a position in natural beats to ticks, rounding to the nearest tick.
pub fn beats_to_ticks(beats: f64) -> i64 {
    (beats * PPQ_RESOLUTION as f64).round() as i64
}

pub fn ticks_to_beats(ticks: i64) -> f64 {
    ticks as f64 / PPQ_RESOLUTION as f64
}

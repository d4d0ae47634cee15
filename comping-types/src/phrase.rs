//! Phrases: time-ordered note events for one voice.

use serde::{Deserialize, Serialize};

use crate::FloatRange;

/// Note positions and durations are in natural beats, relative to the start
/// of the song context the phrase was generated for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub pitch: u8,
    pub velocity: u8,
    pub position: f64,
    pub duration: f64,
}

impl NoteEvent {
    pub fn new(pitch: u8, velocity: u8, position: f64, duration: f64) -> Self {
        Self {
            pitch: pitch.min(127),
            velocity: velocity.clamp(1, 127),
            position,
            duration,
        }
    }

    pub fn end(&self) -> f64 {
        self.position + self.duration
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phrase {
    pub channel: u8,
    pub is_drums: bool,
    notes: Vec<NoteEvent>,
}

impl Phrase {
    pub fn new(channel: u8, is_drums: bool) -> Self {
        Self {
            channel: channel.min(15),
            is_drums,
            notes: Vec::new(),
        }
    }

    /// Insert a note, keeping notes sorted by position.
    pub fn add(&mut self, note: NoteEvent) {
        let idx = self.notes.partition_point(|n| n.position <= note.position);
        self.notes.insert(idx, note);
    }

    pub fn notes(&self) -> &[NoteEvent] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Notes starting inside `range` (upper bound excluded).
    pub fn notes_in(&self, range: FloatRange) -> &[NoteEvent] {
        let start = self.notes.partition_point(|n| n.position < range.from);
        let end = self.notes.partition_point(|n| n.position < range.to);
        &self.notes[start..end]
    }

    /// Shift all pitches, clamping to the MIDI range.
    pub fn transpose(&mut self, semitones: i32) {
        if semitones == 0 {
            return;
        }
        for note in &mut self.notes {
            note.pitch = (note.pitch as i32 + semitones).clamp(0, 127) as u8;
        }
    }

    pub fn shift_velocity(&mut self, delta: i32) {
        if delta == 0 {
            return;
        }
        for note in &mut self.notes {
            note.velocity = (note.velocity as i32 + delta).clamp(1, 127) as u8;
        }
    }

    /// Move all notes by `beats`.
    pub fn shift(&mut self, beats: f64) {
        for note in &mut self.notes {
            note.position += beats;
        }
    }

    pub fn last_beat(&self) -> f64 {
        self.notes.iter().map(NoteEvent::end).fold(0.0, f64::max)
    }
}

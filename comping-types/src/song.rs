//! Song model: chord leadsheet (sections + chord symbols) and song structure
//! (song parts pointing at leadsheet sections, each with its own rhythm).

use serde::{Deserialize, Serialize};

use crate::{ChordEvent, ChordSymbol, FloatRange, IntRange, Position, Rhythm, TimeSignature};

/// A named leadsheet section starting at `start_bar`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub start_bar: i32,
    pub time_signature: TimeSignature,
}

/// Sections and chord symbols, in leadsheet bars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordLeadSheet {
    pub size_in_bars: i32,
    /// Sorted by start bar, the first one always starts at bar 0.
    pub sections: Vec<Section>,
    /// Sorted by position.
    pub chords: Vec<ChordEvent>,
}

impl ChordLeadSheet {
    pub fn new(size_in_bars: i32, first_section: &str, time_signature: TimeSignature) -> Self {
        Self {
            size_in_bars: size_in_bars.max(1),
            sections: vec![Section {
                name: first_section.to_string(),
                start_bar: 0,
                time_signature,
            }],
            chords: Vec::new(),
        }
    }

    /// Add a section, replacing any section starting at the same bar.
    pub fn add_section(&mut self, name: &str, start_bar: i32, time_signature: TimeSignature) {
        let start_bar = start_bar.clamp(0, self.size_in_bars - 1);
        self.sections.retain(|s| s.start_bar != start_bar);
        let idx = self.sections.partition_point(|s| s.start_bar < start_bar);
        self.sections.insert(
            idx,
            Section {
                name: name.to_string(),
                start_bar,
                time_signature,
            },
        );
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Bars covered by a section.
    pub fn section_range(&self, name: &str) -> Option<IntRange> {
        let idx = self.sections.iter().position(|s| s.name == name)?;
        let start = self.sections[idx].start_bar;
        let end = self
            .sections
            .get(idx + 1)
            .map(|s| s.start_bar - 1)
            .unwrap_or(self.size_in_bars - 1);
        Some(IntRange::new(start, end))
    }

    /// Insert a chord, keeping chords sorted. A chord at the same position is replaced.
    pub fn add_chord(&mut self, position: Position, chord: ChordSymbol) {
        self.remove_chord(position);
        let idx = self.chords.partition_point(|c| c.position < position);
        self.chords.insert(idx, ChordEvent::new(position, chord));
    }

    pub fn remove_chord(&mut self, position: Position) -> Option<ChordEvent> {
        let idx = self.chords.iter().position(|c| c.position == position)?;
        Some(self.chords.remove(idx))
    }

    /// The chord sounding at a leadsheet position: the last one at or before it.
    pub fn chord_at(&self, position: Position) -> Option<&ChordEvent> {
        let idx = self.chords.partition_point(|c| c.position <= position);
        if idx == 0 {
            None
        } else {
            self.chords.get(idx - 1)
        }
    }
}

/// One entry of the song structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongPart {
    pub start_bar: i32,
    pub nb_bars: i32,
    pub rhythm: Rhythm,
    pub parent_section: String,
}

impl SongPart {
    pub fn new(parent_section: &str, nb_bars: i32, rhythm: Rhythm) -> Self {
        Self {
            start_bar: 0,
            nb_bars: nb_bars.max(1),
            rhythm,
            parent_section: parent_section.to_string(),
        }
    }

    pub fn bar_range(&self) -> IntRange {
        IntRange::new(self.start_bar, self.start_bar + self.nb_bars - 1)
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.rhythm.time_signature
    }

    pub fn beats_per_bar(&self) -> f64 {
        self.rhythm.time_signature.nb_natural_beats()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub name: String,
    pub tempo: u16,
    pub leadsheet: ChordLeadSheet,
    /// Contiguous song parts, `start_bar` kept in sync by the mutators.
    parts: Vec<SongPart>,
}

impl Song {
    pub fn new(name: &str, tempo: u16, leadsheet: ChordLeadSheet) -> Self {
        Self {
            name: name.to_string(),
            tempo: tempo.max(1),
            leadsheet,
            parts: Vec::new(),
        }
    }

    pub fn song_parts(&self) -> &[SongPart] {
        &self.parts
    }

    pub fn size_in_bars(&self) -> i32 {
        self.parts.iter().map(|p| p.nb_bars).sum()
    }

    /// Append a song part covering a whole leadsheet section. Returns its index.
    pub fn add_song_part(&mut self, parent_section: &str, rhythm: Rhythm) -> usize {
        let nb_bars = self
            .leadsheet
            .section_range(parent_section)
            .map(|r| r.size())
            .unwrap_or(1);
        self.insert_song_part(self.parts.len(), SongPart::new(parent_section, nb_bars, rhythm))
    }

    pub fn insert_song_part(&mut self, index: usize, part: SongPart) -> usize {
        let index = index.min(self.parts.len());
        self.parts.insert(index, part);
        self.renumber();
        index
    }

    pub fn remove_song_part(&mut self, index: usize) -> Option<SongPart> {
        if index >= self.parts.len() {
            return None;
        }
        let removed = self.parts.remove(index);
        self.renumber();
        Some(removed)
    }

    pub fn resize_song_part(&mut self, index: usize, nb_bars: i32) -> bool {
        match self.parts.get_mut(index) {
            Some(part) => {
                part.nb_bars = nb_bars.max(1);
                self.renumber();
                true
            }
            None => false,
        }
    }

    pub fn set_song_part_rhythm(&mut self, index: usize, rhythm: Rhythm) -> bool {
        match self.parts.get_mut(index) {
            Some(part) => {
                part.rhythm = rhythm;
                true
            }
            None => false,
        }
    }

    fn renumber(&mut self) {
        let mut bar = 0;
        for part in &mut self.parts {
            part.start_bar = bar;
            bar += part.nb_bars;
        }
    }

    pub fn song_part_at(&self, bar: i32) -> Option<&SongPart> {
        self.parts.iter().find(|p| p.bar_range().contains(bar))
    }

    /// Distinct rhythms in song order.
    pub fn rhythms(&self) -> Vec<&Rhythm> {
        let mut out: Vec<&Rhythm> = Vec::new();
        for part in &self.parts {
            if !out.iter().any(|r| r.id == part.rhythm.id) {
                out.push(&part.rhythm);
            }
        }
        out
    }

    /// Position in natural beats of the start of `bar`. `bar == size_in_bars()` gives the song length.
    pub fn bar_start_in_beats(&self, bar: i32) -> f64 {
        let mut beats = 0.0;
        for part in &self.parts {
            let end = part.start_bar + part.nb_bars;
            if bar < end {
                return beats + (bar - part.start_bar).max(0) as f64 * part.beats_per_bar();
            }
            beats += part.nb_bars as f64 * part.beats_per_bar();
        }
        beats
    }

    /// Beat range `[start of from, start of to+1)` of a bar range.
    pub fn to_beat_range(&self, bars: IntRange) -> FloatRange {
        if bars.is_empty() {
            return FloatRange::EMPTY;
        }
        FloatRange::new(
            self.bar_start_in_beats(bars.from),
            self.bar_start_in_beats(bars.to + 1),
        )
    }

    pub fn to_position_in_beats(&self, position: &Position) -> f64 {
        self.bar_start_in_beats(position.bar) + position.beat
    }

    /// Bar/beat position of an absolute beat, `None` past the song end.
    pub fn to_position(&self, beats: f64) -> Option<Position> {
        if beats < 0.0 {
            return None;
        }
        let mut start = 0.0;
        for part in &self.parts {
            let bpb = part.beats_per_bar();
            let end = start + part.nb_bars as f64 * bpb;
            if beats < end {
                let offset = beats - start;
                let bar_offset = (offset / bpb).floor();
                let beat = offset - bar_offset * bpb;
                return Some(Position::new(part.start_bar + bar_offset as i32, beat));
            }
            start = end;
        }
        None
    }

    /// Map a song position to the matching leadsheet position via the song part's parent section.
    pub fn to_leadsheet_position(&self, position: &Position) -> Option<Position> {
        let part = self.song_part_at(position.bar)?;
        let section = self.leadsheet.section_range(&part.parent_section)?;
        let offset = (position.bar - part.start_bar).min(section.size() - 1);
        Some(Position::new(section.from + offset, position.beat))
    }

    /// Chord active at a song position.
    pub fn chord_at(&self, position: &Position) -> Option<&ChordEvent> {
        let ls_pos = self.to_leadsheet_position(position)?;
        self.leadsheet.chord_at(ls_pos)
    }
}

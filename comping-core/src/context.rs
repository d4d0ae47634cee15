//! SongContext: which slice of which song, with which mix, to turn into music.
//!
//! The bar range is fixed at construction and the beat/tick geometry of the
//! included song parts is computed once from it, so conversions stay
//! consistent while a transport is running even if the live song is edited.
//! A context must be discarded once the song structure changes.

use std::sync::Arc;

use comping_types::{
    beats_to_ticks, FloatRange, IntRange, LongRange, Position, SongPart, PPQ_RESOLUTION,
};
use thiserror::Error;

use crate::model::{MidiMixHandle, SongHandle, SongRegistry};

#[derive(Debug, Error, PartialEq)]
pub enum ContextError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// A song part clipped to the context.
#[derive(Debug, Clone)]
struct PartSlice {
    part: SongPart,
    bars: IntRange,
    beats: FloatRange,
}

#[derive(Clone)]
pub struct SongContext {
    song: SongHandle,
    mix: MidiMixHandle,
    bar_range: IntRange,
    beat_range: FloatRange,
    tick_range: LongRange,
    slices: Arc<[PartSlice]>,
}

impl SongContext {
    /// Context over `bars` of `song`, or the whole song when `bars` is `None`.
    pub fn new(
        song: &SongHandle,
        mix: &MidiMixHandle,
        bars: Option<IntRange>,
    ) -> Result<Self, ContextError> {
        let data = song.snapshot();
        let size = data.size_in_bars();
        let full = if size == 0 {
            IntRange::EMPTY
        } else {
            IntRange::new(0, size - 1)
        };
        let bar_range = match bars {
            None => full,
            Some(r) if full.contains_range(&r) => r,
            Some(r) => {
                return Err(ContextError::InvalidArgument(format!(
                    "bar range {} exceeds song size {} ({})",
                    r, size, data.name
                )))
            }
        };

        let beat_range = data.to_beat_range(bar_range);
        let tick_range = LongRange::new(
            beats_to_ticks(beat_range.from),
            beats_to_ticks(beat_range.to),
        );
        let slices: Vec<PartSlice> = data
            .song_parts()
            .iter()
            .filter(|p| bar_range.intersects(&p.bar_range()))
            .map(|p| {
                let bars = bar_range.intersection(&p.bar_range());
                PartSlice {
                    part: p.clone(),
                    bars,
                    beats: data.to_beat_range(bars),
                }
            })
            .collect();

        Ok(Self {
            song: song.clone(),
            mix: mix.clone(),
            bar_range,
            beat_range,
            tick_range,
            slices: slices.into(),
        })
    }

    pub fn song(&self) -> &SongHandle {
        &self.song
    }

    pub fn midi_mix(&self) -> &MidiMixHandle {
        &self.mix
    }

    pub fn bar_range(&self) -> IntRange {
        self.bar_range
    }

    /// Natural beats `[start of first bar, end of last bar)`.
    pub fn beat_range(&self) -> FloatRange {
        self.beat_range
    }

    pub fn tick_range(&self) -> LongRange {
        self.tick_range
    }

    /// Song parts intersecting the bar range, in ascending start-bar order.
    pub fn song_parts(&self) -> Vec<SongPart> {
        self.slices.iter().map(|s| s.part.clone()).collect()
    }

    fn slice_of(&self, spt: &SongPart) -> Option<&PartSlice> {
        self.slices
            .iter()
            .find(|s| s.part.start_bar == spt.start_bar && s.part.parent_section == spt.parent_section)
    }

    pub fn contains_song_part(&self, spt: &SongPart) -> bool {
        self.slice_of(spt).is_some()
    }

    /// Bars of `spt` inside the context, empty if the part is not included.
    pub fn spt_bar_range(&self, spt: &SongPart) -> IntRange {
        self.slice_of(spt).map(|s| s.bars).unwrap_or(IntRange::EMPTY)
    }

    pub fn spt_beat_range(&self, spt: &SongPart) -> FloatRange {
        self.slice_of(spt).map(|s| s.beats).unwrap_or(FloatRange::EMPTY)
    }

    /// Absolute ticks of `spt` inside the context.
    pub fn spt_tick_range(&self, spt: &SongPart) -> LongRange {
        match self.slice_of(spt) {
            Some(s) => LongRange::new(beats_to_ticks(s.beats.from), beats_to_ticks(s.beats.to)),
            None => LongRange::EMPTY,
        }
    }

    /// Absolute position in beats of a tick relative to the context start, or
    /// `-1.0` if it falls outside the beat range (upper bound excluded).
    pub fn to_position_in_beats(&self, relative_tick: i64) -> f64 {
        let abs_tick = self.tick_range.from + relative_tick;
        let beats = abs_tick as f64 / PPQ_RESOLUTION as f64;
        if !self.beat_range.contains(beats, true) {
            return -1.0;
        }
        beats
    }

    /// Bar/beat position of a tick relative to the context start.
    pub fn to_position(&self, relative_tick: i64) -> Option<Position> {
        let beats = self.to_position_in_beats(relative_tick);
        if beats < 0.0 {
            return None;
        }
        let slice = self
            .slices
            .iter()
            .find(|s| s.beats.contains(beats, true))?;
        let bpb = slice.part.beats_per_bar();
        let offset = beats - slice.beats.from;
        let bar_offset = (offset / bpb).floor();
        let beat = offset - bar_offset * bpb;
        Some(Position::new(slice.bars.from + bar_offset as i32, beat))
    }

    /// Tick relative to the context start of an absolute song position, or
    /// `-1` if the position's bar is outside the bar range. Each song part
    /// contributes ticks with its own beats per bar.
    pub fn to_relative_tick(&self, position: &Position) -> i64 {
        if !self.bar_range.contains(position.bar) {
            return -1;
        }
        let mut relative_tick = 0;
        for slice in self.slices.iter() {
            let ticks_per_bar = slice.part.beats_per_bar() * PPQ_RESOLUTION as f64;
            if slice.bars.contains(position.bar) {
                let bars_before = (position.bar - slice.bars.from) as f64;
                let in_part = bars_before * ticks_per_bar + position.beat * PPQ_RESOLUTION as f64;
                return relative_tick + in_part.round() as i64;
            }
            relative_tick += (slice.bars.size() as f64 * ticks_per_bar).round() as i64;
        }
        -1
    }

    /// Same range over independent copies of the song and the mix, so the
    /// result is insulated from later edits. The copied song is added to
    /// `registry` when one is given.
    pub fn deep_clone(&self, registry: Option<&SongRegistry>) -> Result<SongContext, ContextError> {
        let song = self.song.deep_copy();
        let mix = self.mix.deep_copy();
        if let Some(registry) = registry {
            registry.register(&song);
        }
        SongContext::new(&song, &mix, Some(self.bar_range))
    }
}

impl PartialEq for SongContext {
    fn eq(&self, other: &Self) -> bool {
        self.song == other.song && self.mix == other.mix && self.bar_range == other.bar_range
    }
}

impl Eq for SongContext {}

impl std::hash::Hash for SongContext {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.song.hash(state);
        self.mix.hash(state);
        self.bar_range.hash(state);
    }
}

impl std::fmt::Debug for SongContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SongContext")
            .field("song", &self.song.id())
            .field("mix", &self.mix.id())
            .field("bars", &self.bar_range)
            .field("ticks", &self.tick_range)
            .finish()
    }
}

impl std::fmt::Display for SongContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SongContext[{} bars={} beats={}]",
            self.song.id(),
            self.bar_range,
            self.beat_range
        )
    }
}

//! Music generation seam: a [`MusicGenerator`] turns a [`SongContext`] into
//! one phrase per rhythm voice. [`PatternGenerator`] is a simple built-in
//! implementation (walking roots, comping chords, ride pattern).

use std::collections::{BTreeMap, BTreeSet};

use comping_types::{NoteEvent, Phrase, Position, RhythmVoice, RhythmVoiceId, Song, VoiceKind};
use thiserror::Error;

use crate::context::SongContext;

/// Generated music, one phrase per rhythm voice.
pub type PhraseMap = BTreeMap<RhythmVoiceId, Phrase>;

/// User-facing generation failures. Carried as data, never thrown across
/// the generation queue.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GenerationError {
    #[error("missing resource: {0}")]
    MissingResource(String),
    #[error("no rhythm voice to generate for {0}")]
    NoRhythmVoices(String),
    #[error("nothing to generate: empty bar range")]
    EmptyContext,
    #[error("context no longer matches the song: {0}")]
    StaleContext(String),
    #[error("generation failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationOptions {
    /// Restrict generation to these voices. `None` means all voices.
    pub only_voices: Option<BTreeSet<RhythmVoiceId>>,
    /// Errors are returned but not logged at warning level.
    pub silent: bool,
}

impl GenerationOptions {
    pub fn wants(&self, voice: &RhythmVoiceId) -> bool {
        self.only_voices.as_ref().map_or(true, |v| v.contains(voice))
    }
}

pub trait MusicGenerator: Send + Sync {
    /// Produce phrases for the context. Note positions are in beats relative
    /// to the context start.
    fn generate(
        &self,
        context: &SongContext,
        options: &GenerationOptions,
    ) -> Result<PhraseMap, GenerationError>;
}

/// Check a context against its live song before generating.
pub fn validate_context(context: &SongContext, song: &Song) -> Result<(), GenerationError> {
    let bars = context.bar_range();
    if bars.is_empty() {
        return Err(GenerationError::EmptyContext);
    }
    if bars.to >= song.size_in_bars() {
        return Err(GenerationError::StaleContext(format!(
            "bars {} but song has {}",
            bars,
            song.size_in_bars()
        )));
    }
    Ok(())
}

/// Deterministic pattern-based generator.
#[derive(Debug, Clone, Default)]
pub struct PatternGenerator;

impl PatternGenerator {
    pub fn new() -> Self {
        Self
    }

    fn step(beats_per_bar: f64, lower: u8) -> f64 {
        if lower == 8 && beats_per_bar.fract() == 0.0 {
            1.5
        } else if lower == 8 {
            0.5
        } else {
            1.0
        }
    }

    fn bar_notes(voice: &RhythmVoice, song: &Song, bar: i32, beats_per_bar: f64, step: f64, start: f64, phrase: &mut Phrase) {
        let mut beat = 0.0;
        while beat < beats_per_bar - 1e-9 {
            let position = start + beat;
            let chord = song.chord_at(&Position::new(bar, beat)).map(|c| &c.chord);
            let downbeat = beat == 0.0;
            match voice.kind {
                VoiceKind::Bass => {
                    if let Some(chord) = chord {
                        let tones = chord.pitches_from(36);
                        let idx = (beat / step) as usize % tones.len();
                        let pitch = if downbeat { tones[0] } else { tones[idx] };
                        let velocity = if downbeat { 92 } else { 80 };
                        phrase.add(NoteEvent::new(pitch, velocity, position, step * 0.9));
                    }
                }
                VoiceKind::Chord => {
                    if let Some(chord) = chord {
                        let half = (beats_per_bar / 2.0 / step).floor() * step;
                        if downbeat || (beat - half).abs() < 1e-9 {
                            for pitch in chord.pitches_from(60) {
                                phrase.add(NoteEvent::new(pitch, 70, position, step));
                            }
                        }
                    }
                }
                VoiceKind::Pad => {
                    if let (Some(chord), true) = (chord, downbeat) {
                        for pitch in chord.pitches_from(48) {
                            phrase.add(NoteEvent::new(pitch, 60, position, beats_per_bar));
                        }
                    }
                }
                VoiceKind::Melody => {
                    if let Some(chord) = chord {
                        let tones = chord.pitches_from(72);
                        let idx = (beat / step) as usize % tones.len();
                        phrase.add(NoteEvent::new(tones[idx], 75, position, step * 0.5));
                    }
                }
                VoiceKind::Drums => {
                    phrase.add(NoteEvent::new(51, if downbeat { 90 } else { 75 }, position, 0.25));
                    if downbeat {
                        phrase.add(NoteEvent::new(36, 85, position, 0.25));
                    } else if ((beat / step) as i64) % 2 == 1 {
                        phrase.add(NoteEvent::new(44, 70, position, 0.25));
                    }
                }
                VoiceKind::Percussion => {
                    phrase.add(NoteEvent::new(70, 60, position, 0.25));
                }
            }
            beat += step;
        }
    }
}

impl MusicGenerator for PatternGenerator {
    fn generate(
        &self,
        context: &SongContext,
        options: &GenerationOptions,
    ) -> Result<PhraseMap, GenerationError> {
        let song = context.song().snapshot();
        validate_context(context, &song)?;
        let mix = context.midi_mix().snapshot();
        let context_start = context.beat_range().from;

        let mut phrases = PhraseMap::new();
        for part in context.song_parts() {
            let rhythm = &part.rhythm;
            if rhythm.voices.is_empty() {
                return Err(GenerationError::NoRhythmVoices(rhythm.name.clone()));
            }
            let bars = context.spt_bar_range(&part);
            let beats = context.spt_beat_range(&part);
            let bpb = part.beats_per_bar();
            let step = Self::step(bpb, rhythm.time_signature.lower);

            for voice in rhythm.voices.iter().filter(|v| options.wants(&v.id)) {
                let channel = mix.channel_of(&voice.id).ok_or_else(|| {
                    GenerationError::MissingResource(format!("no MIDI channel for {}", voice.id))
                })?;
                let phrase = phrases
                    .entry(voice.id.clone())
                    .or_insert_with(|| Phrase::new(channel, voice.kind.is_drums()));
                for bar in bars.from..=bars.to {
                    let start = beats.from - context_start + (bar - bars.from) as f64 * bpb;
                    Self::bar_notes(voice, &song, bar, bpb, step, start, phrase);
                }
            }
        }
        log::debug!(
            target: "generator",
            "generated {} phrases for {}",
            phrases.len(),
            context
        );
        Ok(phrases)
    }
}

//! Playable music of a session: routed voice phrases plus the click,
//! precount and control tracks.

use comping_types::{
    ChordSymbol, MidiMix, NoteEvent, Phrase, Position, RhythmVoiceId, Song, DRUMS_CHANNEL,
};
use serde::Serialize;

use super::SessionFlags;
use crate::context::SongContext;
use crate::generator::PhraseMap;
use crate::model::PlaybackDefaults;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ControlKind {
    /// Chord starting here, with its song position.
    Chord { chord: ChordSymbol, position: Position },
    /// First bar of a song part.
    SongPart { bar: i32, name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlEvent {
    /// Beats from the start of the session music (precount included).
    pub position: f64,
    pub kind: ControlKind,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionMusic {
    voices: PhraseMap,
    click: Option<Phrase>,
    control: Vec<ControlEvent>,
    precount_beats: f64,
    music_beats: f64,
}

impl SessionMusic {
    /// Shape generated phrases for playback. `song` and `mix` are the data
    /// the phrases were generated from.
    pub(crate) fn build(
        context: &SongContext,
        song: &Song,
        mix: &MidiMix,
        phrases: PhraseMap,
        flags: SessionFlags,
        settings: &PlaybackDefaults,
    ) -> SessionMusic {
        let beat_range = context.beat_range();
        let music_beats = if beat_range.is_empty() { 0.0 } else { beat_range.size() };

        let first_bpb = context
            .song_parts()
            .first()
            .map(|p| p.beats_per_bar())
            .unwrap_or(4.0);
        let precount_bars = if flags.precount {
            settings.precount_mode.nb_bars(song.tempo)
        } else {
            0
        };
        let precount_beats = precount_bars as f64 * first_bpb;

        let key_shift = if flags.transposition {
            settings.playback_key_transposition as i32
        } else {
            0
        };

        let mut voices = PhraseMap::new();
        for (voice, mut phrase) in phrases {
            if let Some(channel) = mix.channel_of(&voice) {
                phrase.channel = channel;
            }
            if let Some(im) = mix.instrument_mix(phrase.channel) {
                phrase.shift_velocity(im.velocity_shift as i32);
                if !phrase.is_drums {
                    phrase.transpose(im.transposition as i32);
                }
                if im.drums_rerouted {
                    phrase.channel = DRUMS_CHANNEL;
                }
            }
            if !phrase.is_drums && phrase.channel != DRUMS_CHANNEL {
                phrase.transpose(key_shift);
            }
            phrase.shift(precount_beats);
            voices.insert(voice, phrase);
        }

        let click = if flags.click || precount_bars > 0 {
            Some(Self::click_phrase(
                context,
                settings,
                flags.click,
                precount_bars,
                first_bpb,
            ))
        } else {
            None
        };

        let control = if flags.control_track {
            Self::control_events(context, song, precount_beats)
        } else {
            Vec::new()
        };

        SessionMusic {
            voices,
            click,
            control,
            precount_beats,
            music_beats,
        }
    }

    fn click_phrase(
        context: &SongContext,
        settings: &PlaybackDefaults,
        click_song: bool,
        precount_bars: i32,
        first_bpb: f64,
    ) -> Phrase {
        let mut phrase = Phrase::new(DRUMS_CHANNEL, true);
        let add_bar = |phrase: &mut Phrase, start: f64, bpb: f64| {
            let mut beat = 0.0;
            while beat < bpb - 1e-9 {
                let (pitch, velocity) = if beat == 0.0 {
                    (settings.click_pitch_high, settings.click_velocity_high)
                } else {
                    (settings.click_pitch_low, settings.click_velocity_low)
                };
                phrase.add(NoteEvent::new(pitch, velocity, start + beat, 0.25));
                beat += 1.0;
            }
        };

        for bar in 0..precount_bars {
            add_bar(&mut phrase, bar as f64 * first_bpb, first_bpb);
        }
        if click_song {
            let precount_beats = precount_bars as f64 * first_bpb;
            let context_start = context.beat_range().from;
            for part in context.song_parts() {
                let bars = context.spt_bar_range(&part);
                let beats = context.spt_beat_range(&part);
                let bpb = part.beats_per_bar();
                for bar in bars.from..=bars.to {
                    let start =
                        precount_beats + beats.from - context_start + (bar - bars.from) as f64 * bpb;
                    add_bar(&mut phrase, start, bpb);
                }
            }
        }
        phrase
    }

    fn control_events(context: &SongContext, song: &Song, offset: f64) -> Vec<ControlEvent> {
        let bars = context.bar_range();
        let context_start = context.beat_range().from;
        let mut events = Vec::new();
        if bars.is_empty() {
            return events;
        }

        for part in context.song_parts() {
            let part_bars = context.spt_bar_range(&part);
            events.push(ControlEvent {
                position: offset + song.bar_start_in_beats(part_bars.from) - context_start,
                kind: ControlKind::SongPart {
                    bar: part_bars.from,
                    name: part.parent_section.clone(),
                },
            });
        }

        for bar in bars.from..=bars.to {
            let bar_start = offset + song.bar_start_in_beats(bar) - context_start;
            let Some(ls_pos) = song.to_leadsheet_position(&Position::new(bar, 0.0)) else {
                continue;
            };
            let mut chord_on_downbeat = false;
            for ev in song.leadsheet.chords.iter().filter(|c| c.position.bar == ls_pos.bar) {
                chord_on_downbeat |= ev.position.beat == 0.0;
                events.push(ControlEvent {
                    position: bar_start + ev.position.beat,
                    kind: ControlKind::Chord {
                        chord: ev.chord.clone(),
                        position: Position::new(bar, ev.position.beat),
                    },
                });
            }
            // Chord carried over from before the context start
            if bar == bars.from && !chord_on_downbeat {
                if let Some(ev) = song.chord_at(&Position::new(bar, 0.0)) {
                    events.push(ControlEvent {
                        position: bar_start,
                        kind: ControlKind::Chord {
                            chord: ev.chord.clone(),
                            position: Position::new(bar, 0.0),
                        },
                    });
                }
            }
        }
        events.sort_by(|a, b| a.position.total_cmp(&b.position));
        events
    }

    pub fn voices(&self) -> &PhraseMap {
        &self.voices
    }

    pub fn phrase(&self, voice: &RhythmVoiceId) -> Option<&Phrase> {
        self.voices.get(voice)
    }

    pub fn click(&self) -> Option<&Phrase> {
        self.click.as_ref()
    }

    pub fn control_track(&self) -> &[ControlEvent] {
        &self.control
    }

    pub fn precount_beats(&self) -> f64 {
        self.precount_beats
    }

    /// Length of the song material, precount excluded.
    pub fn music_beats(&self) -> f64 {
        self.music_beats
    }

    pub fn length_in_beats(&self) -> f64 {
        self.precount_beats + self.music_beats
    }

    /// Every phrase to play, voices first then the click.
    pub fn phrases(&self) -> impl Iterator<Item = &Phrase> {
        self.voices.values().chain(self.click.iter())
    }
}

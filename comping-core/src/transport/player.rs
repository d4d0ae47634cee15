//! Deterministic playback engine. The transport thread calls
//! [`Player::advance`] with the elapsed wall time; tests call it directly.

use std::time::Duration;

use comping_types::{beats_to_ticks, ticks_to_beats, FloatRange, Position, PPQ_RESOLUTION};
use crossbeam_channel::Sender;

use super::events::{ActivityCoalescer, PlaybackEvent};
use super::{MidiEvent, MidiSink, PlaybackError};
use crate::notify::Subscription;
use crate::session::{
    ControlKind, PlaybackSession, SessionError, SessionEvent, SessionMusic, SessionState,
    LOOP_CONTINUOUSLY,
};

const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy)]
struct ActiveNote {
    channel: u8,
    pitch: u8,
    end: f64,
}

/// One sink event placed in time. Note-offs sort before note-ons at the same position.
struct Scheduled {
    at: f64,
    order: u8,
    event: MidiEvent,
    activity: bool,
}

pub struct Player {
    sink: Box<dyn MidiSink>,
    events: Sender<PlaybackEvent>,
    state: PlayerState,
    session: Option<PlaybackSession>,
    session_events: Option<Subscription>,
    tempo: f64,
    tick_accumulator: f64,
    /// Beats from the start of the session music, precount included.
    position: f64,
    /// Where the song material starts after the precount and on each loop.
    restart: f64,
    loops_done: i32,
    active: Vec<ActiveNote>,
    activity: ActivityCoalescer,
    last_beat: Option<Position>,
}

impl Player {
    pub fn new(
        sink: Box<dyn MidiSink>,
        events: Sender<PlaybackEvent>,
        activity_window_ticks: i64,
    ) -> Self {
        Self {
            sink,
            events,
            state: PlayerState::Idle,
            session: None,
            session_events: None,
            tempo: 120.0,
            tick_accumulator: 0.0,
            position: 0.0,
            restart: 0.0,
            loops_done: 0,
            active: Vec::new(),
            activity: ActivityCoalescer::new(activity_window_ticks),
            last_beat: None,
        }
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    pub fn position_in_beats(&self) -> f64 {
        self.position
    }

    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    pub fn loops_done(&self) -> i32 {
        self.loops_done
    }

    fn emit(&self, event: PlaybackEvent) {
        // No receiver left means nobody listens
        let _ = self.events.send(event);
    }

    /// Play `session` from `from_bar`. A `New` session is generated first.
    pub fn start(&mut self, session: PlaybackSession, from_bar: i32) -> Result<(), PlaybackError> {
        if self.session.is_some() {
            self.stop()?;
        }
        match session.state() {
            SessionState::New => session.generate(false)?,
            SessionState::Outdated => return Err(PlaybackError::OutdatedSession(session.id())),
            SessionState::Closed => return Err(SessionError::Closed.into()),
            _ => {}
        }

        let context = session.context();
        let rel_tick = context.to_relative_tick(&Position::new(from_bar, 0.0));
        if rel_tick < 0 {
            return Err(PlaybackError::BarOutOfRange(from_bar));
        }
        session
            .settings()
            .check_pre_playback(context)
            .map_err(|reason| {
                log::info!(target: "transport", "{} vetoed: {}", session.id(), reason);
                PlaybackError::Vetoed(reason)
            })?;
        let music = session.music().ok_or(PlaybackError::NoSession)?;
        session.play()?;

        self.restart = music.precount_beats() + ticks_to_beats(rel_tick);
        self.position = if music.precount_beats() > 0.0 {
            0.0
        } else {
            self.restart
        };
        self.tempo = context.song().read(|s| s.tempo) as f64;
        self.tick_accumulator = 0.0;
        self.loops_done = 0;
        self.activity.reset();
        self.last_beat = None;

        let id = session.id();
        let tx = self.events.clone();
        self.session_events = Some(session.subscribe(move |event| {
            if let SessionEvent::Updated { count } = event {
                let _ = tx.send(PlaybackEvent::SessionUpdated { session: id, count: *count });
            }
        }));
        log::info!(target: "transport", "playing {} from bar {}", session, from_bar);
        self.state = PlayerState::Playing;
        self.emit(PlaybackEvent::Enabled(true));
        self.announce_restart(&session, &music);
        self.session = Some(session);
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), PlaybackError> {
        let session = self.session.clone().ok_or(PlaybackError::NoSession)?;
        if self.state != PlayerState::Playing {
            return Ok(());
        }
        self.release_all();
        session.pause()?;
        self.state = PlayerState::Paused;
        log::debug!(target: "transport", "paused at beat {:.3}", self.position);
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), PlaybackError> {
        let session = self.session.clone().ok_or(PlaybackError::NoSession)?;
        if self.state != PlayerState::Paused {
            return Ok(());
        }
        if session.state() == SessionState::Outdated {
            return Err(PlaybackError::OutdatedSession(session.id()));
        }
        session.play()?;
        self.tick_accumulator = 0.0;
        self.state = PlayerState::Playing;
        Ok(())
    }

    /// Stop and unload the session. Does nothing when idle.
    pub fn stop(&mut self) -> Result<(), PlaybackError> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        self.release_all();
        self.session_events = None;
        self.state = PlayerState::Idle;
        self.emit(PlaybackEvent::Enabled(false));
        match session.stop() {
            Ok(()) | Err(SessionError::Closed) => {}
            Err(e) => return Err(e.into()),
        }
        log::info!(target: "transport", "stopped {}", session);
        Ok(())
    }

    pub fn set_tempo(&mut self, bpm: u16) {
        self.tempo = bpm.clamp(1, 999) as f64;
    }

    /// Move the playhead by `elapsed` of wall time.
    pub fn advance(&mut self, elapsed: Duration) {
        if self.state != PlayerState::Playing {
            return;
        }
        let Some(session) = self.session.clone() else {
            return;
        };
        let Some(music) = session.music() else {
            log::info!(target: "transport", "{} closed while playing", session);
            self.halt();
            return;
        };

        self.tick_accumulator +=
            elapsed.as_secs_f64() * (self.tempo / 60.0) * PPQ_RESOLUTION as f64;
        let ticks = self.tick_accumulator.floor();
        self.tick_accumulator -= ticks;
        if ticks <= 0.0 {
            return;
        }

        let mut remaining = ticks / PPQ_RESOLUTION as f64;
        let precount = music.precount_beats();
        let end = music.length_in_beats();
        while remaining > EPSILON {
            let in_precount = self.position < precount - EPSILON;
            let segment_end = if in_precount { precount } else { end };
            if self.position < segment_end - EPSILON {
                let step_end = (self.position + remaining).min(segment_end);
                self.play_span(&session, &music, self.position, step_end);
                remaining -= step_end - self.position;
                self.position = step_end;
                if self.position < segment_end - EPSILON {
                    break;
                }
            }
            if in_precount {
                self.position = self.restart;
                continue;
            }

            self.release_all();
            let loop_count = session.loop_count();
            let again = loop_count == LOOP_CONTINUOUSLY || self.loops_done < loop_count;
            if !again || end - self.restart <= EPSILON {
                self.finish(&session);
                return;
            }
            self.loops_done += 1;
            self.position = self.restart;
            self.activity.reset();
            self.announce_restart(&session, &music);
            log::debug!(target: "transport", "loop {} of {}", self.loops_done, session);
        }
    }

    fn play_span(&mut self, session: &PlaybackSession, music: &SessionMusic, from: f64, to: f64) {
        let precount = music.precount_beats();
        let span = FloatRange::new(from, to);
        let mut scheduled: Vec<Scheduled> = Vec::new();

        let mut kept = Vec::with_capacity(self.active.len());
        for note in self.active.drain(..) {
            if note.end < to {
                scheduled.push(Scheduled {
                    at: note.end.max(from),
                    order: 0,
                    event: MidiEvent::NoteOff {
                        channel: note.channel,
                        pitch: note.pitch,
                    },
                    activity: false,
                });
            } else {
                kept.push(note);
            }
        }
        self.active = kept;

        let muted: Vec<u8> = session.context().midi_mix().read(|mix| {
            mix.used_channels()
                .into_iter()
                .filter(|c| mix.instrument_mix(*c).is_some_and(|im| im.mute))
                .collect()
        });
        let voices = music
            .voices()
            .values()
            .filter(|p| !muted.contains(&p.channel))
            .map(|p| (p, true));
        for (phrase, activity) in voices.chain(music.click().map(|p| (p, false))) {
            for note in phrase.notes_in(span) {
                scheduled.push(Scheduled {
                    at: note.position,
                    order: 1,
                    event: MidiEvent::NoteOn {
                        channel: phrase.channel,
                        pitch: note.pitch,
                        velocity: note.velocity,
                    },
                    activity,
                });
                let off = MidiEvent::NoteOff {
                    channel: phrase.channel,
                    pitch: note.pitch,
                };
                if note.end() < to {
                    scheduled.push(Scheduled {
                        at: note.end(),
                        order: 0,
                        event: off,
                        activity: false,
                    });
                } else {
                    self.active.push(ActiveNote {
                        channel: phrase.channel,
                        pitch: note.pitch,
                        end: note.end(),
                    });
                }
            }
        }
        scheduled.sort_by(|a, b| a.at.total_cmp(&b.at).then(a.order.cmp(&b.order)));

        for s in scheduled {
            self.sink.send(s.event);
            if let (true, MidiEvent::NoteOn { channel, .. }) = (s.activity, s.event) {
                let tick = beats_to_ticks((s.at - precount).max(0.0));
                if self.activity.should_emit(channel, tick) {
                    self.emit(PlaybackEvent::MidiActivity { channel, tick });
                }
            }
        }

        self.emit_beats(session, precount, from, to);

        for ev in music.control_track() {
            if !span.contains(ev.position, true) {
                continue;
            }
            let event = match &ev.kind {
                ControlKind::Chord { chord, position } => PlaybackEvent::ChordChanged {
                    chord: chord.clone(),
                    position: *position,
                },
                ControlKind::SongPart { bar, name } => PlaybackEvent::SongPartChanged {
                    bar: *bar,
                    name: name.clone(),
                },
            };
            self.emit(event);
        }
    }

    /// Report the chord and song part in effect at the restart point, unless
    /// the control track has an event of that kind exactly there.
    fn announce_restart(&self, session: &PlaybackSession, music: &SessionMusic) {
        let context = session.context();
        let rel_tick = beats_to_ticks(self.restart - music.precount_beats());
        let Some(position) = context.to_position(rel_tick) else {
            return;
        };
        let controlled_here = |chord: bool| {
            music.control_track().iter().any(|ev| {
                (ev.position - self.restart).abs() < EPSILON
                    && matches!(ev.kind, ControlKind::Chord { .. }) == chord
            })
        };
        let (part, chord) = context.song().read(|song| {
            (
                song.song_part_at(position.bar)
                    .map(|p| (p.start_bar.max(context.bar_range().from), p.parent_section.clone())),
                song.chord_at(&position).map(|ev| ev.chord.clone()),
            )
        });
        if let Some((bar, name)) = part {
            if !controlled_here(false) {
                self.emit(PlaybackEvent::SongPartChanged { bar, name });
            }
        }
        if let Some(chord) = chord {
            if !controlled_here(true) {
                self.emit(PlaybackEvent::ChordChanged { chord, position });
            }
        }
    }

    /// A `BeatChanged` for every whole song beat in `[from, to)`.
    fn emit_beats(&mut self, session: &PlaybackSession, precount: f64, from: f64, to: f64) {
        let rel_from = (from - precount).max(0.0);
        let rel_to = to - precount;
        if rel_to <= 0.0 {
            return;
        }
        let context = session.context();
        let mut beat = (rel_from - EPSILON).ceil();
        while beat < rel_to - EPSILON {
            let tick = beats_to_ticks(beat);
            if let Some(new) = context.to_position(tick) {
                let old = self.last_beat.unwrap_or(new);
                self.emit(PlaybackEvent::BeatChanged {
                    old,
                    new,
                    position_in_beats: context.to_position_in_beats(tick),
                });
                self.last_beat = Some(new);
            }
            beat += 1.0;
        }
    }

    fn release_all(&mut self) {
        for note in std::mem::take(&mut self.active) {
            self.sink.send(MidiEvent::NoteOff {
                channel: note.channel,
                pitch: note.pitch,
            });
        }
    }

    fn finish(&mut self, session: &PlaybackSession) {
        self.release_all();
        self.state = PlayerState::Idle;
        self.session = None;
        self.session_events = None;
        log::info!(target: "transport", "end of playback for {}", session);
        if let Err(e) = session.end_of_playback() {
            log::warn!(target: "transport", "{}: {}", session, e);
        }
        self.emit(PlaybackEvent::EndOfPlayback);
        self.emit(PlaybackEvent::Enabled(false));
    }

    fn halt(&mut self) {
        self.release_all();
        self.state = PlayerState::Idle;
        self.session = None;
        self.session_events = None;
        self.emit(PlaybackEvent::Enabled(false));
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SongContext;
    use crate::generator::PatternGenerator;
    use crate::model::{MidiMixHandle, PlaybackSettings, SongHandle};
    use crate::session::{EndAction, SessionEnv, SessionFlags};
    use crate::transport::{Collector, MemorySink, PlaybackEvents};
    use comping_types::{ChordLeadSheet, ChordSymbol, Rhythm, Song, TimeSignature};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// 60 bpm: one beat per second.
    fn session(loop_count: i32, end: Option<EndAction>) -> PlaybackSession {
        let mut ls = ChordLeadSheet::new(2, "A", TimeSignature::FOUR_FOUR);
        ls.add_chord(Position::new(0, 0.0), ChordSymbol::new(0, "maj7"));
        ls.add_chord(Position::new(1, 0.0), ChordSymbol::new(5, "7"));
        let mut song = Song::new("p", 60, ls);
        song.add_song_part("A", Rhythm::jazz_trio("swing", TimeSignature::FOUR_FOUR));
        let mix = MidiMixHandle::for_song(&song);
        let ctx = SongContext::new(&SongHandle::new(song), &mix, None).unwrap();
        let env = SessionEnv::new(Arc::new(PatternGenerator::new()), PlaybackSettings::default());
        let flags = SessionFlags {
            control_track: true,
            ..SessionFlags::default()
        };
        PlaybackSession::new(ctx, flags, loop_count, end, &env)
    }

    fn player(events: &PlaybackEvents, sink: &MemorySink) -> Player {
        Player::new(Box::new(sink.clone()), events.sender(), 240)
    }

    #[test]
    fn new_session_is_generated_on_start() {
        let events = PlaybackEvents::new();
        let sink = MemorySink::new();
        let mut p = player(&events, &sink);
        let s = session(0, None);
        p.start(s.clone(), 0).unwrap();
        assert_eq!(s.state(), SessionState::Playing);
        assert_eq!(p.state(), PlayerState::Playing);
    }

    #[test]
    fn beats_and_chords_are_reported() {
        let events = PlaybackEvents::new();
        let collector = Collector::attach(&events);
        let sink = MemorySink::new();
        let mut p = player(&events, &sink);
        p.start(session(0, None), 0).unwrap();
        p.advance(Duration::from_millis(4500));
        events.dispatch_pending();
        assert_eq!(
            collector.count(|e| matches!(e, PlaybackEvent::BeatChanged { .. })),
            5
        );
        assert_eq!(
            collector.count(|e| matches!(e, PlaybackEvent::ChordChanged { .. })),
            2
        );
        assert!(sink.note_ons() > 0);
    }

    #[test]
    fn natural_end_stops_session_and_runs_action() {
        let ran = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&ran);
        let s = session(0, Some(EndAction::new(move || {
            r.fetch_add(1, Ordering::SeqCst);
        })));
        let events = PlaybackEvents::new();
        let collector = Collector::attach(&events);
        let sink = MemorySink::new();
        let mut p = player(&events, &sink);
        p.start(s.clone(), 0).unwrap();
        p.advance(Duration::from_secs(9));
        events.dispatch_pending();
        assert_eq!(s.state(), SessionState::Stopped);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(p.state(), PlayerState::Idle);
        assert_eq!(collector.count(|e| *e == PlaybackEvent::EndOfPlayback), 1);
    }

    #[test]
    fn loop_count_repeats_music() {
        let s = session(1, None);
        let events = PlaybackEvents::new();
        let sink = MemorySink::new();
        let mut p = player(&events, &sink);
        p.start(s.clone(), 0).unwrap();
        p.advance(Duration::from_secs(10));
        assert_eq!(p.loops_done(), 1);
        assert_eq!(s.state(), SessionState::Playing);
        p.advance(Duration::from_secs(7));
        assert_eq!(s.state(), SessionState::Stopped);
    }

    #[test]
    fn outdated_session_is_refused() {
        let s = session(0, None);
        s.generate(false).unwrap();
        s.mark_dirty("test");
        let events = PlaybackEvents::new();
        let mut p = player(&events, &MemorySink::new());
        assert_eq!(
            p.start(s.clone(), 0),
            Err(PlaybackError::OutdatedSession(s.id()))
        );
    }

    #[test]
    fn veto_hook_blocks_start() {
        let s = session(0, None);
        let _hook = s.settings().add_veto_hook(|_| Err("busy".into()));
        let events = PlaybackEvents::new();
        let mut p = player(&events, &MemorySink::new());
        assert_eq!(p.start(s.clone(), 0), Err(PlaybackError::Vetoed("busy".into())));
        assert_eq!(s.state(), SessionState::Generated);
    }

    #[test]
    fn stop_releases_held_notes() {
        let events = PlaybackEvents::new();
        let sink = MemorySink::new();
        let mut p = player(&events, &sink);
        p.start(session(0, None), 0).unwrap();
        p.advance(Duration::from_millis(100));
        p.stop().unwrap();
        let evs = sink.events();
        let ons = evs.iter().filter(|e| matches!(e, MidiEvent::NoteOn { .. })).count();
        let offs = evs.iter().filter(|e| matches!(e, MidiEvent::NoteOff { .. })).count();
        assert_eq!(ons, offs);
    }

    #[test]
    fn start_bar_outside_session_is_rejected() {
        let events = PlaybackEvents::new();
        let mut p = player(&events, &MemorySink::new());
        assert_eq!(p.start(session(0, None), 5), Err(PlaybackError::BarOutOfRange(5)));
    }
}

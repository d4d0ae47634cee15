//! Playback sessions: generated music for one [`SongContext`] and its lifecycle.
//!
//! ```text
//! New ──generate──▶ Generated ──play──▶ Playing ──pause──▶ Paused
//!                      ▲  │               │  │               │
//!                      │  │             stop │ end           │ play
//!                      └──┼───────────────┘  ▼               │
//!                         │               Stopped ──play─────┘
//!                         │
//!           dirty (Generated/Playing/Paused/Stopped) ──▶ Outdated
//!           close (any) ──▶ Closed
//! ```
//!
//! A `Basic` session watches its song, its MIDI mix and the playback
//! settings, and becomes `Outdated` when a change alters its music. An
//! `Outdated` session keeps sounding until the transport stops it; callers
//! must then discard it and ask for a fresh one. A `Static` session plays a
//! private copy of the song and never goes stale.

pub mod music;
pub mod registry;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use thiserror::Error;

use crate::context::{ContextError, SongContext};
use crate::generator::{GenerationError, GenerationOptions, MusicGenerator};
use crate::model::{MidiMixEvent, PlaybackSettings, SettingsEvent, SongEvent};
use crate::notify::{Notifier, Subscription};
use crate::queue::{GenerationResult, MusicGenerationQueue, QueueConfig};

pub use music::{ControlEvent, ControlKind, SessionMusic};
pub use registry::SessionRegistry;

/// Loop count meaning "until stopped".
pub const LOOP_CONTINUOUSLY: i32 = -1;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// What the generated music includes besides the voices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SessionFlags {
    /// Apply the playback key transposition to melodic voices.
    pub transposition: bool,
    pub click: bool,
    pub precount: bool,
    pub control_track: bool,
}

impl SessionFlags {
    /// Flags matching the current playback settings.
    pub fn from_settings(settings: &PlaybackSettings) -> Self {
        Self {
            transposition: true,
            click: settings.is_click_enabled(),
            precount: settings.is_precount_enabled(),
            control_track: true,
        }
    }

    fn settings_event_is_relevant(&self, event: &SettingsEvent) -> bool {
        match event {
            SettingsEvent::ClickPitchChanged | SettingsEvent::ClickVelocityChanged => self.click,
            SettingsEvent::PrecountModeChanged(_) => self.precount,
            SettingsEvent::PlaybackKeyTranspositionChanged(_) => self.transposition,
            SettingsEvent::ClickEnabledChanged(_)
            | SettingsEvent::PrecountEnabledChanged(_)
            | SettingsEvent::LoopCountChanged(_) => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKind {
    /// Live context, tracks edits.
    Basic,
    /// Private copy of the context, never outdated.
    Static,
}

/// Callback run when playback reaches its natural end. Compared by identity.
#[derive(Clone)]
pub struct EndAction(Arc<dyn Fn() + Send + Sync>);

impl EndAction {
    pub fn new(action: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(action))
    }

    pub fn run(&self) {
        (self.0)()
    }
}

impl PartialEq for EndAction {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.0) as *const (),
            Arc::as_ptr(&other.0) as *const (),
        )
    }
}

impl Eq for EndAction {}

impl std::fmt::Debug for EndAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EndAction({:p})", Arc::as_ptr(&self.0) as *const ())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    New,
    Generated,
    Playing,
    Paused,
    Stopped,
    Outdated,
    Closed,
}

impl SessionState {
    /// Reusable by the registry.
    pub fn is_reusable(self) -> bool {
        matches!(self, SessionState::New | SessionState::Generated)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged { old: SessionState, new: SessionState },
    /// Music replaced in place by an incremental update.
    Updated { count: u64 },
    Closed,
}

#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    #[error("illegal transition: {op} in state {state:?}")]
    IllegalTransition { op: &'static str, state: SessionState },
    #[error("session is closed")]
    Closed,
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Context(#[from] ContextError),
}

/// Lifecycle with per-state payload.
#[derive(Clone)]
enum Phase {
    New,
    Generated(Arc<SessionMusic>),
    Playing(Arc<SessionMusic>),
    Paused(Arc<SessionMusic>),
    Stopped(Arc<SessionMusic>),
    Outdated {
        music: Arc<SessionMusic>,
        sounding: bool,
    },
    Closed,
}

impl Phase {
    fn state(&self) -> SessionState {
        match self {
            Phase::New => SessionState::New,
            Phase::Generated(_) => SessionState::Generated,
            Phase::Playing(_) => SessionState::Playing,
            Phase::Paused(_) => SessionState::Paused,
            Phase::Stopped(_) => SessionState::Stopped,
            Phase::Outdated { .. } => SessionState::Outdated,
            Phase::Closed => SessionState::Closed,
        }
    }

    fn music(&self) -> Option<&Arc<SessionMusic>> {
        match self {
            Phase::Generated(m) | Phase::Playing(m) | Phase::Paused(m) | Phase::Stopped(m) => {
                Some(m)
            }
            Phase::Outdated { music, .. } => Some(music),
            Phase::New | Phase::Closed => None,
        }
    }
}

/// Generator and settings shared by every session of a registry.
#[derive(Clone)]
pub struct SessionEnv {
    pub generator: Arc<dyn MusicGenerator>,
    pub settings: PlaybackSettings,
    /// Enable incremental updates on new `Basic` sessions.
    pub updates: Option<QueueConfig>,
}

impl SessionEnv {
    pub fn new(generator: Arc<dyn MusicGenerator>, settings: PlaybackSettings) -> Self {
        Self {
            generator,
            settings,
            updates: None,
        }
    }

    pub fn from_config(
        generator: Arc<dyn MusicGenerator>,
        settings: PlaybackSettings,
        config: &crate::config::Config,
    ) -> Self {
        Self {
            generator,
            settings,
            updates: config
                .auto_update_enabled()
                .then(|| QueueConfig::from_config(config)),
        }
    }
}

struct Updater {
    queue: MusicGenerationQueue,
    _results: Subscription,
}

struct SessionInner {
    id: SessionId,
    kind: SessionKind,
    context: SongContext,
    /// Context the session was requested for; differs from `context` for static sessions.
    origin: SongContext,
    flags: SessionFlags,
    loop_count: i32,
    end_action: Option<EndAction>,
    env: SessionEnv,
    phase: Mutex<Phase>,
    /// Bumped on every relevant change, to catch edits made during generation.
    dirty_epoch: AtomicU64,
    update_count: AtomicU64,
    events: Notifier<SessionEvent>,
    subscriptions: Mutex<Vec<Subscription>>,
    updater: Mutex<Option<Updater>>,
}

/// Shared handle to a session. Clones refer to the same session.
#[derive(Clone)]
pub struct PlaybackSession {
    inner: Arc<SessionInner>,
}

fn normalize_loop_count(loop_count: i32) -> i32 {
    if loop_count < LOOP_CONTINUOUSLY {
        log::warn!(target: "session", "invalid loop count {}, playing once", loop_count);
        0
    } else {
        loop_count
    }
}

impl PlaybackSession {
    /// A live session, outdated by relevant song, mix or settings changes.
    pub fn new(
        context: SongContext,
        flags: SessionFlags,
        loop_count: i32,
        end_action: Option<EndAction>,
        env: &SessionEnv,
    ) -> Self {
        let session = Self::build(
            SessionKind::Basic,
            context.clone(),
            context,
            flags,
            loop_count,
            end_action,
            env,
        );
        session.watch_sources();
        session
    }

    /// A session over a private copy of `context`.
    pub fn new_static(
        context: SongContext,
        flags: SessionFlags,
        loop_count: i32,
        end_action: Option<EndAction>,
        env: &SessionEnv,
    ) -> Result<Self, SessionError> {
        let copy = context.deep_clone(None)?;
        Ok(Self::build(
            SessionKind::Static,
            copy,
            context,
            flags,
            loop_count,
            end_action,
            env,
        ))
    }

    fn build(
        kind: SessionKind,
        context: SongContext,
        origin: SongContext,
        flags: SessionFlags,
        loop_count: i32,
        end_action: Option<EndAction>,
        env: &SessionEnv,
    ) -> Self {
        let id = SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed));
        log::debug!(target: "session", "{} created ({:?}) for {}", id, kind, origin);
        Self {
            inner: Arc::new(SessionInner {
                id,
                kind,
                context,
                origin,
                flags,
                loop_count: normalize_loop_count(loop_count),
                end_action,
                env: env.clone(),
                phase: Mutex::new(Phase::New),
                dirty_epoch: AtomicU64::new(0),
                update_count: AtomicU64::new(0),
                events: Notifier::new(),
                subscriptions: Mutex::new(Vec::new()),
                updater: Mutex::new(None),
            }),
        }
    }

    fn watch_sources(&self) {
        let context = &self.inner.context;
        let flags = self.inner.flags;

        let weak = Arc::downgrade(&self.inner);
        let song_sub = context.song().subscribe(move |event| {
            let Some(session) = upgrade(&weak) else {
                return;
            };
            match event {
                SongEvent::Closed => {
                    let _ = session.close();
                }
                e if e.is_structural() => session.mark_dirty(&format!("song {:?}", e)),
                e if e.is_music_relevant() => session.content_changed(&format!("song {:?}", e)),
                _ => {}
            }
        });

        let weak = Arc::downgrade(&self.inner);
        let mix_sub = context.midi_mix().subscribe(move |event: &MidiMixEvent| {
            if !event.is_music_relevant() {
                return;
            }
            if let Some(session) = upgrade(&weak) {
                session.content_changed(&format!("mix {:?}", event));
            }
        });

        let weak = Arc::downgrade(&self.inner);
        let settings_sub = self.inner.env.settings.subscribe(move |event| {
            if !flags.settings_event_is_relevant(event) {
                return;
            }
            if let Some(session) = upgrade(&weak) {
                session.mark_dirty(&format!("settings {:?}", event));
            }
        });

        self.subscriptions().extend([song_sub, mix_sub, settings_sub]);
    }

    fn phase(&self) -> MutexGuard<'_, Phase> {
        self.inner.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscriptions(&self) -> MutexGuard<'_, Vec<Subscription>> {
        self.inner
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn updater(&self) -> MutexGuard<'_, Option<Updater>> {
        self.inner.updater.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    pub fn kind(&self) -> SessionKind {
        self.inner.kind
    }

    /// The context music is generated from.
    pub fn context(&self) -> &SongContext {
        &self.inner.context
    }

    /// The context this session was requested for.
    pub fn origin(&self) -> &SongContext {
        &self.inner.origin
    }

    pub fn flags(&self) -> SessionFlags {
        self.inner.flags
    }

    pub fn loop_count(&self) -> i32 {
        self.inner.loop_count
    }

    pub fn end_action(&self) -> Option<&EndAction> {
        self.inner.end_action.as_ref()
    }

    pub fn settings(&self) -> &PlaybackSettings {
        &self.inner.env.settings
    }

    pub fn state(&self) -> SessionState {
        self.phase().state()
    }

    pub fn music(&self) -> Option<Arc<SessionMusic>> {
        self.phase().music().cloned()
    }

    /// True while the transport may still be producing this session's sound.
    pub fn is_sounding(&self) -> bool {
        matches!(
            *self.phase(),
            Phase::Playing(_) | Phase::Outdated { sounding: true, .. }
        )
    }

    pub fn update_count(&self) -> u64 {
        self.inner.update_count.load(Ordering::Acquire)
    }

    pub fn ptr_eq(&self, other: &PlaybackSession) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn subscribe(
        &self,
        callback: impl Fn(&SessionEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.events.subscribe(callback)
    }

    pub(crate) fn matches(
        &self,
        kind: SessionKind,
        context: &SongContext,
        flags: SessionFlags,
        loop_count: i32,
        end_action: &Option<EndAction>,
    ) -> bool {
        self.inner.kind == kind
            && self.inner.origin == *context
            && self.inner.flags == flags
            && self.inner.loop_count == normalize_loop_count(loop_count)
            && self.inner.end_action == *end_action
    }

    /// Apply a transition computed from the current phase. `next` returns
    /// `None` when `op` is illegal there.
    fn transition(
        &self,
        op: &'static str,
        next: impl FnOnce(&Phase) -> Option<Phase>,
    ) -> Result<SessionState, SessionError> {
        let (old, new) = {
            let mut phase = self.phase();
            let old = phase.state();
            if old == SessionState::Closed {
                drop(phase);
                log::error!(target: "session", "{}: {} on closed session", self.inner.id, op);
                return Err(SessionError::Closed);
            }
            match next(&phase) {
                Some(p) => {
                    *phase = p;
                    (old, phase.state())
                }
                None => {
                    drop(phase);
                    log::error!(target: "session", "{}: illegal {} in state {:?}", self.inner.id, op, old);
                    return Err(SessionError::IllegalTransition { op, state: old });
                }
            }
        };
        self.state_changed(old, new);
        Ok(new)
    }

    fn state_changed(&self, old: SessionState, new: SessionState) {
        if old != new {
            log::debug!(target: "session", "{}: {:?} -> {:?}", self.inner.id, old, new);
            self.inner.events.notify(&SessionEvent::StateChanged { old, new });
        }
    }

    /// Generate the music. A no-op when already generated. On failure the
    /// session stays `New` and may be retried.
    pub fn generate(&self, silent: bool) -> Result<(), SessionError> {
        match self.phase().state() {
            SessionState::New => {}
            SessionState::Generated => return Ok(()),
            SessionState::Closed => return Err(SessionError::Closed),
            state => {
                log::error!(target: "session", "{}: illegal generate in state {:?}", self.inner.id, state);
                return Err(SessionError::IllegalTransition {
                    op: "generate",
                    state,
                });
            }
        }

        let context = &self.inner.context;
        let epoch = self.inner.dirty_epoch.load(Ordering::Acquire);
        let song = context.song().snapshot();
        let mix = context.midi_mix().snapshot();
        let options = GenerationOptions {
            only_voices: None,
            silent,
        };
        let phrases = match self.inner.env.generator.generate(context, &options) {
            Ok(phrases) => phrases,
            Err(e) => {
                if silent {
                    log::debug!(target: "session", "{}: generation failed: {}", self.inner.id, e);
                } else {
                    log::warn!(target: "session", "{}: generation failed: {}", self.inner.id, e);
                }
                return Err(e.into());
            }
        };
        let music = Arc::new(SessionMusic::build(
            context,
            &song,
            &mix,
            phrases,
            self.inner.flags,
            &self.inner.env.settings.snapshot(),
        ));

        let changed = self.inner.dirty_epoch.load(Ordering::Acquire) != epoch;
        let (old, new) = {
            let mut phase = self.phase();
            match *phase {
                Phase::New => {
                    *phase = if changed {
                        Phase::Outdated {
                            music,
                            sounding: false,
                        }
                    } else {
                        Phase::Generated(music)
                    };
                    (SessionState::New, phase.state())
                }
                Phase::Closed => return Err(SessionError::Closed),
                // A concurrent generate won
                _ => return Ok(()),
            }
        };
        if changed {
            log::info!(target: "session", "{}: edited during generation, outdated", self.inner.id);
            self.state_changed(old, SessionState::Generated);
            self.state_changed(SessionState::Generated, new);
        } else {
            self.state_changed(old, new);
        }
        Ok(())
    }

    pub fn play(&self) -> Result<(), SessionError> {
        self.transition("play", |phase| match phase {
            Phase::Generated(m) | Phase::Stopped(m) | Phase::Paused(m) => {
                Some(Phase::Playing(Arc::clone(m)))
            }
            _ => None,
        })?;
        Ok(())
    }

    pub fn pause(&self) -> Result<(), SessionError> {
        self.transition("pause", |phase| match phase {
            Phase::Playing(m) => Some(Phase::Paused(Arc::clone(m))),
            Phase::Outdated { music, .. } => Some(Phase::Outdated {
                music: Arc::clone(music),
                sounding: false,
            }),
            _ => None,
        })?;
        Ok(())
    }

    pub fn stop(&self) -> Result<(), SessionError> {
        self.transition("stop", |phase| match phase {
            Phase::Playing(m) | Phase::Paused(m) => Some(Phase::Generated(Arc::clone(m))),
            Phase::Outdated { music, .. } => Some(Phase::Outdated {
                music: Arc::clone(music),
                sounding: false,
            }),
            _ => None,
        })?;
        Ok(())
    }

    /// Natural end of playback, signalled by the transport. Runs the end
    /// action once and stops background updates.
    pub fn end_of_playback(&self) -> Result<(), SessionError> {
        self.transition("end_of_playback", |phase| match phase {
            Phase::Playing(m) => Some(Phase::Stopped(Arc::clone(m))),
            Phase::Outdated { music, .. } => Some(Phase::Outdated {
                music: Arc::clone(music),
                sounding: false,
            }),
            _ => None,
        })?;
        self.retire_updater();
        if let Some(action) = &self.inner.end_action {
            action.run();
        }
        Ok(())
    }

    /// Close from any state. Closing twice is a no-op.
    pub fn close(&self) -> Result<(), SessionError> {
        let old = {
            let mut phase = self.phase();
            let old = phase.state();
            if old == SessionState::Closed {
                return Ok(());
            }
            *phase = Phase::Closed;
            old
        };
        log::debug!(target: "session", "{}: closed (was {:?})", self.inner.id, old);

        let subscriptions = std::mem::take(&mut *self.subscriptions());
        drop(subscriptions);
        self.retire_updater();

        self.state_changed(old, SessionState::Closed);
        self.inner.events.notify(&SessionEvent::Closed);
        Ok(())
    }

    /// External dirty signal: the music no longer matches its inputs.
    pub fn mark_dirty(&self, reason: &str) {
        self.inner.dirty_epoch.fetch_add(1, Ordering::AcqRel);
        let change = {
            let mut phase = self.phase();
            let old = phase.state();
            let next = match &*phase {
                Phase::Generated(m) | Phase::Paused(m) | Phase::Stopped(m) => Phase::Outdated {
                    music: Arc::clone(m),
                    sounding: false,
                },
                Phase::Playing(m) => Phase::Outdated {
                    music: Arc::clone(m),
                    sounding: true,
                },
                Phase::New | Phase::Outdated { .. } | Phase::Closed => return,
            };
            *phase = next;
            (old, phase.state())
        };
        log::info!(target: "session", "{}: outdated by {}", self.inner.id, reason);
        self.retire_updater();
        self.state_changed(change.0, change.1);
    }

    /// Relevant leadsheet or mix change: regenerate in the background when
    /// updates are enabled, otherwise outdate.
    fn content_changed(&self, reason: &str) {
        let can_update = matches!(
            *self.phase(),
            Phase::Generated(_) | Phase::Playing(_) | Phase::Paused(_)
        );
        if can_update {
            let updater = self.updater();
            if let Some(updater) = updater.as_ref() {
                self.inner.dirty_epoch.fetch_add(1, Ordering::AcqRel);
                match self.inner.context.deep_clone(None) {
                    Ok(copy) => {
                        let seq = updater.queue.submit(copy, GenerationOptions::default());
                        log::debug!(target: "session", "{}: update #{} for {}", self.inner.id, seq, reason);
                        return;
                    }
                    Err(e) => {
                        log::warn!(target: "session", "{}: cannot update: {}", self.inner.id, e);
                    }
                }
            }
        }
        self.mark_dirty(reason);
    }

    /// Regenerate in the background on leadsheet and mix changes instead of
    /// becoming outdated. Only for `Basic` sessions. The updater is
    /// retired when the session becomes `Outdated` or finishes playing.
    pub fn enable_updates(&self, config: QueueConfig) -> Result<(), SessionError> {
        let state = self.state();
        if state == SessionState::Closed {
            return Err(SessionError::Closed);
        }
        if self.inner.kind != SessionKind::Basic {
            log::error!(target: "session", "{}: updates need a basic session", self.inner.id);
            return Err(SessionError::IllegalTransition {
                op: "enable_updates",
                state,
            });
        }
        let mut updater = self.updater();
        if updater.is_some() {
            return Ok(());
        }
        let queue = MusicGenerationQueue::new(Arc::clone(&self.inner.env.generator), config);
        let weak = Arc::downgrade(&self.inner);
        let results = queue.subscribe(move |result| {
            if let Some(session) = upgrade(&weak) {
                session.apply_update(result);
            }
        });
        *updater = Some(Updater {
            queue,
            _results: results,
        });
        log::debug!(target: "session", "{}: updates enabled", self.inner.id);
        Ok(())
    }

    pub fn updates_enabled(&self) -> bool {
        self.updater().is_some()
    }

    /// Stop background updates. The queue worker is not joined, so this is
    /// safe from the worker itself and never waits on a running generator.
    fn retire_updater(&self) {
        let Some(Updater { queue, _results }) = self.updater().take() else {
            return;
        };
        drop(_results);
        queue.shutdown_detached();
        log::debug!(target: "session", "{}: updates stopped", self.inner.id);
    }

    fn apply_update(&self, result: &GenerationResult) {
        let phrases = match &result.outcome {
            Ok(phrases) => phrases.clone(),
            Err(e) => {
                self.mark_dirty(&format!("failed update: {}", e));
                return;
            }
        };
        let context = &result.context;
        let music = Arc::new(SessionMusic::build(
            context,
            &context.song().snapshot(),
            &context.midi_mix().snapshot(),
            phrases,
            self.inner.flags,
            &self.inner.env.settings.snapshot(),
        ));
        {
            let mut phase = self.phase();
            let next = match &*phase {
                Phase::Generated(_) => Phase::Generated(music),
                Phase::Playing(_) => Phase::Playing(music),
                Phase::Paused(_) => Phase::Paused(music),
                Phase::Stopped(_) => Phase::Stopped(music),
                Phase::New | Phase::Outdated { .. } | Phase::Closed => {
                    log::debug!(target: "session", "{}: update #{} ignored", self.inner.id, result.seq);
                    return;
                }
            };
            *phase = next;
        }
        let count = self.inner.update_count.fetch_add(1, Ordering::AcqRel) + 1;
        log::debug!(target: "session", "{}: music updated ({})", self.inner.id, count);
        self.inner.events.notify(&SessionEvent::Updated { count });
    }
}

fn upgrade(weak: &Weak<SessionInner>) -> Option<PlaybackSession> {
    weak.upgrade().map(|inner| PlaybackSession { inner })
}

impl PartialEq for PlaybackSession {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for PlaybackSession {}

impl std::fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("state", &self.state())
            .field("context", &self.inner.origin)
            .finish()
    }
}

impl std::fmt::Display for PlaybackSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{:?}]", self.inner.id, self.state())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::PatternGenerator;
    use crate::model::{MidiMixHandle, SongHandle};
    use comping_types::{ChordLeadSheet, ChordSymbol, Position, Rhythm, Song, TimeSignature};

    fn env() -> SessionEnv {
        SessionEnv::new(Arc::new(PatternGenerator::new()), PlaybackSettings::default())
    }

    fn context() -> SongContext {
        let mut ls = ChordLeadSheet::new(4, "A", TimeSignature::FOUR_FOUR);
        ls.add_chord(Position::new(0, 0.0), ChordSymbol::new(2, "m7"));
        let mut song = Song::new("t", 120, ls);
        song.add_song_part("A", Rhythm::jazz_trio("swing", TimeSignature::FOUR_FOUR));
        let mix = MidiMixHandle::for_song(&song);
        SongContext::new(&SongHandle::new(song), &mix, None).unwrap()
    }

    fn generated() -> PlaybackSession {
        let s = PlaybackSession::new(context(), SessionFlags::default(), 0, None, &env());
        s.generate(false).unwrap();
        s
    }

    #[test]
    fn generate_then_play_pause_stop() {
        let s = generated();
        assert_eq!(s.state(), SessionState::Generated);
        assert!(s.music().is_some());
        s.play().unwrap();
        s.pause().unwrap();
        assert_eq!(s.state(), SessionState::Paused);
        s.play().unwrap();
        s.stop().unwrap();
        assert_eq!(s.state(), SessionState::Generated);
    }

    #[test]
    fn generate_twice_is_noop() {
        let s = generated();
        let music = s.music().unwrap();
        s.generate(false).unwrap();
        assert!(Arc::ptr_eq(&music, &s.music().unwrap()));
    }

    #[test]
    fn play_before_generate_is_illegal() {
        let s = PlaybackSession::new(context(), SessionFlags::default(), 0, None, &env());
        assert_eq!(
            s.play(),
            Err(SessionError::IllegalTransition {
                op: "play",
                state: SessionState::New
            })
        );
    }

    #[test]
    fn end_of_playback_stops_and_runs_action() {
        let count = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&count);
        let action = EndAction::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        let s = PlaybackSession::new(context(), SessionFlags::default(), 0, Some(action), &env());
        s.generate(false).unwrap();
        s.play().unwrap();
        s.end_of_playback().unwrap();
        assert_eq!(s.state(), SessionState::Stopped);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        s.play().unwrap();
        assert_eq!(s.state(), SessionState::Playing);
    }

    #[test]
    fn outdated_keeps_sounding_until_stopped() {
        let s = generated();
        s.play().unwrap();
        s.mark_dirty("test");
        assert_eq!(s.state(), SessionState::Outdated);
        assert!(s.is_sounding());
        s.stop().unwrap();
        assert!(!s.is_sounding());
        assert!(s.play().is_err());
        assert!(s.generate(true).is_err());
    }

    #[test]
    fn closed_rejects_everything_but_close() {
        let s = generated();
        s.close().unwrap();
        s.close().unwrap();
        assert_eq!(s.play(), Err(SessionError::Closed));
        assert_eq!(s.generate(false), Err(SessionError::Closed));
        assert!(s.music().is_none());
    }

    #[test]
    fn end_actions_compare_by_identity() {
        let a = EndAction::new(|| {});
        let b = EndAction::new(|| {});
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn settings_relevance_follows_flags() {
        let flags = SessionFlags {
            click: true,
            ..SessionFlags::default()
        };
        assert!(flags.settings_event_is_relevant(&SettingsEvent::ClickPitchChanged));
        assert!(!flags.settings_event_is_relevant(&SettingsEvent::PrecountModeChanged(
            crate::model::PrecountMode::Two
        )));
        assert!(!flags.settings_event_is_relevant(&SettingsEvent::LoopCountChanged(3)));
    }
}

//! Finds or creates sessions so identical requests share one generation.
//!
//! Lock order is registry, then session. Sessions notify their closing after
//! releasing their own lock, and the registry drops removed entries after
//! releasing its lock.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use super::{
    EndAction, PlaybackSession, SessionEnv, SessionError, SessionEvent, SessionFlags, SessionId,
    SessionKind, SessionState,
};
use crate::context::SongContext;
use crate::notify::Subscription;

struct Entry {
    session: PlaybackSession,
    _on_close: Subscription,
}

type Entries = Arc<Mutex<Vec<Entry>>>;

pub struct SessionRegistry {
    env: SessionEnv,
    entries: Entries,
}

fn lock(entries: &Mutex<Vec<Entry>>) -> MutexGuard<'_, Vec<Entry>> {
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SessionRegistry {
    pub fn new(env: SessionEnv) -> Self {
        Self {
            env,
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn env(&self) -> &SessionEnv {
        &self.env
    }

    /// A `New` or `Generated` basic session for this request, created if needed.
    /// Outdated or closed sessions registered under the same request are
    /// dropped from the registry when the replacement is created.
    pub fn get_or_create_session(
        &self,
        context: &SongContext,
        flags: SessionFlags,
        loop_count: i32,
        end_action: Option<EndAction>,
    ) -> PlaybackSession {
        let (session, stale) = {
            let mut entries = lock(&self.entries);
            if let Some(found) = Self::find(&entries, SessionKind::Basic, context, flags, loop_count, &end_action) {
                log::debug!(target: "registry", "reusing {}", found);
                return found;
            }
            let stale = take_stale(&mut entries, SessionKind::Basic, context, flags, loop_count, &end_action);
            let session = PlaybackSession::new(context.clone(), flags, loop_count, end_action, &self.env);
            if let Some(config) = &self.env.updates {
                if let Err(e) = session.enable_updates(config.clone()) {
                    log::warn!(target: "registry", "{}: {}", session.id(), e);
                }
            }
            self.register(&mut entries, &session);
            (session, stale)
        };
        retire(stale);
        session
    }

    /// Same as [`get_or_create_session`](Self::get_or_create_session) for
    /// static sessions, keyed by the requested (not the copied) context.
    pub fn get_or_create_static_session(
        &self,
        context: &SongContext,
        flags: SessionFlags,
        loop_count: i32,
        end_action: Option<EndAction>,
    ) -> Result<PlaybackSession, SessionError> {
        let (session, stale) = {
            let mut entries = lock(&self.entries);
            if let Some(found) = Self::find(&entries, SessionKind::Static, context, flags, loop_count, &end_action) {
                log::debug!(target: "registry", "reusing {}", found);
                return Ok(found);
            }
            let session =
                PlaybackSession::new_static(context.clone(), flags, loop_count, end_action.clone(), &self.env)?;
            let stale = take_stale(&mut entries, SessionKind::Static, context, flags, loop_count, &end_action);
            self.register(&mut entries, &session);
            (session, stale)
        };
        retire(stale);
        Ok(session)
    }

    fn find(
        entries: &[Entry],
        kind: SessionKind,
        context: &SongContext,
        flags: SessionFlags,
        loop_count: i32,
        end_action: &Option<EndAction>,
    ) -> Option<PlaybackSession> {
        entries
            .iter()
            .map(|e| &e.session)
            .find(|s| {
                s.matches(kind, context, flags, loop_count, end_action) && s.state().is_reusable()
            })
            .cloned()
    }

    fn register(&self, entries: &mut Vec<Entry>, session: &PlaybackSession) {
        let id = session.id();
        let weak: Weak<Mutex<Vec<Entry>>> = Arc::downgrade(&self.entries);
        let on_close = session.subscribe(move |event| {
            if *event == SessionEvent::Closed {
                if let Some(entries) = weak.upgrade() {
                    remove(&entries, id);
                }
            }
        });
        entries.push(Entry {
            session: session.clone(),
            _on_close: on_close,
        });
        log::debug!(target: "registry", "registered {} ({} live)", id, entries.len());
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sessions(&self) -> Vec<PlaybackSession> {
        lock(&self.entries)
            .iter()
            .map(|e| e.session.clone())
            .collect()
    }

    pub fn close_all(&self) {
        let drained: Vec<Entry> = std::mem::take(&mut *lock(&self.entries));
        log::debug!(target: "registry", "closing {} sessions", drained.len());
        for entry in &drained {
            let _ = entry.session.close();
        }
    }
}

/// Pull out the entries for this request that can no longer be reused.
fn take_stale(
    entries: &mut Vec<Entry>,
    kind: SessionKind,
    context: &SongContext,
    flags: SessionFlags,
    loop_count: i32,
    end_action: &Option<EndAction>,
) -> Vec<Entry> {
    let (stale, kept): (Vec<Entry>, Vec<Entry>) = std::mem::take(entries)
        .into_iter()
        .partition(|e| {
            e.session.matches(kind, context, flags, loop_count, end_action)
                && matches!(e.session.state(), SessionState::Outdated | SessionState::Closed)
        });
    *entries = kept;
    stale
}

/// Close replaced sessions. One still sounding is left to the transport
/// playing it and is only forgotten here. Call without the registry lock.
fn retire(stale: Vec<Entry>) {
    for Entry { session, _on_close } in stale {
        drop(_on_close);
        if session.is_sounding() {
            log::debug!(target: "registry", "forgetting {} (still sounding)", session);
        } else {
            log::debug!(target: "registry", "closing replaced {}", session);
            let _ = session.close();
        }
    }
}

fn remove(entries: &Mutex<Vec<Entry>>, id: SessionId) {
    let removed: Vec<Entry> = {
        let mut entries = lock(entries);
        let (gone, kept): (Vec<Entry>, Vec<Entry>) = std::mem::take(&mut *entries)
            .into_iter()
            .partition(|e| e.session.id() == id);
        *entries = kept;
        gone
    };
    if !removed.is_empty() {
        log::debug!(target: "registry", "deregistered {}", id);
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        self.close_all();
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::PatternGenerator;
    use crate::model::{MidiMixHandle, PlaybackSettings, SongHandle};
    use comping_types::{ChordLeadSheet, Rhythm, Song, TimeSignature};

    fn registry() -> SessionRegistry {
        SessionRegistry::new(SessionEnv::new(
            Arc::new(PatternGenerator::new()),
            PlaybackSettings::default(),
        ))
    }

    fn context() -> SongContext {
        let mut song = Song::new("r", 120, ChordLeadSheet::new(2, "A", TimeSignature::FOUR_FOUR));
        song.add_song_part("A", Rhythm::jazz_trio("swing", TimeSignature::FOUR_FOUR));
        let mix = MidiMixHandle::for_song(&song);
        SongContext::new(&SongHandle::new(song), &mix, None).unwrap()
    }

    #[test]
    fn same_request_same_session() {
        let reg = registry();
        let ctx = context();
        let a = reg.get_or_create_session(&ctx, SessionFlags::default(), 0, None);
        let b = reg.get_or_create_session(&ctx.clone(), SessionFlags::default(), 0, None);
        assert_eq!(a, b);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn loop_count_is_part_of_the_key() {
        let reg = registry();
        let ctx = context();
        let a = reg.get_or_create_session(&ctx, SessionFlags::default(), 0, None);
        let b = reg.get_or_create_session(&ctx, SessionFlags::default(), 2, None);
        assert_ne!(a, b);
    }

    #[test]
    fn closed_session_deregisters() {
        let reg = registry();
        let ctx = context();
        let a = reg.get_or_create_session(&ctx, SessionFlags::default(), 0, None);
        a.close().unwrap();
        assert!(reg.is_empty());
        let b = reg.get_or_create_session(&ctx, SessionFlags::default(), 0, None);
        assert_ne!(a, b);
    }

    #[test]
    fn static_and_basic_do_not_mix() {
        let reg = registry();
        let ctx = context();
        let basic = reg.get_or_create_session(&ctx, SessionFlags::default(), 0, None);
        let fixed = reg
            .get_or_create_static_session(&ctx, SessionFlags::default(), 0, None)
            .unwrap();
        assert_ne!(basic, fixed);
        assert_eq!(fixed.kind(), SessionKind::Static);
        let again = reg
            .get_or_create_static_session(&ctx, SessionFlags::default(), 0, None)
            .unwrap();
        assert_eq!(fixed, again);
    }

    #[test]
    fn close_all_empties() {
        let reg = registry();
        let s = reg.get_or_create_session(&context(), SessionFlags::default(), 0, None);
        reg.close_all();
        assert!(reg.is_empty());
        assert_eq!(s.state(), crate::session::SessionState::Closed);
    }
}

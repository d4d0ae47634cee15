//! Observable song handle.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use comping_types::{ChordSymbol, Position, Rhythm, Song, SongPart, TimeSignature};

use crate::notify::{Notifier, Subscription};

static NEXT_SONG_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SongId(u64);

impl std::fmt::Display for SongId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "song#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SongEvent {
    /// Chord symbols or sections changed.
    ChordLeadSheetChanged,
    /// Song parts added, removed, resized or given another rhythm.
    StructureChanged,
    /// Whole content replaced (revert, reload).
    Reset,
    Saved,
    TempoChanged(u16),
    NameChanged(String),
    Closed,
}

impl SongEvent {
    /// Does the event change the music a generator would produce?
    pub fn is_music_relevant(&self) -> bool {
        matches!(
            self,
            SongEvent::ChordLeadSheetChanged | SongEvent::StructureChanged | SongEvent::Reset
        )
    }

    /// Relevant changes that alter bar/beat/tick geometry.
    pub fn is_structural(&self) -> bool {
        matches!(self, SongEvent::StructureChanged | SongEvent::Reset)
    }
}

struct SongShared {
    id: SongId,
    song: RwLock<Song>,
    modified: AtomicBool,
    notifier: Notifier<SongEvent>,
}

/// Shared, identity-compared song. Clones refer to the same song.
#[derive(Clone)]
pub struct SongHandle {
    inner: Arc<SongShared>,
}

impl SongHandle {
    pub fn new(song: Song) -> Self {
        Self {
            inner: Arc::new(SongShared {
                id: SongId(NEXT_SONG_ID.fetch_add(1, Ordering::Relaxed)),
                song: RwLock::new(song),
                modified: AtomicBool::new(false),
                notifier: Notifier::new(),
            }),
        }
    }

    pub fn id(&self) -> SongId {
        self.inner.id
    }

    pub fn ptr_eq(&self, other: &SongHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn read<R>(&self, f: impl FnOnce(&Song) -> R) -> R {
        let song = self.inner.song.read().unwrap_or_else(PoisonError::into_inner);
        f(&song)
    }

    pub fn snapshot(&self) -> Song {
        self.read(|s| s.clone())
    }

    /// Independent copy: new identity, no subscribers.
    pub fn deep_copy(&self) -> SongHandle {
        SongHandle::new(self.snapshot())
    }

    pub fn is_modified(&self) -> bool {
        self.inner.modified.load(Ordering::Acquire)
    }

    pub fn subscribe(&self, callback: impl Fn(&SongEvent) + Send + Sync + 'static) -> Subscription {
        self.inner.notifier.subscribe(callback)
    }

    /// Number of live subscriptions.
    pub fn listener_count(&self) -> usize {
        self.inner.notifier.listener_count()
    }

    fn mutate<R>(&self, event: SongEvent, f: impl FnOnce(&mut Song) -> R) -> R {
        let result = {
            let mut song = self.inner.song.write().unwrap_or_else(PoisonError::into_inner);
            f(&mut song)
        };
        if event.is_music_relevant() || matches!(event, SongEvent::TempoChanged(_) | SongEvent::NameChanged(_)) {
            self.inner.modified.store(true, Ordering::Release);
        }
        log::debug!(target: "song", "{} {:?}", self.inner.id, event);
        self.inner.notifier.notify(&event);
        result
    }

    pub fn set_chord(&self, position: Position, chord: ChordSymbol) {
        self.mutate(SongEvent::ChordLeadSheetChanged, |s| {
            s.leadsheet.add_chord(position, chord)
        })
    }

    pub fn remove_chord(&self, position: Position) -> bool {
        self.mutate(SongEvent::ChordLeadSheetChanged, |s| {
            s.leadsheet.remove_chord(position).is_some()
        })
    }

    pub fn add_section(&self, name: &str, start_bar: i32, time_signature: TimeSignature) {
        self.mutate(SongEvent::ChordLeadSheetChanged, |s| {
            s.leadsheet.add_section(name, start_bar, time_signature)
        })
    }

    pub fn add_song_part(&self, parent_section: &str, rhythm: Rhythm) -> usize {
        self.mutate(SongEvent::StructureChanged, |s| {
            s.add_song_part(parent_section, rhythm)
        })
    }

    pub fn insert_song_part(&self, index: usize, part: SongPart) -> usize {
        self.mutate(SongEvent::StructureChanged, |s| s.insert_song_part(index, part))
    }

    pub fn remove_song_part(&self, index: usize) -> Option<SongPart> {
        self.mutate(SongEvent::StructureChanged, |s| s.remove_song_part(index))
    }

    pub fn resize_song_part(&self, index: usize, nb_bars: i32) -> bool {
        self.mutate(SongEvent::StructureChanged, |s| s.resize_song_part(index, nb_bars))
    }

    pub fn set_song_part_rhythm(&self, index: usize, rhythm: Rhythm) -> bool {
        self.mutate(SongEvent::StructureChanged, |s| {
            s.set_song_part_rhythm(index, rhythm)
        })
    }

    pub fn set_tempo(&self, tempo: u16) {
        let tempo = tempo.max(1);
        self.mutate(SongEvent::TempoChanged(tempo), |s| s.tempo = tempo)
    }

    pub fn set_name(&self, name: &str) {
        self.mutate(SongEvent::NameChanged(name.to_string()), |s| {
            s.name = name.to_string()
        })
    }

    /// Replace the whole content.
    pub fn reset(&self, song: Song) {
        self.mutate(SongEvent::Reset, |s| *s = song)
    }

    pub fn mark_saved(&self) {
        self.inner.modified.store(false, Ordering::Release);
        self.inner.notifier.notify(&SongEvent::Saved);
    }

    /// Tell observers the song is going away. Sessions built on it close themselves.
    pub fn close(&self) {
        log::debug!(target: "song", "{} closed", self.inner.id);
        self.inner.notifier.notify(&SongEvent::Closed);
    }

    fn downgrade(&self) -> Weak<SongShared> {
        Arc::downgrade(&self.inner)
    }
}

impl PartialEq for SongHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for SongHandle {}

impl std::hash::Hash for SongHandle {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl std::fmt::Debug for SongHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = self.read(|s| s.name.clone());
        f.debug_struct("SongHandle")
            .field("id", &self.inner.id)
            .field("name", &name)
            .finish()
    }
}

/// Songs currently open in the application. Holds weak references only.
#[derive(Default)]
pub struct SongRegistry {
    songs: Mutex<Vec<Weak<SongShared>>>,
}

impl SongRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, song: &SongHandle) {
        let mut songs = self.songs.lock().unwrap_or_else(PoisonError::into_inner);
        songs.retain(|w| w.strong_count() > 0);
        if !songs.iter().any(|w| w.ptr_eq(&song.downgrade())) {
            songs.push(song.downgrade());
        }
    }

    pub fn unregister(&self, song: &SongHandle) {
        let target = song.downgrade();
        let mut songs = self.songs.lock().unwrap_or_else(PoisonError::into_inner);
        songs.retain(|w| w.strong_count() > 0 && !w.ptr_eq(&target));
    }

    pub fn contains(&self, song: &SongHandle) -> bool {
        let target = song.downgrade();
        let songs = self.songs.lock().unwrap_or_else(PoisonError::into_inner);
        songs.iter().any(|w| w.ptr_eq(&target))
    }

    /// Open songs still alive.
    pub fn songs(&self) -> Vec<SongHandle> {
        let songs = self.songs.lock().unwrap_or_else(PoisonError::into_inner);
        songs
            .iter()
            .filter_map(Weak::upgrade)
            .map(|inner| SongHandle { inner })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use comping_types::ChordLeadSheet;
    use std::sync::atomic::AtomicUsize;

    fn song() -> SongHandle {
        let mut s = Song::new("s", 120, ChordLeadSheet::new(4, "A", TimeSignature::FOUR_FOUR));
        s.add_song_part("A", Rhythm::jazz_trio("swing", TimeSignature::FOUR_FOUR));
        SongHandle::new(s)
    }

    #[test]
    fn clones_share_identity_copies_do_not() {
        let a = song();
        let b = a.clone();
        let c = a.deep_copy();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.snapshot(), c.snapshot());
    }

    #[test]
    fn mutations_notify_and_mark_modified() {
        let s = song();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        let _sub = s.subscribe(move |e| seen2.lock().unwrap().push(e.clone()));
        s.set_chord(Position::new(1, 0.0), ChordSymbol::new(7, "7"));
        assert!(s.is_modified());
        s.mark_saved();
        assert!(!s.is_modified());
        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![SongEvent::ChordLeadSheetChanged, SongEvent::Saved]
        );
    }

    #[test]
    fn deep_copy_has_no_subscribers() {
        let s = song();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let _sub = s.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        let copy = s.deep_copy();
        copy.set_tempo(90);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn registry_tracks_live_songs() {
        let registry = SongRegistry::new();
        let s = song();
        registry.register(&s);
        registry.register(&s);
        assert_eq!(registry.songs().len(), 1);
        assert!(registry.contains(&s));
        registry.unregister(&s);
        assert!(!registry.contains(&s));
    }

    #[test]
    fn relevance_of_song_events() {
        assert!(SongEvent::ChordLeadSheetChanged.is_music_relevant());
        assert!(SongEvent::StructureChanged.is_structural());
        assert!(!SongEvent::Saved.is_music_relevant());
        assert!(!SongEvent::TempoChanged(100).is_music_relevant());
        assert!(!SongEvent::NameChanged("x".into()).is_music_relevant());
    }
}

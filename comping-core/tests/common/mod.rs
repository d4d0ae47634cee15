#![allow(dead_code)]
//! Shared fixtures for comping-core integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use comping_core::context::SongContext;
use comping_core::generator::{
    GenerationError, GenerationOptions, MusicGenerator, PatternGenerator, PhraseMap,
};
use comping_core::model::{MidiMixHandle, PlaybackSettings, SongHandle};
use comping_core::queue::QueueConfig;
use comping_core::session::{SessionEnv, SessionRegistry};
use comping_types::{ChordLeadSheet, ChordSymbol, Position, Rhythm, Song, TimeSignature};
use crossbeam_channel::{Receiver, Sender};

/// Single-part 4/4 song with a chord every bar.
pub fn song(nb_bars: i32, tempo: u16) -> SongHandle {
    let mut ls = ChordLeadSheet::new(nb_bars, "A", TimeSignature::FOUR_FOUR);
    for bar in 0..nb_bars {
        ls.add_chord(Position::new(bar, 0.0), ChordSymbol::new((bar * 5 % 12) as u8, "7"));
    }
    let mut song = Song::new("fixture", tempo, ls);
    song.add_song_part("A", Rhythm::jazz_trio("swing", TimeSignature::FOUR_FOUR));
    SongHandle::new(song)
}

/// 4/4, 3/4 and 6/8 parts: 4 + 4 + 2 bars.
pub fn mixed_song() -> SongHandle {
    let mut ls = ChordLeadSheet::new(10, "A", TimeSignature::FOUR_FOUR);
    ls.add_section("B", 4, TimeSignature::THREE_FOUR);
    ls.add_section("C", 8, TimeSignature::SIX_EIGHT);
    ls.add_chord(Position::new(0, 0.0), ChordSymbol::new(0, "maj7"));
    ls.add_chord(Position::new(4, 0.0), ChordSymbol::new(2, "m7"));
    ls.add_chord(Position::new(8, 0.0), ChordSymbol::new(7, "7"));
    let mut song = Song::new("mixed", 120, ls);
    song.add_song_part("A", Rhythm::jazz_trio("swing", TimeSignature::FOUR_FOUR));
    song.add_song_part("B", Rhythm::jazz_trio("waltz", TimeSignature::THREE_FOUR));
    song.add_song_part("C", Rhythm::jazz_trio("jig", TimeSignature::SIX_EIGHT));
    SongHandle::new(song)
}

pub fn context_for(song: &SongHandle) -> (SongContext, MidiMixHandle) {
    let mix = MidiMixHandle::for_song(&song.snapshot());
    let context = SongContext::new(song, &mix, None).unwrap();
    (context, mix)
}

pub fn env_with(generator: Arc<dyn MusicGenerator>) -> SessionEnv {
    SessionEnv::new(generator, PlaybackSettings::default())
}

pub fn env() -> SessionEnv {
    env_with(Arc::new(PatternGenerator::new()))
}

pub fn registry() -> SessionRegistry {
    SessionRegistry::new(env())
}

pub fn no_buffer() -> QueueConfig {
    QueueConfig {
        pre_update_buffer: Duration::ZERO,
    }
}

/// Poll `cond` until true, or panic after `timeout`.
pub fn wait_until(timeout: Duration, what: &str, cond: impl Fn() -> bool) {
    let start = Instant::now();
    while !cond() {
        if start.elapsed() > timeout {
            panic!("timed out waiting for {}", what);
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// Counts calls, then delegates to `PatternGenerator`.
#[derive(Default)]
pub struct CountingGenerator {
    calls: AtomicUsize,
}

impl CountingGenerator {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MusicGenerator for CountingGenerator {
    fn generate(
        &self,
        context: &SongContext,
        options: &GenerationOptions,
    ) -> Result<PhraseMap, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        PatternGenerator::new().generate(context, options)
    }
}

/// Fails the first `failures` calls.
pub struct FlakyGenerator {
    failures: AtomicUsize,
}

impl FlakyGenerator {
    pub fn new(failures: usize) -> Self {
        Self {
            failures: AtomicUsize::new(failures),
        }
    }
}

impl MusicGenerator for FlakyGenerator {
    fn generate(
        &self,
        context: &SongContext,
        options: &GenerationOptions,
    ) -> Result<PhraseMap, GenerationError> {
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(GenerationError::MissingResource("soundfont".into()));
        }
        PatternGenerator::new().generate(context, options)
    }
}

/// Blocks each call until released, reporting entry on `entered`.
pub struct GatedGenerator {
    entered: Sender<()>,
    release: Receiver<()>,
}

/// Returns the generator, the "entered" receiver and the release sender.
/// Dropping the release sender lets every call through.
pub fn gated() -> (GatedGenerator, Receiver<()>, Sender<()>) {
    let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
    let (release_tx, release_rx) = crossbeam_channel::unbounded();
    (
        GatedGenerator {
            entered: entered_tx,
            release: release_rx,
        },
        entered_rx,
        release_tx,
    )
}

impl MusicGenerator for GatedGenerator {
    fn generate(
        &self,
        context: &SongContext,
        options: &GenerationOptions,
    ) -> Result<PhraseMap, GenerationError> {
        let _ = self.entered.send(());
        let _ = self.release.recv_timeout(Duration::from_secs(5));
        PatternGenerator::new().generate(context, options)
    }
}

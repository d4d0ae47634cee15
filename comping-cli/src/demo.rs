//! Built-in song so the binary has something to play.

use comping_core::model::SongHandle;
use comping_types::{ChordLeadSheet, ChordSymbol, Position, Rhythm, Song, TimeSignature};

/// AABA-ish: 8 bars of swing, then 4 bars of waltz.
pub fn song(tempo: u16) -> SongHandle {
    let mut ls = ChordLeadSheet::new(12, "A", TimeSignature::FOUR_FOUR);
    ls.add_section("B", 8, TimeSignature::THREE_FOUR);

    // ii-V-I in C, then in Bb
    let changes: [(i32, f64, u8, &str); 10] = [
        (0, 0.0, 2, "m7"),
        (1, 0.0, 7, "7"),
        (2, 0.0, 0, "maj7"),
        (3, 2.0, 9, "7"),
        (4, 0.0, 0, "m7"),
        (5, 0.0, 5, "7"),
        (6, 0.0, 10, "maj7"),
        (7, 0.0, 7, "7alt"),
        (8, 0.0, 2, "m7b5"),
        (10, 0.0, 7, "7"),
    ];
    for (bar, beat, root, quality) in changes {
        ls.add_chord(Position::new(bar, beat), ChordSymbol::new(root, quality));
    }

    let mut song = Song::new("demo", tempo, ls);
    song.add_song_part("A", Rhythm::jazz_trio("swing", TimeSignature::FOUR_FOUR));
    song.add_song_part("B", Rhythm::jazz_trio("waltz", TimeSignature::THREE_FOUR));
    SongHandle::new(song)
}

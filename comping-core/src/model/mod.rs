//! Observable handles over the song model, the MIDI mix and the playback
//! settings. Sessions subscribe to these to learn when their music is stale.

pub mod midi_mix;
pub mod settings;
pub mod song;

pub use midi_mix::{MidiMixEvent, MidiMixHandle};
pub use settings::{PlaybackDefaults, PlaybackSettings, PrecountMode, SettingsError, SettingsEvent};
pub use song::{SongEvent, SongHandle, SongId, SongRegistry};

//! Transport: plays a session's music into a MIDI sink and reports progress
//! as [`PlaybackEvent`]s.

pub mod commands;
pub mod events;
pub mod handle;
pub mod player;
mod thread;

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use thiserror::Error;

use crate::session::{SessionError, SessionId};

pub use commands::TransportCmd;
pub use events::{ActivityCoalescer, Collector, PlaybackEvent, PlaybackEvents};
pub use handle::TransportHandle;
pub use player::{Player, PlayerState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MidiEvent {
    NoteOn { channel: u8, pitch: u8, velocity: u8 },
    NoteOff { channel: u8, pitch: u8 },
    AllNotesOff { channel: u8 },
}

/// Synth or MIDI port receiving the played events.
pub trait MidiSink: Send {
    fn send(&mut self, event: MidiEvent);
}

/// Sink keeping every event in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<MidiEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MidiEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn note_ons(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, MidiEvent::NoteOn { .. }))
            .count()
    }
}

impl MidiSink for MemorySink {
    fn send(&mut self, event: MidiEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// Sink that only logs, at trace level.
#[derive(Debug, Default)]
pub struct LogSink;

impl MidiSink for LogSink {
    fn send(&mut self, event: MidiEvent) {
        log::trace!(target: "midi", "{:?}", event);
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum PlaybackError {
    #[error("playback vetoed: {0}")]
    Vetoed(String),
    #[error("{0} is outdated, request a new session")]
    OutdatedSession(SessionId),
    #[error("no session loaded")]
    NoSession,
    #[error("bar {0} is outside the session")]
    BarOutOfRange(i32),
    #[error("transport thread disconnected")]
    Disconnected,
    #[error(transparent)]
    Session(#[from] SessionError),
}

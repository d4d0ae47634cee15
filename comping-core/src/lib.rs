//! # comping-core
//!
//! Playback sessions and music-generation scheduling for a backing-track
//! player: turns a song (chord leadsheet + song parts + rhythms) into MIDI
//! phrases, tracks whether that music is still valid while the song is being
//! edited, regenerates in the background, and plays it through a transport.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use comping_core::config::Config;
//! use comping_core::context::SongContext;
//! use comping_core::generator::PatternGenerator;
//! use comping_core::model::{MidiMixHandle, PlaybackSettings, SongHandle};
//! use comping_core::session::{SessionEnv, SessionFlags, SessionRegistry};
//! use comping_core::transport::{LogSink, PlaybackEvents, TransportHandle};
//!
//! let config = Config::load();
//! let settings = PlaybackSettings::from_config(&config);
//! let registry = SessionRegistry::new(SessionEnv::from_config(
//!     Arc::new(PatternGenerator::new()),
//!     settings.clone(),
//!     &config,
//! ));
//!
//! let context = SongContext::new(&song, &mix, None)?;
//! let session = registry.get_or_create_session(&context, SessionFlags::from_settings(&settings), 0, None);
//!
//! let events = PlaybackEvents::new();
//! let transport = TransportHandle::new(Box::new(LogSink), events.sender(), config.midi_activity_window_ticks());
//! transport.start(session, 0)?;
//! // on the UI thread, periodically:
//! events.dispatch_pending();
//! ```
//!
//! ## Module Overview
//!
//! - [`model`]: observable song, MIDI mix and playback settings handles
//! - [`context`]: `SongContext`, the bar/beat/tick slice of a song to generate
//! - [`generator`]: `MusicGenerator` trait and the built-in `PatternGenerator`
//! - [`session`]: `PlaybackSession` state machine, `SessionMusic`, `SessionRegistry`
//! - [`queue`]: `MusicGenerationQueue`, background generation with stale-result suppression
//! - [`transport`]: `Player`, transport thread and handle, playback event fan-out
//! - [`config`]: TOML configuration (embedded defaults + user override)
//! - [`notify`]: change notification with RAII subscriptions

pub mod config;
pub mod context;
pub mod generator;
pub mod model;
pub mod notify;
pub mod queue;
pub mod session;
pub mod transport;

pub use comping_types as types;

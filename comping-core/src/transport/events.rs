//! Playback listener fan-out.
//!
//! Producers (the transport thread, sessions) push [`PlaybackEvent`]s into a
//! channel. Observers subscribe on [`PlaybackEvents`], and the owner calls
//! [`PlaybackEvents::dispatch_pending`] from its delivery thread, so every
//! callback runs on that one thread.

use std::sync::{Arc, Mutex, PoisonError};

use comping_types::{ChordSymbol, Position};
use crossbeam_channel::{Receiver, Sender};

use crate::notify::{Notifier, Subscription};
use crate::session::SessionId;

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    Enabled(bool),
    BeatChanged {
        old: Position,
        new: Position,
        /// Absolute song position in beats.
        position_in_beats: f64,
    },
    ChordChanged {
        chord: ChordSymbol,
        position: Position,
    },
    SongPartChanged {
        bar: i32,
        name: String,
    },
    /// Coarse note activity: at most one per channel per window.
    MidiActivity {
        channel: u8,
        tick: i64,
    },
    SessionUpdated {
        session: SessionId,
        count: u64,
    },
    EndOfPlayback,
}

pub struct PlaybackEvents {
    tx: Sender<PlaybackEvent>,
    rx: Receiver<PlaybackEvent>,
    notifier: Notifier<PlaybackEvent>,
}

impl PlaybackEvents {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            tx,
            rx,
            notifier: Notifier::new(),
        }
    }

    /// Producer side. Sending never blocks.
    pub fn sender(&self) -> Sender<PlaybackEvent> {
        self.tx.clone()
    }

    pub fn subscribe(
        &self,
        callback: impl Fn(&PlaybackEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.notifier.subscribe(callback)
    }

    /// Deliver queued events on the calling thread. Returns how many were delivered.
    pub fn dispatch_pending(&self) -> usize {
        let mut delivered = 0;
        while let Ok(event) = self.rx.try_recv() {
            self.notifier.notify(&event);
            delivered += 1;
        }
        delivered
    }

    pub fn listener_count(&self) -> usize {
        self.notifier.listener_count()
    }
}

impl Default for PlaybackEvents {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-channel rate limiter for [`PlaybackEvent::MidiActivity`].
#[derive(Debug, Clone)]
pub struct ActivityCoalescer {
    window_ticks: i64,
    last: [Option<i64>; 16],
}

impl ActivityCoalescer {
    pub fn new(window_ticks: i64) -> Self {
        Self {
            window_ticks: window_ticks.max(0),
            last: [None; 16],
        }
    }

    /// Should activity on `channel` at `tick` be reported?
    pub fn should_emit(&mut self, channel: u8, tick: i64) -> bool {
        let Some(slot) = self.last.get_mut(channel as usize) else {
            return false;
        };
        let emit = match *slot {
            None => true,
            // Moving backwards means a loop or a restart
            Some(last) => tick < last || tick - last >= self.window_ticks,
        };
        if emit {
            *slot = Some(tick);
        }
        emit
    }

    pub fn reset(&mut self) {
        self.last = [None; 16];
    }
}

/// Records every delivered event. Handy in tests and demos.
pub struct Collector {
    events: Arc<Mutex<Vec<PlaybackEvent>>>,
    _subscription: Subscription,
}

impl Collector {
    pub fn attach(events: &PlaybackEvents) -> Self {
        let store = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&store);
        let subscription = events.subscribe(move |e| {
            s.lock().unwrap_or_else(PoisonError::into_inner).push(e.clone());
        });
        Self {
            events: store,
            _subscription: subscription,
        }
    }

    pub fn events(&self) -> Vec<PlaybackEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn take(&self) -> Vec<PlaybackEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn count(&self, pred: impl Fn(&PlaybackEvent) -> bool) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| pred(e))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_wait_for_dispatch() {
        let events = PlaybackEvents::new();
        let collector = Collector::attach(&events);
        let tx = events.sender();
        tx.send(PlaybackEvent::Enabled(true)).unwrap();
        tx.send(PlaybackEvent::EndOfPlayback).unwrap();
        assert!(collector.events().is_empty());
        assert_eq!(events.dispatch_pending(), 2);
        assert_eq!(
            collector.take(),
            vec![PlaybackEvent::Enabled(true), PlaybackEvent::EndOfPlayback]
        );
    }

    #[test]
    fn delivery_happens_on_dispatching_thread() {
        let events = PlaybackEvents::new();
        let seen = Arc::new(Mutex::new(None));
        let s = Arc::clone(&seen);
        let _sub = events.subscribe(move |_| {
            *s.lock().unwrap() = Some(std::thread::current().id());
        });
        let tx = events.sender();
        std::thread::spawn(move || tx.send(PlaybackEvent::Enabled(false)).unwrap())
            .join()
            .unwrap();
        events.dispatch_pending();
        assert_eq!(*seen.lock().unwrap(), Some(std::thread::current().id()));
    }

    #[test]
    fn activity_is_coalesced_per_channel() {
        let mut c = ActivityCoalescer::new(240);
        assert!(c.should_emit(1, 0));
        assert!(!c.should_emit(1, 100));
        assert!(c.should_emit(2, 100));
        assert!(c.should_emit(1, 240));
        assert!(c.should_emit(1, 0));
        assert!(!c.should_emit(16, 0));
    }

    #[test]
    fn dropped_collector_stops_listening() {
        let events = PlaybackEvents::new();
        let collector = Collector::attach(&events);
        assert_eq!(events.listener_count(), 1);
        drop(collector);
        assert_eq!(events.listener_count(), 0);
    }
}

mod common;

use std::time::Duration;

use comping_core::session::{PlaybackSession, SessionFlags, SessionState};
use comping_core::transport::{
    Collector, MemorySink, PlaybackError, PlaybackEvent, PlaybackEvents, Player, TransportHandle,
};
use comping_types::{ChordSymbol, Position};

fn with_control_track() -> SessionFlags {
    SessionFlags {
        control_track: true,
        ..SessionFlags::default()
    }
}

fn chords(collector: &Collector) -> Vec<(ChordSymbol, Position)> {
    collector
        .events()
        .into_iter()
        .filter_map(|e| match e {
            PlaybackEvent::ChordChanged { chord, position } => Some((chord, position)),
            _ => None,
        })
        .collect()
}

fn parts(collector: &Collector) -> Vec<String> {
    collector
        .events()
        .into_iter()
        .filter_map(|e| match e {
            PlaybackEvent::SongPartChanged { name, .. } => Some(name),
            _ => None,
        })
        .collect()
}

#[test]
fn test_transport_thread_plays_to_the_end() {
    // 2 bars at 480 bpm: one second
    let song = common::song(2, 480);
    let (ctx, _mix) = common::context_for(&song);
    let session = PlaybackSession::new(ctx, SessionFlags::default(), 0, None, &common::env());

    let events = PlaybackEvents::new();
    let collector = Collector::attach(&events);
    let sink = MemorySink::new();
    let transport = TransportHandle::new(Box::new(sink.clone()), events.sender(), 240);
    transport.start(session.clone(), 0).unwrap();

    common::wait_until(Duration::from_secs(10), "end of playback", || {
        events.dispatch_pending();
        collector.count(|e| *e == PlaybackEvent::EndOfPlayback) == 1
    });
    assert_eq!(session.state(), SessionState::Stopped);
    assert!(sink.note_ons() > 0);
    assert_eq!(
        collector.count(|e| matches!(e, PlaybackEvent::BeatChanged { .. })),
        8
    );
    assert!(collector.count(|e| matches!(e, PlaybackEvent::MidiActivity { .. })) > 0);
}

#[test]
fn test_transport_reports_refusals() {
    let song = common::song(2, 120);
    let (ctx, _mix) = common::context_for(&song);
    let session = PlaybackSession::new(ctx, SessionFlags::default(), 0, None, &common::env());
    session.generate(false).unwrap();
    session.close().unwrap();

    let events = PlaybackEvents::new();
    let transport = TransportHandle::new(Box::new(MemorySink::new()), events.sender(), 240);
    assert!(matches!(
        transport.start(session, 0),
        Err(PlaybackError::Session(_))
    ));
    assert_eq!(transport.position(), None);
}

#[test]
fn test_stop_returns_session_to_generated() {
    let song = common::song(8, 60);
    let (ctx, _mix) = common::context_for(&song);
    let session = PlaybackSession::new(ctx, SessionFlags::default(), 0, None, &common::env());
    let events = PlaybackEvents::new();
    let transport = TransportHandle::new(Box::new(MemorySink::new()), events.sender(), 240);
    transport.start(session.clone(), 2).unwrap();
    assert!(transport.position().is_some());
    transport.stop();
    common::wait_until(Duration::from_secs(5), "stop", || {
        session.state() == SessionState::Generated
    });
}

#[test]
fn test_start_mid_part_reports_current_chord_and_part() {
    // Chord only on bar 0 of part A; starting on bar 1 is mid-chord
    let song = common::mixed_song();
    let (ctx, _mix) = common::context_for(&song);
    let session = PlaybackSession::new(ctx, with_control_track(), 0, None, &common::env());
    let events = PlaybackEvents::new();
    let collector = Collector::attach(&events);
    let mut player = Player::new(Box::new(MemorySink::new()), events.sender(), 240);

    player.start(session, 1).unwrap();
    // 120 bpm: 3 beats, still inside bar 1
    player.advance(Duration::from_millis(1500));
    events.dispatch_pending();
    assert_eq!(
        chords(&collector),
        vec![(ChordSymbol::new(0, "maj7"), Position::new(1, 0.0))]
    );
    assert_eq!(parts(&collector), vec!["A".to_string()]);

    // Into part B on bar 4
    player.advance(Duration::from_secs(5));
    events.dispatch_pending();
    assert_eq!(chords(&collector).len(), 2);
    assert_eq!(chords(&collector)[1].0, ChordSymbol::new(2, "m7"));
    assert_eq!(parts(&collector), vec!["A".to_string(), "B".to_string()]);
}

#[test]
fn test_loop_restart_reports_current_chord_and_part() {
    // Bar 9 is the last 6/8 bar, under the chord set on bar 8
    let song = common::mixed_song();
    let (ctx, _mix) = common::context_for(&song);
    let session = PlaybackSession::new(ctx, with_control_track(), 1, None, &common::env());
    let events = PlaybackEvents::new();
    let collector = Collector::attach(&events);
    let mut player = Player::new(Box::new(MemorySink::new()), events.sender(), 240);

    player.start(session, 9).unwrap();
    // 3 beats per pass at 120 bpm
    player.advance(Duration::from_millis(2000));
    events.dispatch_pending();
    assert_eq!(player.loops_done(), 1);
    assert_eq!(
        chords(&collector),
        vec![
            (ChordSymbol::new(7, "7"), Position::new(9, 0.0)),
            (ChordSymbol::new(7, "7"), Position::new(9, 0.0)),
        ]
    );
    assert_eq!(parts(&collector), vec!["C".to_string(), "C".to_string()]);
}

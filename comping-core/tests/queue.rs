mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use comping_core::generator::{GenerationOptions, PatternGenerator};
use comping_core::queue::{MusicGenerationQueue, QueueConfig, VoiceOutcome};
use comping_types::RhythmVoiceId;

#[test]
fn test_superseded_result_is_never_published() {
    let (generator, entered, release) = common::gated();
    let queue = MusicGenerationQueue::new(Arc::new(generator), common::no_buffer());
    let published = Arc::new(Mutex::new(Vec::new()));
    let p = Arc::clone(&published);
    let _sub = queue.subscribe(move |r| p.lock().unwrap().push(r.seq));

    let song = common::song(2, 120);
    let (ctx, _mix) = common::context_for(&song);
    let a = queue.submit(ctx.clone(), GenerationOptions::default());
    entered.recv_timeout(Duration::from_secs(5)).unwrap();
    let b = queue.submit(ctx, GenerationOptions::default());
    drop(release);

    common::wait_until(Duration::from_secs(5), "result B", || {
        queue.last_result().map(|r| r.seq) == Some(b)
    });
    // Give a late A every chance to sneak in
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(queue.last_result().unwrap().seq, b);
    assert_eq!(*published.lock().unwrap(), vec![b]);
    assert!(a < b);
}

#[test]
fn test_burst_is_coalesced() {
    let generator = Arc::new(common::CountingGenerator::default());
    let queue = MusicGenerationQueue::new(
        generator.clone(),
        QueueConfig {
            pre_update_buffer: Duration::from_millis(200),
        },
    );
    let song = common::song(2, 120);
    let (ctx, _mix) = common::context_for(&song);
    let mut last = 0;
    for _ in 0..5 {
        last = queue.submit(ctx.clone(), GenerationOptions::default());
    }
    common::wait_until(Duration::from_secs(5), "coalesced result", || {
        queue.last_result().map(|r| r.seq) == Some(last)
    });
    assert_eq!(generator.calls(), 1);
}

#[test]
fn test_failure_is_carried_in_the_result() {
    let queue = MusicGenerationQueue::new(
        Arc::new(common::FlakyGenerator::new(1)),
        common::no_buffer(),
    );
    let song = common::song(2, 120);
    let (ctx, _mix) = common::context_for(&song);
    let seq = queue.submit(ctx, GenerationOptions { only_voices: None, silent: true });
    common::wait_until(Duration::from_secs(5), "failed result", || {
        queue.last_result().map(|r| r.seq) == Some(seq)
    });
    let bass = RhythmVoiceId::new("swing", "bass");
    assert!(matches!(queue.voice_outcome(&bass), VoiceOutcome::Failed(_)));
    assert!(queue.last_result().unwrap().error().is_some());
}

#[test]
fn test_result_keeps_originating_context() {
    let queue = MusicGenerationQueue::new(Arc::new(PatternGenerator::new()), common::no_buffer());
    let song = common::song(3, 120);
    let (ctx, _mix) = common::context_for(&song);
    let seq = queue.submit(ctx.clone(), GenerationOptions::default());
    common::wait_until(Duration::from_secs(5), "result", || {
        queue.last_result().map(|r| r.seq) == Some(seq)
    });
    assert_eq!(queue.last_result().unwrap().context, ctx);
}

#[test]
fn test_detached_shutdown_does_not_wait_or_publish() {
    let (generator, entered, release) = common::gated();
    let queue = MusicGenerationQueue::new(Arc::new(generator), common::no_buffer());
    let published = Arc::new(Mutex::new(Vec::new()));
    let p = Arc::clone(&published);
    let _sub = queue.subscribe(move |r| p.lock().unwrap().push(r.seq));

    let song = common::song(2, 120);
    let (ctx, _mix) = common::context_for(&song);
    queue.submit(ctx, GenerationOptions::default());
    entered.recv_timeout(Duration::from_secs(5)).unwrap();

    let started = std::time::Instant::now();
    queue.shutdown_detached();
    assert!(started.elapsed() < Duration::from_secs(1));

    drop(release);
    std::thread::sleep(Duration::from_millis(100));
    assert!(published.lock().unwrap().is_empty());
}

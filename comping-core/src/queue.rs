//! Background music generation with stale-result suppression.
//!
//! One worker thread per queue. Every `submit` is stamped with a sequence
//! number. After a request arrives the worker waits a short buffer, keeping
//! only the newest request, then runs the generator to completion. The
//! result is published only if no newer request was submitted meanwhile;
//! the check and the store happen under the same lock.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use comping_types::{Phrase, RhythmVoiceId};
use crossbeam_channel::{Receiver, Sender};

use crate::config::Config;
use crate::context::SongContext;
use crate::generator::{GenerationError, GenerationOptions, MusicGenerator, PhraseMap};
use crate::notify::{Notifier, Subscription};

#[derive(Debug, Clone, PartialEq)]
pub struct QueueConfig {
    /// Time to wait for newer requests before generating.
    pub pre_update_buffer: Duration,
}

impl QueueConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            pre_update_buffer: config.pre_update_buffer(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            pre_update_buffer: Duration::from_millis(300),
        }
    }
}

/// Published outcome of one request.
#[derive(Debug)]
pub struct GenerationResult {
    pub seq: u64,
    pub context: SongContext,
    pub outcome: Result<PhraseMap, GenerationError>,
}

impl GenerationResult {
    pub fn phrases(&self) -> Option<&PhraseMap> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&GenerationError> {
        self.outcome.as_ref().err()
    }
}

/// What a per-voice viewer should show.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceOutcome {
    /// Nothing published yet.
    Pending,
    /// Published, but the voice has no notes.
    Empty,
    Notes(Phrase),
    /// The whole generation failed.
    Failed(GenerationError),
}

struct Request {
    seq: u64,
    context: SongContext,
    options: GenerationOptions,
}

enum QueueCmd {
    Generate(Request),
    Shutdown,
}

#[derive(Default)]
struct QueueState {
    latest_seq: u64,
    last_result: Option<Arc<GenerationResult>>,
    /// Set on shutdown; nothing is published afterwards.
    closed: bool,
}

struct QueueShared {
    state: Mutex<QueueState>,
    notifier: Notifier<Arc<GenerationResult>>,
}

impl QueueShared {
    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct MusicGenerationQueue {
    shared: Arc<QueueShared>,
    cmd_tx: Sender<QueueCmd>,
    join_handle: Option<JoinHandle<()>>,
}

impl MusicGenerationQueue {
    pub fn new(generator: Arc<dyn MusicGenerator>, config: QueueConfig) -> Self {
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let shared = Arc::new(QueueShared {
            state: Mutex::new(QueueState::default()),
            notifier: Notifier::new(),
        });
        let worker = QueueWorker {
            cmd_rx,
            generator,
            config,
            shared: Arc::clone(&shared),
        };
        let join_handle = thread::spawn(move || worker.run());
        Self {
            shared,
            cmd_tx,
            join_handle: Some(join_handle),
        }
    }

    /// Queue a generation; supersedes every earlier request. Never blocks.
    pub fn submit(&self, context: SongContext, options: GenerationOptions) -> u64 {
        let seq = {
            let mut state = self.shared.state();
            state.latest_seq = state.latest_seq.wrapping_add(1);
            state.latest_seq
        };
        log::debug!(target: "queue", "submit #{} {}", seq, context);
        if self
            .cmd_tx
            .send(QueueCmd::Generate(Request {
                seq,
                context,
                options,
            }))
            .is_err()
        {
            log::warn!(target: "queue", "request #{} dropped: worker stopped", seq);
        }
        seq
    }

    /// Sequence number of the newest submitted request, 0 if none.
    pub fn latest_seq(&self) -> u64 {
        self.shared.state().latest_seq
    }

    pub fn last_result(&self) -> Option<Arc<GenerationResult>> {
        self.shared.state().last_result.clone()
    }

    pub fn voice_outcome(&self, voice: &RhythmVoiceId) -> VoiceOutcome {
        let Some(result) = self.last_result() else {
            return VoiceOutcome::Pending;
        };
        match &result.outcome {
            Err(e) => VoiceOutcome::Failed(e.clone()),
            Ok(phrases) => match phrases.get(voice) {
                Some(p) if !p.is_empty() => VoiceOutcome::Notes(p.clone()),
                _ => VoiceOutcome::Empty,
            },
        }
    }

    /// Called on the worker thread for every published result.
    pub fn subscribe(
        &self,
        callback: impl Fn(&Arc<GenerationResult>) + Send + Sync + 'static,
    ) -> Subscription {
        self.shared.notifier.subscribe(callback)
    }

    /// Stop the worker. An in-flight generation finishes first and is not published.
    pub fn shutdown(&mut self) {
        self.request_stop();
        if let Some(handle) = self.join_handle.take() {
            // The last owner may be dropped from a result callback
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                log::error!(target: "queue", "worker thread panicked");
            }
        }
    }
}

impl MusicGenerationQueue {
    /// Stop the worker without waiting for an in-flight generation. The
    /// worker exits on its own once the generator returns.
    pub fn shutdown_detached(mut self) {
        self.request_stop();
        if self.join_handle.take().is_some() {
            log::debug!(target: "queue", "worker detached");
        }
    }

    fn request_stop(&self) {
        self.shared.state().closed = true;
        let _ = self.cmd_tx.send(QueueCmd::Shutdown);
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.state().closed
    }
}

impl Drop for MusicGenerationQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct QueueWorker {
    cmd_rx: Receiver<QueueCmd>,
    generator: Arc<dyn MusicGenerator>,
    config: QueueConfig,
    shared: Arc<QueueShared>,
}

impl QueueWorker {
    fn run(self) {
        loop {
            let request = match self.cmd_rx.recv() {
                Ok(QueueCmd::Generate(request)) => request,
                Ok(QueueCmd::Shutdown) | Err(_) => break,
            };
            let Some(request) = self.coalesce(request) else {
                break;
            };
            self.process(request);
        }
        log::debug!(target: "queue", "worker stopped");
    }

    /// Wait out the pre-update buffer keeping only the newest request.
    /// `None` means shutdown.
    fn coalesce(&self, mut request: Request) -> Option<Request> {
        let deadline = Instant::now() + self.config.pre_update_buffer;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            crossbeam_channel::select! {
                recv(self.cmd_rx) -> msg => match msg {
                    Ok(QueueCmd::Generate(newer)) => {
                        log::trace!(target: "queue", "#{} superseded by #{}", request.seq, newer.seq);
                        request = newer;
                    }
                    Ok(QueueCmd::Shutdown) | Err(_) => return None,
                },
                default(remaining) => return Some(request),
            }
        }
    }

    fn process(&self, request: Request) {
        if request.seq != self.shared.state().latest_seq {
            log::debug!(target: "queue", "skipping superseded request #{}", request.seq);
            return;
        }

        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.generator.generate(&request.context, &request.options)
        }))
        .unwrap_or_else(|_| Err(GenerationError::Failed("generator panicked".into())));

        match &outcome {
            Ok(phrases) => log::debug!(
                target: "queue",
                "#{} generated {} phrases in {:?}",
                request.seq,
                phrases.len(),
                started.elapsed()
            ),
            Err(e) if request.options.silent => {
                log::debug!(target: "queue", "#{} failed: {}", request.seq, e)
            }
            Err(e) => log::warn!(target: "queue", "#{} failed: {}", request.seq, e),
        }

        let result = Arc::new(GenerationResult {
            seq: request.seq,
            context: request.context,
            outcome,
        });
        let published = {
            let mut state = self.shared.state();
            if !state.closed && state.latest_seq == result.seq {
                state.last_result = Some(Arc::clone(&result));
                true
            } else {
                false
            }
        };
        if published {
            self.shared.notifier.notify(&result);
        } else {
            log::debug!(target: "queue", "discarding stale result #{}", result.seq);
        }
    }
}

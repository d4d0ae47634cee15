//! Owner-side handle to the transport thread.

use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;

use super::commands::TransportCmd;
use super::events::PlaybackEvent;
use super::player::Player;
use super::thread::TransportThread;
use super::{MidiSink, PlaybackError};
use crate::session::PlaybackSession;

pub struct TransportHandle {
    cmd_tx: Sender<TransportCmd>,
    join_handle: Option<JoinHandle<()>>,
}

impl TransportHandle {
    /// Spawn the transport thread playing into `sink` and reporting to `events`.
    pub fn new(
        sink: Box<dyn MidiSink>,
        events: Sender<PlaybackEvent>,
        activity_window_ticks: i64,
    ) -> Self {
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let join_handle = thread::spawn(move || {
            let player = Player::new(sink, events, activity_window_ticks);
            TransportThread::new(cmd_rx, player).run();
        });
        Self {
            cmd_tx,
            join_handle: Some(join_handle),
        }
    }

    pub fn send_cmd(&self, cmd: TransportCmd) -> Result<(), PlaybackError> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| PlaybackError::Disconnected)
    }

    /// Fire-and-forget: log if the thread is gone.
    fn send(&self, cmd: TransportCmd) {
        if let Err(e) = self.send_cmd(cmd) {
            log::warn!(target: "transport", "command dropped: {}", e);
        }
    }

    /// Start playing and wait for the thread to accept or refuse.
    pub fn start(&self, session: PlaybackSession, from_bar: i32) -> Result<(), PlaybackError> {
        let (reply, rx) = crossbeam_channel::bounded(1);
        self.send_cmd(TransportCmd::Start {
            session,
            from_bar,
            reply,
        })?;
        rx.recv().map_err(|_| PlaybackError::Disconnected)?
    }

    pub fn pause(&self) {
        self.send(TransportCmd::Pause);
    }

    pub fn resume(&self) {
        self.send(TransportCmd::Resume);
    }

    pub fn stop(&self) {
        self.send(TransportCmd::Stop);
    }

    pub fn set_tempo(&self, bpm: u16) {
        self.send(TransportCmd::SetTempo(bpm));
    }

    /// Playhead in beats, `None` when idle.
    pub fn position(&self) -> Option<f64> {
        let (reply, rx) = crossbeam_channel::bounded(1);
        self.send_cmd(TransportCmd::Position { reply }).ok()?;
        rx.recv().ok().flatten()
    }

    pub fn shutdown(&mut self) {
        let _ = self.cmd_tx.send(TransportCmd::Shutdown);
        if let Some(handle) = self.join_handle.take() {
            if handle.join().is_err() {
                log::error!(target: "transport", "transport thread panicked");
            }
        }
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

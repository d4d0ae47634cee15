use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;

use super::commands::TransportCmd;
use super::player::{Player, PlayerState};

const TICK_INTERVAL: Duration = Duration::from_millis(1);

pub(super) struct TransportThread {
    cmd_rx: Receiver<TransportCmd>,
    player: Player,
    last_tick: Instant,
}

impl TransportThread {
    pub(super) fn new(cmd_rx: Receiver<TransportCmd>, player: Player) -> Self {
        Self {
            cmd_rx,
            player,
            last_tick: Instant::now(),
        }
    }

    pub(super) fn run(mut self) {
        loop {
            let remaining = TICK_INTERVAL.saturating_sub(self.last_tick.elapsed());
            crossbeam_channel::select! {
                recv(self.cmd_rx) -> result => match result {
                    Ok(cmd) => {
                        if self.handle_cmd(cmd) {
                            break;
                        }
                    }
                    Err(_) => break,
                },
                default(remaining) => {}
            }

            let now = Instant::now();
            let elapsed = now.duration_since(self.last_tick);
            if elapsed >= TICK_INTERVAL {
                self.last_tick = now;
                self.player.advance(elapsed);
            }
        }
        if let Err(e) = self.player.stop() {
            log::warn!(target: "transport", "stop on shutdown: {}", e);
        }
        log::debug!(target: "transport", "thread stopped");
    }

    /// Returns true on shutdown.
    fn handle_cmd(&mut self, cmd: TransportCmd) -> bool {
        log::trace!(target: "transport", "{:?}", cmd);
        match cmd {
            TransportCmd::Start {
                session,
                from_bar,
                reply,
            } => {
                let result = self.player.start(session, from_bar);
                // Start counting from now, not from the last tick
                self.last_tick = Instant::now();
                let _ = reply.send(result);
            }
            TransportCmd::Pause => {
                if let Err(e) = self.player.pause() {
                    log::warn!(target: "transport", "pause: {}", e);
                }
            }
            TransportCmd::Resume => {
                if let Err(e) = self.player.resume() {
                    log::warn!(target: "transport", "resume: {}", e);
                }
                self.last_tick = Instant::now();
            }
            TransportCmd::Stop => {
                if let Err(e) = self.player.stop() {
                    log::warn!(target: "transport", "stop: {}", e);
                }
            }
            TransportCmd::SetTempo(bpm) => self.player.set_tempo(bpm),
            TransportCmd::Position { reply } => {
                let position = match self.player.state() {
                    PlayerState::Idle => None,
                    _ => Some(self.player.position_in_beats()),
                };
                let _ = reply.send(position);
            }
            TransportCmd::Shutdown => return true,
        }
        false
    }
}

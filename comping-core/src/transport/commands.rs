//! Commands sent from a [`TransportHandle`](super::TransportHandle) to the transport thread.

use crossbeam_channel::Sender;

use super::PlaybackError;
use crate::session::PlaybackSession;

pub enum TransportCmd {
    Start {
        session: PlaybackSession,
        from_bar: i32,
        reply: Sender<Result<(), PlaybackError>>,
    },
    Pause,
    Resume,
    Stop,
    SetTempo(u16),
    /// Current playhead in beats, precount included.
    Position {
        reply: Sender<Option<f64>>,
    },
    Shutdown,
}

impl std::fmt::Debug for TransportCmd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportCmd::Start {
                session, from_bar, ..
            } => write!(f, "Start({}, bar {})", session, from_bar),
            TransportCmd::Pause => write!(f, "Pause"),
            TransportCmd::Resume => write!(f, "Resume"),
            TransportCmd::Stop => write!(f, "Stop"),
            TransportCmd::SetTempo(bpm) => write!(f, "SetTempo({})", bpm),
            TransportCmd::Position { .. } => write!(f, "Position"),
            TransportCmd::Shutdown => write!(f, "Shutdown"),
        }
    }
}

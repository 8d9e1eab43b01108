//! Framed in-memory transport pipes.
//!
//! The real transport multiplexer lives outside this workspace; it is
//! assumed to deliver authenticated, framed, ordered byte messages per
//! peer. [`pipe_pair`] builds a linked pair of [`Pipe`] endpoints with
//! exactly those properties on top of bounded channels. Tests and
//! in-process links use the pair directly; an external transport
//! bridges its frames onto one endpoint and hands the other to
//! [`Peer`](crate::peer::Peer).

use murmur_types::{MurmurError, Result};
use tokio::sync::mpsc;

/// Default frame buffer per direction.
pub const DEFAULT_PIPE_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// FrameSender / FrameReceiver
// ---------------------------------------------------------------------------

/// Sending half of a pipe endpoint.
#[derive(Clone)]
pub struct FrameSender {
    tx: mpsc::Sender<Vec<u8>>,
}

impl FrameSender {
    /// Queues one frame for the remote endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`MurmurError::TransportError`] when the remote
    /// endpoint is gone.
    pub async fn send(&self, frame: Vec<u8>) -> Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| MurmurError::TransportError {
                reason: "pipe closed".into(),
            })
    }
}

/// Receiving half of a pipe endpoint.
pub struct FrameReceiver {
    rx: mpsc::Receiver<Vec<u8>>,
}

impl FrameReceiver {
    /// Waits for the next frame. `None` means the remote endpoint is
    /// gone and no more frames will arrive.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }
}

// ---------------------------------------------------------------------------
// Pipe
// ---------------------------------------------------------------------------

/// One endpoint of a bidirectional framed connection.
pub struct Pipe {
    /// Frames going to the remote.
    pub tx: FrameSender,
    /// Frames arriving from the remote.
    pub rx: FrameReceiver,
}

/// Builds a linked pair of pipe endpoints with the given per-direction
/// frame buffer.
pub fn pipe_pair(capacity: usize) -> (Pipe, Pipe) {
    let (a_tx, b_rx) = mpsc::channel(capacity);
    let (b_tx, a_rx) = mpsc::channel(capacity);
    (
        Pipe {
            tx: FrameSender { tx: a_tx },
            rx: FrameReceiver { rx: a_rx },
        },
        Pipe {
            tx: FrameSender { tx: b_tx },
            rx: FrameReceiver { rx: b_rx },
        },
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! The per-connection gossip state machine.
//!
//! A [`Peer`] negotiates the protocol version, then runs two
//! concurrent activities until the transport closes or the node shuts
//! down:
//!
//! 1. the **receive loop** decodes inbound frames, hands every
//!    envelope to the host, and marks it as known to the remote;
//! 2. the **update task** broadcasts the pool delta (everything the
//!    remote has not been seen to have) every transmission cycle and
//!    prunes the known set against the live pool every expiration
//!    cycle, so the set is bounded by the pool itself.
//!
//! ```text
//! Negotiating ──status ok──▶ Running ──close/shutdown──▶ Closed
//!      └────version mismatch────────────────────────────▶ Closed
//! ```
//!
//! A malformed frame is logged and skipped; the peer is not
//! disconnected for it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use murmur_protocol::wire::PROTOCOL_VERSION;
use murmur_protocol::{Envelope, Frame};
use murmur_types::{Hash, MurmurError, Result};
use tokio::sync::watch;
use tokio::time::{interval_at, Instant};

use crate::host::Host;
use crate::transport::{FrameReceiver, FrameSender, Pipe};

// ---------------------------------------------------------------------------
// PeerState
// ---------------------------------------------------------------------------

/// Lifecycle state of a peer connection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PeerState {
    /// Status frames are being exchanged.
    Negotiating,
    /// Gossip is flowing.
    Running,
    /// Terminal; all per-peer state is released.
    Closed,
}

// ---------------------------------------------------------------------------
// Peer
// ---------------------------------------------------------------------------

/// One gossip actor per connected remote.
pub struct Peer {
    host: Arc<dyn Host>,
    /// Envelope hashes the remote is believed to have.
    known: Mutex<HashSet<Hash>>,
    state: Mutex<PeerState>,
    transmission_cycle: Duration,
    expiration_cycle: Duration,
}

impl Peer {
    /// Creates a peer in the `Negotiating` state.
    pub fn new(
        host: Arc<dyn Host>,
        transmission_cycle: Duration,
        expiration_cycle: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            host,
            known: Mutex::new(HashSet::new()),
            state: Mutex::new(PeerState::Negotiating),
            transmission_cycle,
            expiration_cycle,
        })
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> PeerState {
        *self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns whether the remote is believed to have this envelope.
    pub fn marked(&self, hash: &Hash) -> bool {
        self.known
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(hash)
    }

    fn set_state(&self, state: PeerState) {
        *self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn mark(&self, hash: Hash) {
        self.known
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(hash);
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Drives the connection until the transport closes, the shutdown
    /// signal fires, or the handshake fails.
    ///
    /// # Errors
    ///
    /// Returns [`MurmurError::HandshakeFailed`] when the remote speaks
    /// a different protocol version or closes before its status frame.
    pub async fn run(
        self: Arc<Self>,
        pipe: Pipe,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let Pipe { tx, mut rx } = pipe;

        if let Err(err) = self.handshake(&tx, &mut rx, &mut shutdown).await {
            tracing::info!(%err, "peer handshake failed");
            self.close();
            return Err(err);
        }
        self.set_state(PeerState::Running);
        tracing::info!("peer handshake complete, gossip running");

        // The update task owns the sender; the read loop owns the
        // receiver. `closed` tears the update task down when the read
        // loop exits first.
        let (closed_tx, closed_rx) = watch::channel(false);
        let update = tokio::spawn(self.clone().update_loop(tx, shutdown.clone(), closed_rx));

        self.read_loop(&mut rx, &mut shutdown).await;

        let _ = closed_tx.send(true);
        let _ = update.await;
        self.close();
        tracing::info!("peer closed");
        Ok(())
    }

    /// Enters the terminal state and discards the known set.
    fn close(&self) {
        self.known
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.set_state(PeerState::Closed);
    }

    /// Exchanges status frames and verifies the protocol version.
    async fn handshake(
        &self,
        tx: &FrameSender,
        rx: &mut FrameReceiver,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        tx.send(
            Frame::Status {
                version: PROTOCOL_VERSION,
            }
            .encode(),
        )
        .await?;

        let raw = tokio::select! {
            frame = rx.recv() => frame.ok_or_else(|| MurmurError::HandshakeFailed {
                reason: "connection closed before status frame".into(),
            })?,
            _ = shutdown.changed() => {
                return Err(MurmurError::HandshakeFailed {
                    reason: "node shut down during handshake".into(),
                });
            }
        };

        match Frame::decode(&raw) {
            Ok(Frame::Status { version }) if version == PROTOCOL_VERSION => Ok(()),
            Ok(Frame::Status { version }) => Err(MurmurError::HandshakeFailed {
                reason: format!(
                    "protocol version mismatch: ours {PROTOCOL_VERSION}, theirs {version}"
                ),
            }),
            Ok(_) => Err(MurmurError::HandshakeFailed {
                reason: "expected status frame".into(),
            }),
            Err(err) => Err(MurmurError::HandshakeFailed {
                reason: format!("undecodable status frame: {err}"),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Receive loop
    // -----------------------------------------------------------------------

    /// Reads frames until the transport closes or shutdown fires.
    async fn read_loop(&self, rx: &mut FrameReceiver, shutdown: &mut watch::Receiver<bool>) {
        loop {
            let raw = tokio::select! {
                frame = rx.recv() => match frame {
                    Some(frame) => frame,
                    None => {
                        tracing::info!("peer transport closed");
                        return;
                    }
                },
                _ = shutdown.changed() => return,
            };

            match Frame::decode(&raw) {
                Ok(Frame::Messages(envelopes)) => {
                    tracing::debug!(count = envelopes.len(), "received envelopes from peer");
                    for envelope in envelopes {
                        // The remote just demonstrated it has this
                        // envelope, whether or not the pool wants it.
                        self.mark(envelope.hash());
                        self.host.ingest(envelope);
                    }
                }
                Ok(Frame::Status { version }) => {
                    tracing::debug!(version, "ignoring repeated status frame");
                }
                Err(err) => {
                    tracing::warn!(%err, "failed to decode frame, skipping");
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Update task
    // -----------------------------------------------------------------------

    /// Ticks the broadcast and known-set pruning cycles.
    async fn update_loop(
        self: Arc<Self>,
        tx: FrameSender,
        mut shutdown: watch::Receiver<bool>,
        mut closed: watch::Receiver<bool>,
    ) {
        let mut transmit = interval_at(
            Instant::now() + self.transmission_cycle,
            self.transmission_cycle,
        );
        let mut expire = interval_at(
            Instant::now() + self.expiration_cycle,
            self.expiration_cycle,
        );

        loop {
            tokio::select! {
                _ = transmit.tick() => {
                    if let Err(err) = self.broadcast(&tx).await {
                        tracing::info!(%err, "peer transmit failed, stopping broadcasts");
                        return;
                    }
                }
                _ = expire.tick() => self.expire_known(),
                _ = shutdown.changed() => return,
                _ = closed.changed() => return,
            }
        }
    }

    /// Sends every pooled envelope the remote has not been seen to
    /// have, then marks them. Empty deltas suppress the frame.
    async fn broadcast(&self, tx: &FrameSender) -> Result<()> {
        let delta: Vec<Envelope> = {
            let known = self
                .known
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            self.host
                .envelopes()
                .into_iter()
                .filter(|envelope| !known.contains(&envelope.hash()))
                .collect()
        };
        if delta.is_empty() {
            return Ok(());
        }

        tx.send(Frame::Messages(delta.clone()).encode()).await?;

        let mut known = self
            .known
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for envelope in &delta {
            known.insert(envelope.hash());
        }
        tracing::debug!(count = delta.len(), "broadcast envelopes to peer");
        Ok(())
    }

    /// Drops known-set entries whose envelopes left the pool; they can
    /// never cause a retransmission again.
    fn expire_known(&self) {
        let live: HashSet<Hash> = self
            .host
            .envelopes()
            .iter()
            .map(Envelope::hash)
            .collect();
        self.known
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|hash| live.contains(hash));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

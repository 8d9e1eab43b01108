//! The seam between a peer and the node that owns it.
//!
//! Peers never hold a reference to the node type itself; they talk
//! through this narrow interface, which keeps the ownership graph
//! acyclic and makes peers testable against a bare pool.

use murmur_protocol::Envelope;

/// Callbacks a peer needs from its node.
pub trait Host: Send + Sync + 'static {
    /// Hands a received envelope to the node. Acceptance, dedup, and
    /// dispatch are the node's business; the peer marks the envelope
    /// as known to the remote either way.
    fn ingest(&self, envelope: Envelope);

    /// Point-in-time list of all live envelopes, used to compute
    /// broadcast deltas and to prune the per-peer known set.
    fn envelopes(&self) -> Vec<Envelope>;
}

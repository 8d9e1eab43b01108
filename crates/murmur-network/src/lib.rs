//! Peer gossip layer for the Murmur messaging overlay.
//!
//! One [`Peer`](peer::Peer) runs per connected remote, speaking the
//! two-frame sub-protocol over a framed transport pipe. The transport
//! multiplexer itself is an external collaborator; this crate only
//! assumes authenticated, framed, ordered pipes and ships an
//! in-memory implementation for tests and local links.
//!
//! # Modules
//!
//! - [`host`] — the narrow callback seam a peer uses to reach the node
//! - [`transport`] — framed in-memory duplex pipes
//! - [`peer`] — handshake, receive loop, broadcast cycle

pub mod host;
pub mod peer;
pub mod transport;

pub use host::Host;
pub use peer::{Peer, PeerState};
pub use transport::{pipe_pair, FrameReceiver, FrameSender, Pipe};

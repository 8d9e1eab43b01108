//! Wire format and message protocol for the Murmur messaging overlay.
//!
//! Defines the canonical binary encoding, the routing topics, the
//! on-wire [`Envelope`](envelope::Envelope) with its proof-of-work
//! seal, the inner [`Message`](message::Message) construction
//! pipeline, and the two peer-to-peer frames.
//!
//! # Modules
//!
//! - [`codec`] — canonical length-prefixed recursive binary encoding
//! - [`topic`] — 4-byte routing tags and the topic matcher
//! - [`envelope`] — the gossip unit: seal, hash, open
//! - [`message`] — flags byte, optional signature, payload; wrapping
//! - [`wire`] — status and messages frames

pub mod codec;
pub mod envelope;
pub mod message;
pub mod topic;
pub mod wire;

pub use envelope::{Envelope, Opened};
pub use message::{Message, WrapOptions};
pub use topic::{Topic, TopicMatcher};
pub use wire::Frame;

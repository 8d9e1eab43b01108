//! Murmur node runtime.
//!
//! The [`Node`] owns the envelope pool, the identity map, the filter
//! registry, and the connected peers, and drives the expiration
//! sweep. Inbound envelopes flow from peers through the pool and are
//! dispatched, exactly once each, to every matching filter.
//!
//! ```text
//!            peers (gossip)                local API
//!                 │                            │
//!                 ▼                            ▼
//!              ingest ◀──────────────────── send
//!                 │
//!            Pool.add ── newly inserted? ──▶ open with identities
//!                 │                            │
//!          expiration sweep             Filters.notify
//! ```
//!
//! # Modules
//!
//! - [`pool`] — hash- and expiry-indexed store of live envelopes
//! - [`filter`] — subscription records and topic/identity matching
//! - [`node`] — the façade tying everything together

pub mod filter;
pub mod node;
pub mod pool;

pub use filter::{filter_matches, Filter, Filters, Handler};
pub use node::{Node, NodeState};
pub use pool::Pool;

//! The in-memory pool of live envelopes.
//!
//! Two indexes are kept consistent under a single lock: envelopes by
//! hash, and hash sets bucketed by expiry second. An envelope enters
//! both on first ingest and leaves both during a sweep; drained
//! buckets are removed so the expiration index never outlives its
//! live timestamps.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use murmur_protocol::Envelope;
use murmur_types::{unix_now, Hash};

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

/// Hash- and expiry-indexed envelope store.
#[derive(Default)]
pub struct Pool {
    inner: RwLock<PoolInner>,
}

#[derive(Default)]
struct PoolInner {
    /// Envelopes currently tracked by this node, by hash.
    messages: HashMap<Hash, Envelope>,
    /// Hashes bucketed by their expiry timestamp.
    expirations: BTreeMap<u32, HashSet<Hash>>,
}

impl Pool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an envelope, returning whether it was newly inserted.
    ///
    /// Stale envelopes (expiry at or before the current second) and
    /// duplicates are silently skipped; both are routine, not errors.
    /// The `true` return is the unique trigger for filter dispatch.
    pub fn add(&self, envelope: Envelope) -> bool {
        let mut inner = self
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if envelope.expiry <= unix_now() {
            tracing::debug!(hash = %envelope.hash(), "skipping stale envelope");
            return false;
        }

        let hash = envelope.hash();
        if inner.messages.contains_key(&hash) {
            tracing::trace!(%hash, "envelope already pooled");
            return false;
        }

        inner
            .expirations
            .entry(envelope.expiry)
            .or_default()
            .insert(hash);
        inner.messages.insert(hash, envelope);
        tracing::debug!(%hash, "pooled envelope");
        true
    }

    /// Removes every envelope whose expiry is at or before `now`,
    /// dropping the drained buckets.
    pub fn expire(&self, now: u32) {
        let mut inner = self
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let stale: Vec<u32> = inner
            .expirations
            .range(..=now)
            .map(|(&timestamp, _)| timestamp)
            .collect();

        let mut dropped = 0;
        for timestamp in stale {
            if let Some(bucket) = inner.expirations.remove(&timestamp) {
                dropped += bucket.len();
                for hash in bucket {
                    inner.messages.remove(&hash);
                }
            }
        }
        if dropped > 0 {
            tracing::debug!(count = dropped, "expired envelopes");
        }
    }

    /// Point-in-time list of all live envelopes.
    pub fn snapshot(&self) -> Vec<Envelope> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .messages
            .values()
            .cloned()
            .collect()
    }

    /// Returns whether the pool holds this hash.
    pub fn contains(&self, hash: &Hash) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .messages
            .contains_key(hash)
    }

    /// Number of live envelopes.
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .messages
            .len()
    }

    /// Returns whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

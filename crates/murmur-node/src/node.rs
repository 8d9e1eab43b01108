//! Node lifecycle and public surface.
//!
//! The [`Node`] owns identities, pool, filters, and peers. It is the
//! [`Host`] its peers gossip through: every envelope, local or remote,
//! funnels into [`Host::ingest`], and a newly pooled envelope is
//! dispatched exactly once to the filter registry on a spawned task,
//! so slow handlers never block the ingest path.
//!
//! # State machine
//!
//! ```text
//! Initializing ──start()──▶ Running ──stop()──▶ Stopped
//! ```
//!
//! Double-start and stop-from-initializing are rejected with
//! `MurmurError::ConfigError`; repeated stop is idempotent.
//!
//! All methods assume a running tokio runtime: ingest dispatches and
//! peer attachment spawn tasks.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use murmur_crypto::{Identity, PublicKey};
use murmur_network::{Host, Peer, Pipe};
use murmur_protocol::{Envelope, Message, WrapOptions};
use murmur_types::config::MurmurConfig;
use murmur_types::{unix_now, MurmurError, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};

use crate::filter::{filter_matches, Filter, Filters};
use crate::pool::Pool;

// ---------------------------------------------------------------------------
// NodeState
// ---------------------------------------------------------------------------

/// Lifecycle state of the node.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeState {
    /// Components created, expiration loop not started.
    Initializing,
    /// Expiration loop active, peers gossiping.
    Running,
    /// Shutdown signalled and background tasks joined.
    Stopped,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initializing => write!(f, "initializing"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// The overlay node: identities, pool, filters, peers, and the
/// expiration loop.
pub struct Node {
    config: MurmurConfig,
    /// Known decryption identities by public key.
    identities: Arc<RwLock<HashMap<PublicKey, Arc<Identity>>>>,
    pool: Arc<Pool>,
    filters: Arc<Filters>,
    /// Join handles of spawned peer tasks.
    peers: Mutex<Vec<JoinHandle<Result<()>>>>,
    /// Join handle of the expiration loop. `None` before `start()`.
    expirer: Mutex<Option<JoinHandle<()>>>,
    state: Mutex<NodeState>,
    /// Signals every background task to exit.
    shutdown_tx: watch::Sender<bool>,
}

impl Node {
    /// Creates a node with a validated configuration.
    pub fn new(config: MurmurConfig) -> Result<Self> {
        config.validate()?;
        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            config,
            identities: Arc::new(RwLock::new(HashMap::new())),
            pool: Arc::new(Pool::new()),
            filters: Arc::new(Filters::new()),
            peers: Mutex::new(Vec::new()),
            expirer: Mutex::new(None),
            state: Mutex::new(NodeState::Initializing),
            shutdown_tx,
        })
    }

    /// Returns the node configuration.
    pub fn config(&self) -> &MurmurConfig {
        &self.config
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> NodeState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of envelopes currently pooled.
    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }

    // -----------------------------------------------------------------------
    // Identities
    // -----------------------------------------------------------------------

    /// Generates a fresh identity and registers it for decryption.
    ///
    /// # Errors
    ///
    /// Returns [`MurmurError::CryptoError`] if the system RNG fails;
    /// the failure is surfaced rather than aborting.
    pub fn new_identity(&self) -> Result<PublicKey> {
        let identity = Identity::generate()?;
        Ok(self.insert_identity(identity))
    }

    /// Registers an existing identity, returning its public key.
    pub fn insert_identity(&self, identity: Identity) -> PublicKey {
        let public_key = identity.public_key();
        self.identities
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(public_key, Arc::new(identity));
        tracing::info!(?public_key, "identity installed");
        public_key
    }

    /// Returns whether the node holds the private half of this key.
    pub fn has_identity(&self, key: &PublicKey) -> bool {
        self.identities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Looks up the identity for a public key.
    pub fn identity(&self, key: &PublicKey) -> Option<Arc<Identity>> {
        self.identities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    // -----------------------------------------------------------------------
    // Filters
    // -----------------------------------------------------------------------

    /// Installs a message filter, returning its id.
    pub fn watch(&self, filter: Filter) -> u64 {
        self.filters.install(filter)
    }

    /// Removes an installed filter. Idempotent.
    pub fn unwatch(&self, id: u64) {
        self.filters.uninstall(id);
    }

    // -----------------------------------------------------------------------
    // Messaging
    // -----------------------------------------------------------------------

    /// Injects a locally built envelope into the pool, to be gossiped
    /// in the coming cycles. Stale and duplicate envelopes are
    /// silently skipped, same as for remote arrivals.
    pub fn send(&self, envelope: Envelope) -> Result<()> {
        self.ingest(envelope);
        Ok(())
    }

    /// Wrap options pre-populated with this node's configured default
    /// TTL and proof-of-work budget.
    pub fn wrap_defaults(&self) -> WrapOptions<'static> {
        WrapOptions {
            from: None,
            to: None,
            ttl: self.config.default_ttl,
            work: self.config.default_work,
            topics: Vec::new(),
        }
    }

    /// Snapshot query: opens every pooled envelope and collects the
    /// messages matching the given filter.
    pub fn messages(&self, id: u64) -> Vec<Message> {
        let Some(filter) = self.filters.get(id) else {
            return Vec::new();
        };

        let mut matched = Vec::new();
        for envelope in self.pool.snapshot() {
            if let Some(message) = open_envelope(&self.identities, &envelope) {
                if filter_matches(&filter, &message, &envelope.topics) {
                    matched.push(message);
                }
            }
        }
        matched
    }

    // -----------------------------------------------------------------------
    // Peers
    // -----------------------------------------------------------------------

    /// Starts gossiping with a remote over the given transport pipe.
    ///
    /// The peer task lives until the pipe closes, the handshake fails,
    /// or the node stops; [`Node::stop`] joins it.
    pub fn attach_peer(self: &Arc<Self>, pipe: Pipe) -> Arc<Peer> {
        let peer = Peer::new(
            Arc::clone(self) as Arc<dyn Host>,
            self.config.transmission_cycle,
            self.config.expiration_cycle,
        );
        let handle = tokio::spawn(peer.clone().run(pipe, self.shutdown_tx.subscribe()));
        self.peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
        peer
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Spawns the expiration loop. Transitions `Initializing → Running`.
    ///
    /// # Errors
    ///
    /// Returns [`MurmurError::ConfigError`] unless the node is in
    /// `Initializing` state (prevents double-start).
    pub fn start(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != NodeState::Initializing {
            return Err(MurmurError::ConfigError {
                reason: format!("cannot start node in state '{state}'"),
            });
        }

        let pool = Arc::clone(&self.pool);
        let cycle = self.config.expiration_cycle;
        let mut shutdown = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            let mut sweep = interval_at(Instant::now() + cycle, cycle);
            loop {
                tokio::select! {
                    _ = sweep.tick() => pool.expire(unix_now()),
                    _ = shutdown.changed() => break,
                }
            }
        });

        *self
            .expirer
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
        *state = NodeState::Running;
        tracing::info!("node started");
        Ok(())
    }

    /// Signals shutdown and joins the expiration loop and all peer
    /// tasks. Idempotent once running; handlers in flight complete.
    ///
    /// # Errors
    ///
    /// Returns [`MurmurError::ConfigError`] if the node was never
    /// started.
    pub async fn stop(&self) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            match *state {
                NodeState::Initializing => {
                    return Err(MurmurError::ConfigError {
                        reason: "cannot stop a node that has not been started".into(),
                    });
                }
                NodeState::Stopped => return Ok(()),
                NodeState::Running => *state = NodeState::Stopped,
            }
        }

        let _ = self.shutdown_tx.send(true);

        let expirer = self
            .expirer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = expirer {
            let _ = handle.await;
        }

        let peers = std::mem::take(
            &mut *self.peers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for handle in peers {
            let _ = handle.await;
        }

        tracing::info!("node stopped");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Host: the seam peers gossip through
// ---------------------------------------------------------------------------

impl Host for Node {
    /// Pools an envelope and, if it is new, dispatches it once to the
    /// filters on a separate task.
    fn ingest(&self, envelope: Envelope) {
        if !self.pool.add(envelope.clone()) {
            return;
        }

        let identities = Arc::clone(&self.identities);
        let filters = Arc::clone(&self.filters);
        tokio::spawn(async move {
            if let Some(message) = open_envelope(&identities, &envelope) {
                filters.notify(&message, &envelope.topics);
            }
        });
    }

    fn envelopes(&self) -> Vec<Envelope> {
        self.pool.snapshot()
    }
}

// ---------------------------------------------------------------------------
// Opening
// ---------------------------------------------------------------------------

/// Tries to open an envelope with the configured identities.
///
/// With no identities, the envelope is opened key-less and assumed
/// cleartext. Otherwise every identity is tried in turn: a successful
/// decryption or the "not for this key" outcome ends the search with
/// a message; an unexpected failure moves on to the next key. `None`
/// means nothing could be opened and no filter is notified.
fn open_envelope(
    identities: &RwLock<HashMap<PublicKey, Arc<Identity>>>,
    envelope: &Envelope,
) -> Option<Message> {
    let keys: Vec<Arc<Identity>> = identities
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .values()
        .cloned()
        .collect();

    if keys.is_empty() {
        return match envelope.open(None) {
            Ok(opened) => Some(opened.into_message()),
            Err(err) => {
                tracing::debug!(%err, "failed to open envelope");
                None
            }
        };
    }

    for key in keys {
        match envelope.open(Some(key.as_ref())) {
            Ok(opened) => return Some(opened.into_message()),
            Err(err) => {
                tracing::trace!(%err, "envelope did not open with identity");
            }
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_protocol::TopicMatcher;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn node() -> Node {
        Node::new(MurmurConfig::default()).expect("default config is valid")
    }

    #[tokio::test]
    async fn start_stop_lifecycle() {
        let node = node();
        assert_eq!(node.state(), NodeState::Initializing);

        node.start().expect("first start succeeds");
        assert_eq!(node.state(), NodeState::Running);

        node.stop().await.expect("stop succeeds");
        assert_eq!(node.state(), NodeState::Stopped);
    }

    #[tokio::test]
    async fn double_start_rejected() {
        let node = node();
        node.start().expect("first start succeeds");
        assert!(node.start().is_err());
        node.stop().await.expect("stop succeeds");
    }

    #[tokio::test]
    async fn stop_before_start_rejected() {
        let node = node();
        assert!(node.stop().await.is_err());
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let node = node();
        node.start().expect("start succeeds");
        node.stop().await.expect("first stop succeeds");
        node.stop().await.expect("second stop is a no-op");
    }

    #[test]
    fn invalid_config_rejected() {
        let config = MurmurConfig {
            expiration_cycle: std::time::Duration::ZERO,
            ..MurmurConfig::default()
        };
        assert!(Node::new(config).is_err());
    }

    #[test]
    fn identity_management() {
        let node = node();
        let known = node
            .insert_identity(Identity::from_seed(&[0x42; 32]).expect("valid seed"));
        let stranger = Identity::from_seed(&[0x43; 32])
            .expect("valid seed")
            .public_key();

        assert!(node.has_identity(&known));
        assert!(!node.has_identity(&stranger));
        assert!(node.identity(&known).is_some());
        assert!(node.identity(&stranger).is_none());
    }

    #[test]
    fn new_identity_is_registered() {
        let node = node();
        let public_key = node.new_identity().expect("RNG available");
        assert!(node.has_identity(&public_key));
    }

    #[test]
    fn watch_unwatch_roundtrip() {
        let node = node();
        let fired = Arc::new(AtomicUsize::new(0));
        let seen = fired.clone();
        let id = node.watch(Filter {
            to: None,
            from: None,
            topics: TopicMatcher::any(),
            handler: Arc::new(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        });

        assert!(node.filters.get(id).is_some());
        node.unwatch(id);
        assert!(node.filters.get(id).is_none());
        // Unwatching twice is harmless.
        node.unwatch(id);
    }

    #[tokio::test]
    async fn messages_for_unknown_filter_is_empty() {
        let node = node();
        assert!(node.messages(1234).is_empty());
    }
}

//! Subscription filters and dispatch.
//!
//! A [`Filter`] binds an optional recipient identity, an optional
//! sender key, and a topic matcher to a handler. The [`Filters`]
//! registry hands out stable ids, tolerates concurrent
//! install/uninstall, and never holds its lock across a handler
//! invocation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use murmur_crypto::PublicKey;
use murmur_protocol::{Message, Topic, TopicMatcher};

/// Handler invoked once per matched message.
pub type Handler = Arc<dyn Fn(Message) + Send + Sync>;

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// One installed subscription.
pub struct Filter {
    /// Match only messages decrypted to this identity.
    pub to: Option<PublicKey>,
    /// Match only messages whose recovered signer equals this key.
    pub from: Option<PublicKey>,
    /// Match against the carrying envelope's topics.
    pub topics: TopicMatcher,
    /// Invoked once per matched message.
    pub handler: Handler,
}

/// Checks a filter against an opened message and its envelope topics.
pub fn filter_matches(filter: &Filter, message: &Message, topics: &[Topic]) -> bool {
    let from = message.recover();
    matches_with_sender(filter, message, from.as_ref(), topics)
}

fn matches_with_sender(
    filter: &Filter,
    message: &Message,
    from: Option<&PublicKey>,
    topics: &[Topic],
) -> bool {
    if let Some(to) = &filter.to {
        if message.to.as_ref() != Some(to) {
            return false;
        }
    }
    if let Some(want) = &filter.from {
        if from != Some(want) {
            return false;
        }
    }
    filter.topics.matches(topics)
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Registry of installed filters.
#[derive(Default)]
pub struct Filters {
    installed: RwLock<HashMap<u64, Arc<Filter>>>,
    next_id: AtomicU64,
}

impl Filters {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a filter, returning its stable id.
    pub fn install(&self, filter: Filter) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.installed
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(filter));
        tracing::debug!(id, "installed filter");
        id
    }

    /// Removes a filter. Idempotent; returns whether it was present.
    pub fn uninstall(&self, id: u64) -> bool {
        let removed = self
            .installed
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some();
        if removed {
            tracing::debug!(id, "uninstalled filter");
        }
        removed
    }

    /// Looks up a filter by id.
    pub fn get(&self, id: u64) -> Option<Arc<Filter>> {
        self.installed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Number of installed filters.
    pub fn len(&self) -> usize {
        self.installed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns whether no filters are installed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs every matching handler for an opened message.
    ///
    /// The signer is recovered once, the matching set is snapshotted
    /// under the read lock, and handlers run after the lock is
    /// released, so a slow handler cannot stall installs.
    pub fn notify(&self, message: &Message, topics: &[Topic]) {
        let from = message.recover();
        let matched: Vec<Arc<Filter>> = {
            let installed = self
                .installed
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            installed
                .values()
                .filter(|filter| matches_with_sender(filter, message, from.as_ref(), topics))
                .cloned()
                .collect()
        };

        for filter in matched {
            (filter.handler)(message.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_crypto::Identity;
    use std::sync::atomic::AtomicUsize;

    fn counting_filter(
        to: Option<PublicKey>,
        from: Option<PublicKey>,
        topics: TopicMatcher,
    ) -> (Filter, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let filter = Filter {
            to,
            from,
            topics,
            handler: Arc::new(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        };
        (filter, count)
    }

    #[test]
    fn install_returns_distinct_ids() {
        let filters = Filters::new();
        let (a, _) = counting_filter(None, None, TopicMatcher::any());
        let (b, _) = counting_filter(None, None, TopicMatcher::any());
        let id_a = filters.install(a);
        let id_b = filters.install(b);
        assert_ne!(id_a, id_b);
        assert_eq!(filters.len(), 2);
    }

    #[test]
    fn uninstall_is_idempotent() {
        let filters = Filters::new();
        let (f, _) = counting_filter(None, None, TopicMatcher::any());
        let id = filters.install(f);

        assert!(filters.uninstall(id));
        assert!(!filters.uninstall(id));
        assert!(filters.get(id).is_none());
        assert!(filters.is_empty());
    }

    #[test]
    fn notify_runs_matching_handlers() {
        let filters = Filters::new();
        let topic = Topic::new(b"news");
        let (matching, match_count) =
            counting_filter(None, None, TopicMatcher::new(vec![vec![topic]]));
        let (other, other_count) = counting_filter(
            None,
            None,
            TopicMatcher::new(vec![vec![Topic::new(b"sports")]]),
        );
        filters.install(matching);
        filters.install(other);

        let message = Message::new(b"hello".to_vec());
        filters.notify(&message, &[topic]);

        assert_eq!(match_count.load(Ordering::SeqCst), 1);
        assert_eq!(other_count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn to_constraint_requires_decrypted_recipient() {
        let identity = Identity::from_seed(&[0x55; 32]).expect("valid seed");
        let filters = Filters::new();
        let (f, count) = counting_filter(Some(identity.public_key()), None, TopicMatcher::any());
        filters.install(f);

        // Not decrypted to anyone.
        let anonymous = Message::new(b"x".to_vec());
        filters.notify(&anonymous, &[]);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        // Decrypted to the watched identity.
        let mut addressed = Message::new(b"x".to_vec());
        addressed.to = Some(identity.public_key());
        filters.notify(&addressed, &[]);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn from_constraint_requires_matching_signer() {
        let author = Identity::from_seed(&[0x66; 32]).expect("valid seed");
        let stranger = Identity::from_seed(&[0x77; 32]).expect("valid seed");

        let filters = Filters::new();
        let (f, count) = counting_filter(None, Some(author.public_key()), TopicMatcher::any());
        filters.install(f);

        let mut signed = Message::new(b"signed".to_vec());
        signed.sign(&author).expect("signing succeeds");
        filters.notify(&signed, &[]);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let mut other = Message::new(b"signed".to_vec());
        other.sign(&stranger).expect("signing succeeds");
        filters.notify(&other, &[]);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let unsigned = Message::new(b"unsigned".to_vec());
        filters.notify(&unsigned, &[]);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn filter_matches_agrees_with_notify() {
        let topic = Topic::new(b"t");
        let (filter, _) = counting_filter(None, None, TopicMatcher::new(vec![vec![topic]]));
        let message = Message::new(b"m".to_vec());

        assert!(filter_matches(&filter, &message, &[topic]));
        assert!(!filter_matches(&filter, &message, &[Topic::new(b"u")]));
    }
}

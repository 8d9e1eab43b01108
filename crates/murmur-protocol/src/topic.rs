//! Routing topics and the topic matcher.
//!
//! A [`Topic`] is a 4-byte domain tag derived from an arbitrary byte
//! string by taking the first four bytes of its Keccak-256 digest.
//! Envelopes carry an ordered topic list; filters declare a
//! [`TopicMatcher`] over it.

use std::collections::HashSet;
use std::fmt;

use murmur_crypto::hash::keccak256;
use murmur_types::{MurmurError, Result};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Topic
// ---------------------------------------------------------------------------

/// Immutable 4-byte routing tag.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Topic([u8; 4]);

impl Topic {
    /// The fixed byte length of a topic.
    pub const LEN: usize = 4;

    /// Derives a topic from arbitrary bytes: the first four bytes of
    /// the Keccak-256 digest.
    pub fn new(data: &[u8]) -> Self {
        let digest = keccak256(data);
        let mut tag = [0u8; 4];
        tag.copy_from_slice(&digest[..4]);
        Self(tag)
    }

    /// Wraps a raw 4-byte tag, e.g. one read off the wire.
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Wraps a raw tag of unchecked length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::LEN {
            return Err(MurmurError::MalformedEnvelope {
                reason: format!("expected 4-byte topic, got {} bytes", bytes.len()),
            });
        }
        let mut tag = [0u8; 4];
        tag.copy_from_slice(bytes);
        Ok(Self(tag))
    }

    /// Returns the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

// ---------------------------------------------------------------------------
// TopicMatcher
// ---------------------------------------------------------------------------

/// Filter condition over an envelope's topic list.
///
/// A matcher is a sequence of alternative groups. A topic list
/// matches when every non-empty group contains at least one of the
/// list's topics. The empty matcher (and a matcher of only empty
/// groups) matches everything.
#[derive(Clone, Debug, Default)]
pub struct TopicMatcher {
    conditions: Vec<HashSet<Topic>>,
}

impl TopicMatcher {
    /// Builds a matcher from alternative groups.
    pub fn new(groups: Vec<Vec<Topic>>) -> Self {
        Self {
            conditions: groups.into_iter().map(HashSet::from_iter).collect(),
        }
    }

    /// The matcher that accepts every envelope.
    pub fn any() -> Self {
        Self::default()
    }

    /// Checks an envelope's topic list against the matcher.
    pub fn matches(&self, topics: &[Topic]) -> bool {
        self.conditions
            .iter()
            .filter(|group| !group.is_empty())
            .all(|group| topics.iter().any(|topic| group.contains(topic)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_is_keccak_prefix() {
        let digest = keccak256(b"news");
        let topic = Topic::new(b"news");
        assert_eq!(topic.as_bytes(), &digest[..4]);
    }

    #[test]
    fn topic_is_deterministic() {
        assert_eq!(Topic::new(b"chat"), Topic::new(b"chat"));
        assert_ne!(Topic::new(b"chat"), Topic::new(b"news"));
    }

    #[test]
    fn topic_from_slice_enforces_length() {
        assert!(Topic::from_slice(&[1, 2, 3]).is_err());
        assert!(Topic::from_slice(&[1, 2, 3, 4, 5]).is_err());
        assert_eq!(
            Topic::from_slice(&[1, 2, 3, 4]).unwrap(),
            Topic::from_bytes([1, 2, 3, 4])
        );
    }

    #[test]
    fn empty_matcher_matches_everything() {
        let matcher = TopicMatcher::any();
        assert!(matcher.matches(&[]));
        assert!(matcher.matches(&[Topic::new(b"anything")]));
    }

    #[test]
    fn single_group_single_topic() {
        let t = Topic::new(b"news");
        let matcher = TopicMatcher::new(vec![vec![t]]);

        assert!(matcher.matches(&[t]));
        assert!(matcher.matches(&[Topic::new(b"other"), t]));
        assert!(!matcher.matches(&[Topic::new(b"other")]));
        assert!(!matcher.matches(&[]));
    }

    #[test]
    fn alternatives_within_group() {
        let a = Topic::new(b"a");
        let b = Topic::new(b"b");
        let matcher = TopicMatcher::new(vec![vec![a, b]]);

        assert!(matcher.matches(&[a]));
        assert!(matcher.matches(&[b]));
        assert!(!matcher.matches(&[Topic::new(b"c")]));
    }

    #[test]
    fn every_group_must_intersect() {
        let a = Topic::new(b"a");
        let b = Topic::new(b"b");
        let matcher = TopicMatcher::new(vec![vec![a], vec![b]]);

        assert!(matcher.matches(&[a, b]));
        assert!(!matcher.matches(&[a]));
        assert!(!matcher.matches(&[b]));
    }

    #[test]
    fn empty_groups_are_unconstrained() {
        let a = Topic::new(b"a");
        let matcher = TopicMatcher::new(vec![vec![], vec![a]]);

        assert!(matcher.matches(&[a]));
        assert!(!matcher.matches(&[Topic::new(b"b")]));
    }
}

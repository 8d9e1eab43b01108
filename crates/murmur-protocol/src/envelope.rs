//! The gossip unit: an expiring, proof-of-work-sealed envelope.
//!
//! An [`Envelope`] carries an opaque payload (the encoded inner
//! [`Message`]) together with routing topics, an absolute expiry, and
//! a nonce chosen to maximize the proof-of-work score. Its identity is
//! the Keccak-256 hash of the canonical encoding of all five fields,
//! cached write-once so the pool never sees an un-hashed envelope.
//!
//! # Sealing
//!
//! Sealing spends a wall-clock budget searching 32-bit nonces. The
//! work buffer is 64 bytes: the first 32 bytes hold the prefix of the
//! nonce-less encoding (constant across attempts), the trailing 4
//! bytes hold the candidate nonce big-endian. The candidate whose
//! Keccak-256 digest has the most leading zero bits wins. There is no
//! acceptance threshold: more time buys more zeros, and the network
//! may rank envelopes by that count.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use murmur_crypto::hash::keccak256;
use murmur_crypto::Identity;
use murmur_types::{unix_now, Hash, MurmurError, Result};

use crate::codec::{self, Value};
use crate::message::Message;
use crate::topic::Topic;

/// Nonces tried per deadline check while sealing.
const SEAL_BATCH: u32 = 1024;

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// A clear-text data packet to transmit through the overlay. Its
/// contents may or may not be encrypted and signed.
#[derive(Debug)]
pub struct Envelope {
    /// Absolute expiry deadline, unix seconds.
    pub expiry: u32,
    /// Lifetime in seconds; `expiry - ttl` is the send time.
    pub ttl: u32,
    /// Ordered routing topics.
    pub topics: Vec<Topic>,
    /// Opaque payload carrying the encoded inner message.
    pub data: Vec<u8>,
    /// Proof-of-work nonce chosen by [`Envelope::seal`].
    pub nonce: u32,

    /// Cached hash of the envelope to avoid rehashing every time.
    hash: OnceLock<Hash>,
}

impl Clone for Envelope {
    fn clone(&self) -> Self {
        Self {
            expiry: self.expiry,
            ttl: self.ttl,
            topics: self.topics.clone(),
            data: self.data.clone(),
            nonce: self.nonce,
            hash: self.hash.clone(),
        }
    }
}

impl PartialEq for Envelope {
    fn eq(&self, other: &Self) -> bool {
        self.expiry == other.expiry
            && self.ttl == other.ttl
            && self.topics == other.topics
            && self.data == other.data
            && self.nonce == other.nonce
    }
}

impl Eq for Envelope {}

impl Envelope {
    /// Wraps payload bytes into an unsealed envelope expiring `ttl`
    /// from now.
    pub fn new(ttl: Duration, topics: Vec<Topic>, data: Vec<u8>) -> Self {
        let ttl_secs = ttl.as_secs() as u32;
        Self {
            expiry: unix_now().saturating_add(ttl_secs),
            ttl: ttl_secs,
            topics,
            data,
            nonce: 0,
            hash: OnceLock::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Sealing
    // -----------------------------------------------------------------------

    /// Closes the envelope by spending `budget` of wall-clock time
    /// searching for the nonce with the highest proof-of-work score.
    ///
    /// At least one batch of candidates is always tried, so the nonce
    /// is well defined even for a zero budget. The cached hash is
    /// recomputed afterwards, since the nonce participates in it.
    pub fn seal(&mut self, budget: Duration) {
        let mut buf = self.work_buffer();

        let deadline = Instant::now() + budget;
        let mut best_bits = 0u32;
        let mut best_nonce = 0u32;
        let mut nonce = 0u32;
        loop {
            for _ in 0..SEAL_BATCH {
                buf[60..].copy_from_slice(&nonce.to_be_bytes());
                let bits = leading_zero_bits(&keccak256(&buf));
                if bits > best_bits {
                    best_bits = bits;
                    best_nonce = nonce;
                }
                nonce = nonce.wrapping_add(1);
            }
            if Instant::now() >= deadline {
                break;
            }
        }

        self.nonce = best_nonce;
        self.hash = OnceLock::new();
        let _ = self.hash.set(Hash::new(keccak256(&self.encode())));
    }

    /// Leading-zero-bit count of the sealed envelope's work digest.
    /// The ranking input a deployment may use for spam resistance.
    pub fn proof_strength(&self) -> u32 {
        leading_zero_bits(&keccak256(&self.work_buffer()))
    }

    /// Builds the 64-byte proof-of-work buffer for the current nonce.
    fn work_buffer(&self) -> [u8; 64] {
        let mut buf = [0u8; 64];
        let prefix = codec::encode(&self.value_without_nonce());
        let n = prefix.len().min(32);
        buf[..n].copy_from_slice(&prefix[..n]);
        buf[60..].copy_from_slice(&self.nonce.to_be_bytes());
        buf
    }

    // -----------------------------------------------------------------------
    // Hashing and encoding
    // -----------------------------------------------------------------------

    /// Returns the Keccak-256 hash of the envelope, calculating it if
    /// not yet done.
    pub fn hash(&self) -> Hash {
        *self
            .hash
            .get_or_init(|| Hash::new(keccak256(&self.encode())))
    }

    /// Canonical encoding of all five fields.
    pub fn encode(&self) -> Vec<u8> {
        codec::encode(&self.to_value())
    }

    /// Decodes an envelope, computing its hash eagerly.
    pub fn decode(data: &[u8]) -> Result<Self> {
        Self::from_value(&codec::decode(data)?)
    }

    pub(crate) fn to_value(&self) -> Value {
        let mut fields = self.wire_fields();
        fields.push(Value::uint(u64::from(self.nonce)));
        Value::List(fields)
    }

    fn value_without_nonce(&self) -> Value {
        Value::List(self.wire_fields())
    }

    fn wire_fields(&self) -> Vec<Value> {
        vec![
            Value::uint(u64::from(self.expiry)),
            Value::uint(u64::from(self.ttl)),
            Value::List(
                self.topics
                    .iter()
                    .map(|t| Value::Bytes(t.as_bytes().to_vec()))
                    .collect(),
            ),
            Value::Bytes(self.data.clone()),
        ]
    }

    pub(crate) fn from_value(value: &Value) -> Result<Self> {
        let items = value.as_list()?;
        if items.len() != 5 {
            return Err(MurmurError::MalformedEnvelope {
                reason: format!("expected 5 envelope fields, got {}", items.len()),
            });
        }

        let expiry = items[0].to_u32()?;
        let ttl = items[1].to_u32()?;
        let topics = items[2]
            .as_list()?
            .iter()
            .map(|item| item.as_bytes().and_then(Topic::from_slice))
            .collect::<Result<Vec<Topic>>>()?;
        let data = items[3].as_bytes()?.to_vec();
        let nonce = items[4].to_u32()?;

        let envelope = Self {
            expiry,
            ttl,
            topics,
            data,
            nonce,
            hash: OnceLock::new(),
        };
        envelope.hash();
        Ok(envelope)
    }

    // -----------------------------------------------------------------------
    // Opening
    // -----------------------------------------------------------------------

    /// Extracts the message contained within a potentially encrypted
    /// envelope.
    ///
    /// With no key, the message is returned with its payload verbatim.
    /// With a key, decryption is attempted: success replaces the
    /// payload with the plaintext and records the identity as the
    /// recipient; the "not addressed to this key" signal returns the
    /// message untouched so the caller can keep iterating; any other
    /// cryptographic failure is an error.
    ///
    /// # Errors
    ///
    /// - [`MurmurError::MalformedMessage`] if the payload does not
    ///   parse (empty data, or a declared signature that is missing).
    /// - [`MurmurError::DecryptionFailed`] if a supplied key fails
    ///   unexpectedly.
    pub fn open(&self, key: Option<&Identity>) -> Result<Opened> {
        let mut message = Message::from_envelope(self)?;

        let Some(identity) = key else {
            return Ok(Opened::Raw(message));
        };

        match murmur_crypto::ecies::decrypt(identity, &message.payload) {
            Ok(plaintext) => {
                message.payload = plaintext;
                message.to = Some(identity.public_key());
                Ok(Opened::Decrypted(message))
            }
            Err(MurmurError::NotForThisKey) => Ok(Opened::NotForKey(message)),
            Err(err) => Err(err),
        }
    }
}

// ---------------------------------------------------------------------------
// Opened
// ---------------------------------------------------------------------------

/// Outcome of [`Envelope::open`].
#[derive(Debug)]
pub enum Opened {
    /// The payload was decrypted with the supplied identity.
    Decrypted(Message),
    /// The payload was not addressed to the supplied identity and is
    /// returned as-is (possibly cleartext).
    NotForKey(Message),
    /// No identity was supplied; the payload is returned verbatim.
    Raw(Message),
}

impl Opened {
    /// Unwraps the carried message regardless of how it was opened.
    pub fn into_message(self) -> Message {
        match self {
            Opened::Decrypted(m) | Opened::NotForKey(m) | Opened::Raw(m) => m,
        }
    }
}

// ---------------------------------------------------------------------------
// Proof-of-work scoring
// ---------------------------------------------------------------------------

/// Counts the leading zero bits of a 32-byte digest.
fn leading_zero_bits(digest: &[u8; 32]) -> u32 {
    let mut count = 0;
    for &byte in digest {
        if byte == 0 {
            count += 8;
        } else {
            count += byte.leading_zeros();
            break;
        }
    }
    count
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Envelope {
        Envelope {
            expiry: 2_000_000_000,
            ttl: 10,
            topics: vec![Topic::new(b"news"), Topic::new(b"chat")],
            data: vec![0x00, b'h', b'i'],
            nonce: 7,
            hash: OnceLock::new(),
        }
    }

    #[test]
    fn encode_decode_roundtrip() {
        let env = sample();
        let decoded = Envelope::decode(&env.encode()).expect("valid encoding");
        assert_eq!(decoded, env);
        assert_eq!(decoded.hash(), env.hash());
    }

    #[test]
    fn hash_is_stable_across_cycles() {
        let env = sample();
        let first = env.hash();
        let decoded = Envelope::decode(&env.encode()).expect("valid encoding");
        let again = Envelope::decode(&decoded.encode()).expect("valid encoding");
        assert_eq!(first, decoded.hash());
        assert_eq!(first, again.hash());
    }

    #[test]
    fn clone_preserves_cached_hash() {
        let env = sample();
        let h = env.hash();
        let cloned = env.clone();
        assert_eq!(cloned.hash(), h);
    }

    #[test]
    fn decode_rejects_wrong_field_count() {
        let value = Value::List(vec![Value::uint(1), Value::uint(2)]);
        assert!(Envelope::from_value(&value).is_err());
    }

    #[test]
    fn decode_rejects_non_list() {
        assert!(Envelope::decode(&codec::encode(&Value::Bytes(b"nope".to_vec()))).is_err());
    }

    #[test]
    fn decode_rejects_bad_topic_width() {
        let value = Value::List(vec![
            Value::uint(100),
            Value::uint(10),
            Value::List(vec![Value::Bytes(vec![1, 2, 3])]),
            Value::Bytes(vec![0x00]),
            Value::uint(0),
        ]);
        assert!(Envelope::from_value(&value).is_err());
    }

    #[test]
    fn new_envelope_expiry_matches_ttl() {
        let env = Envelope::new(Duration::from_secs(10), vec![], vec![0x00]);
        let now = unix_now();
        assert!(env.expiry >= now + 9 && env.expiry <= now + 11);
        assert_eq!(env.ttl, 10);
    }

    #[test]
    fn seal_zero_budget_picks_best_of_first_batch() {
        let mut env = sample();
        env.seal(Duration::ZERO);
        let chosen = env.proof_strength();

        // No nonce in the guaranteed first batch may beat the winner.
        let mut probe = env.clone();
        for nonce in 0..SEAL_BATCH {
            probe.nonce = nonce;
            assert!(probe.proof_strength() <= chosen);
        }
    }

    #[test]
    fn seal_recomputes_hash() {
        let mut env = sample();
        let before = env.hash();
        env.seal(Duration::ZERO);
        // The cached hash always reflects the sealed encoding, even
        // though it was computed before sealing.
        assert_eq!(env.hash(), Hash::new(keccak256(&env.encode())));
        if env.nonce != 7 {
            assert_ne!(env.hash(), before);
        }
    }

    #[test]
    fn seal_respects_budget_floor() {
        let mut env = sample();
        let start = Instant::now();
        env.seal(Duration::from_millis(30));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn open_cleartext_without_key() {
        let env = sample();
        let opened = env.open(None).expect("parses");
        let message = match opened {
            Opened::Raw(m) => m,
            other => panic!("expected raw open, got {other:?}"),
        };
        assert_eq!(message.payload, b"hi");
        assert_eq!(message.sent, env.expiry - env.ttl);
        assert_eq!(message.ttl, env.ttl);
        assert_eq!(message.envelope_hash, Some(env.hash()));
        assert!(message.to.is_none());
    }

    #[test]
    fn open_cleartext_with_key_is_not_for_key() {
        let env = sample();
        let id = Identity::from_seed(&[0x11; 32]).expect("valid seed");
        let opened = env.open(Some(&id)).expect("parses");
        match opened {
            Opened::NotForKey(m) => assert_eq!(m.payload, b"hi"),
            other => panic!("expected not-for-key, got {other:?}"),
        }
    }

    #[test]
    fn open_empty_data_is_malformed() {
        let mut env = sample();
        env.data.clear();
        assert!(matches!(
            env.open(None),
            Err(MurmurError::MalformedMessage { .. })
        ));
    }

    #[test]
    fn leading_zero_bits_counts() {
        let mut digest = [0u8; 32];
        digest[0] = 0b1000_0000;
        assert_eq!(leading_zero_bits(&digest), 0);
        digest[0] = 0b0000_1000;
        assert_eq!(leading_zero_bits(&digest), 4);
        digest[0] = 0;
        digest[1] = 0b0010_0000;
        assert_eq!(leading_zero_bits(&digest), 10);
        assert_eq!(leading_zero_bits(&[0u8; 32]), 256);
    }
}

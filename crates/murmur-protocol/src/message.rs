//! The inner message: flags, optional signature, payload.
//!
//! A [`Message`] is what an envelope's `data` field decodes to for
//! holders of the right key. On the wire it is a single flags byte,
//! an optional 65-byte recoverable signature (present when the high
//! flag bit is set), and the payload, which may be cleartext or ECIES
//! ciphertext.
//!
//! Outbound construction runs through [`Message::wrap`]: sign over the
//! cleartext payload, then encrypt, then seal into an envelope.
//! Signing therefore authenticates the plaintext, and the signature
//! is recoverable after decryption on the receiving side.

use std::time::Duration;

use murmur_crypto::hash::keccak256;
use murmur_crypto::signing::{self, SIGNATURE_LENGTH};
use murmur_crypto::{ecies, Identity, PublicKey};
use murmur_types::config::{DEFAULT_TTL, DEFAULT_WORK};
use murmur_types::{Hash, MurmurError, Result};

use crate::envelope::Envelope;
use crate::topic::Topic;

/// High bit of the flags byte: a signature trails the flags.
pub const SIGNATURE_FLAG: u8 = 0x80;

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// An end-user payload, decoded from an envelope or under
/// construction for sending.
#[derive(Clone, Debug)]
pub struct Message {
    /// Flags byte; the high bit indicates a trailing signature.
    pub flags: u8,
    /// Recoverable ECDSA signature over Keccak-256(payload), if signed.
    pub signature: Option<[u8; SIGNATURE_LENGTH]>,
    /// The payload, cleartext or ECIES ciphertext.
    pub payload: Vec<u8>,
    /// Send time in unix seconds (`expiry - ttl`); zero for drafts.
    pub sent: u32,
    /// Lifetime in seconds; zero for drafts.
    pub ttl: u32,
    /// Hash of the carrying envelope; `None` for drafts.
    pub envelope_hash: Option<Hash>,
    /// The identity that decrypted the payload, if any.
    pub to: Option<PublicKey>,
}

impl Message {
    /// Creates an unsigned, unencrypted draft around a payload.
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            flags: 0,
            signature: None,
            payload,
            sent: 0,
            ttl: 0,
            envelope_hash: None,
            to: None,
        }
    }

    /// Signs the current payload, setting the signature flag.
    ///
    /// Must run before [`Message::encrypt_to`]: the signature covers
    /// the cleartext payload so the receiver can recover the author
    /// after decryption.
    pub fn sign(&mut self, identity: &Identity) -> Result<()> {
        let digest = keccak256(&self.payload);
        self.signature = Some(signing::sign_recoverable(identity, &digest)?);
        self.flags |= SIGNATURE_FLAG;
        Ok(())
    }

    /// Recovers the signer's public key, if the message is signed and
    /// the signature is well formed.
    pub fn recover(&self) -> Option<PublicKey> {
        let signature = self.signature.as_ref()?;
        let digest = keccak256(&self.payload);
        signing::recover(&digest, signature).ok()
    }

    /// Replaces the payload with its ECIES encryption to `recipient`.
    pub fn encrypt_to(&mut self, recipient: &PublicKey) -> Result<()> {
        self.payload = ecies::encrypt(recipient, &self.payload)?;
        Ok(())
    }

    /// Serializes the message into envelope payload bytes.
    pub fn bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            1 + self.signature.map_or(0, |_| SIGNATURE_LENGTH) + self.payload.len(),
        );
        out.push(self.flags);
        if let Some(signature) = &self.signature {
            out.extend_from_slice(signature);
        }
        out.extend_from_slice(&self.payload);
        out
    }

    /// Runs the full outbound pipeline: optional signing, optional
    /// encryption, envelope construction, proof-of-work sealing.
    ///
    /// A zero `ttl` or `work` falls back to the configured defaults.
    pub fn wrap(mut self, options: WrapOptions<'_>) -> Result<Envelope> {
        if let Some(identity) = options.from {
            self.sign(identity)?;
        }
        if let Some(recipient) = options.to {
            self.encrypt_to(recipient)?;
        }

        let ttl = if options.ttl.is_zero() {
            DEFAULT_TTL
        } else {
            options.ttl
        };
        let work = if options.work.is_zero() {
            DEFAULT_WORK
        } else {
            options.work
        };

        let mut envelope = Envelope::new(ttl, options.topics, self.bytes());
        envelope.seal(work);
        Ok(envelope)
    }

    /// Parses the structural layer of an envelope's payload: flags,
    /// optional signature, remainder. No cryptography happens here.
    pub(crate) fn from_envelope(envelope: &Envelope) -> Result<Self> {
        let data = &envelope.data;
        let Some((&flags, mut rest)) = data.split_first() else {
            return Err(MurmurError::MalformedMessage {
                reason: "envelope data is empty".into(),
            });
        };

        let mut signature = None;
        if flags & SIGNATURE_FLAG == SIGNATURE_FLAG {
            if rest.len() < SIGNATURE_LENGTH {
                return Err(MurmurError::MalformedMessage {
                    reason: format!(
                        "signature flag set but only {} payload bytes remain",
                        rest.len()
                    ),
                });
            }
            let mut sig = [0u8; SIGNATURE_LENGTH];
            sig.copy_from_slice(&rest[..SIGNATURE_LENGTH]);
            signature = Some(sig);
            rest = &rest[SIGNATURE_LENGTH..];
        }

        Ok(Self {
            flags,
            signature,
            payload: rest.to_vec(),
            sent: envelope.expiry.saturating_sub(envelope.ttl),
            ttl: envelope.ttl,
            envelope_hash: Some(envelope.hash()),
            to: None,
        })
    }
}

// ---------------------------------------------------------------------------
// WrapOptions
// ---------------------------------------------------------------------------

/// Options steering [`Message::wrap`].
pub struct WrapOptions<'a> {
    /// Sign with this identity.
    pub from: Option<&'a Identity>,
    /// Encrypt to this public key.
    pub to: Option<&'a PublicKey>,
    /// Envelope lifetime; zero means the default.
    pub ttl: Duration,
    /// Proof-of-work budget; zero means the default.
    pub work: Duration,
    /// Routing topics.
    pub topics: Vec<Topic>,
}

impl Default for WrapOptions<'_> {
    fn default() -> Self {
        Self {
            from: None,
            to: None,
            ttl: Duration::ZERO,
            work: Duration::ZERO,
            topics: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

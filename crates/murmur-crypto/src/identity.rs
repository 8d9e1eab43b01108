//! secp256k1 identities.
//!
//! An [`Identity`] is the keypair a node can decrypt and sign with;
//! a [`PublicKey`] is the 65-byte uncompressed SEC1 encoding of the
//! public half, used both on the wire and as the node's identity map
//! key. The private key is zeroized on drop by `k256`'s internal
//! `ZeroizeOnDrop`.

use std::fmt;

use k256::ecdsa::{SigningKey, VerifyingKey};
use murmur_types::{MurmurError, Result};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

// ---------------------------------------------------------------------------
// PublicKey
// ---------------------------------------------------------------------------

/// secp256k1 public key in uncompressed SEC1 form (65 bytes, leading
/// `0x04`).
///
/// Compressed input is accepted by [`PublicKey::from_bytes`] and
/// normalized to the uncompressed form, so byte equality is identity
/// equality.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct PublicKey([u8; 65]);

impl PublicKey {
    /// Fixed byte length of the uncompressed encoding.
    pub const LEN: usize = 65;

    /// Parses a SEC1-encoded public key (compressed or uncompressed).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let vk = VerifyingKey::from_sec1_bytes(bytes).map_err(|e| MurmurError::CryptoError {
            reason: format!("invalid public key: {e}"),
        })?;
        Ok(Self::from_verifying(&vk))
    }

    /// Returns the uncompressed 65-byte encoding.
    pub fn as_bytes(&self) -> &[u8; 65] {
        &self.0
    }

    pub(crate) fn from_verifying(vk: &VerifyingKey) -> Self {
        let point = vk.to_encoded_point(false);
        let mut bytes = [0u8; 65];
        bytes.copy_from_slice(point.as_bytes());
        Self(bytes)
    }

    pub(crate) fn verifying_key(&self) -> Result<VerifyingKey> {
        VerifyingKey::from_sec1_bytes(&self.0).map_err(|e| MurmurError::CryptoError {
            reason: format!("invalid public key bytes: {e}"),
        })
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// secp256k1 keypair held by a node for decryption and signing.
pub struct Identity {
    /// Internal signing key. `pub(crate)` so [`crate::signing`] and
    /// [`crate::ecies`] can use the secret scalar without exposing it
    /// to external callers.
    pub(crate) signing_key: SigningKey,
}

impl Identity {
    /// Generates a new random identity from OS entropy.
    ///
    /// # Errors
    ///
    /// Returns [`MurmurError::CryptoError`] if the operating system
    /// RNG fails or produces a scalar outside the curve order. The
    /// failure is surfaced to the caller; there is no panic path.
    pub fn generate() -> Result<Self> {
        let mut seed = [0u8; 32];
        OsRng
            .try_fill_bytes(&mut seed)
            .map_err(|e| MurmurError::CryptoError {
                reason: format!("system RNG failure: {e}"),
            })?;
        let result = SigningKey::from_slice(&seed).map_err(|e| MurmurError::CryptoError {
            reason: format!("generated scalar rejected: {e}"),
        });
        seed.zeroize();
        Ok(Self {
            signing_key: result?,
        })
    }

    /// Reconstructs an identity deterministically from a 32-byte seed.
    ///
    /// # Errors
    ///
    /// Returns [`MurmurError::CryptoError`] if the seed is zero or not
    /// below the curve order.
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self> {
        let signing_key = SigningKey::from_slice(seed).map_err(|e| MurmurError::CryptoError {
            reason: format!("invalid identity seed: {e}"),
        })?;
        Ok(Self { signing_key })
    }

    /// Returns the public half of this identity.
    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_verifying(self.signing_key.verifying_key())
    }
}

// Identity intentionally does not implement Clone or Debug to prevent
// accidental leakage of the private key in logs or copies.

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_produces_valid_identity() {
        let id = Identity::generate().expect("OS RNG available");
        let pk = id.public_key();
        assert_eq!(pk.as_bytes()[0], 0x04);
    }

    #[test]
    fn from_seed_is_deterministic() {
        let seed = [0x42u8; 32];
        let a = Identity::from_seed(&seed).expect("valid seed");
        let b = Identity::from_seed(&seed).expect("valid seed");
        assert_eq!(a.public_key(), b.public_key());
    }

    #[test]
    fn zero_seed_rejected() {
        let result = Identity::from_seed(&[0u8; 32]);
        assert!(result.is_err());
    }

    #[test]
    fn distinct_seeds_distinct_keys() {
        let a = Identity::from_seed(&[0x01; 32]).expect("valid seed");
        let b = Identity::from_seed(&[0x02; 32]).expect("valid seed");
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn public_key_roundtrip_uncompressed() {
        let id = Identity::from_seed(&[0x42u8; 32]).expect("valid seed");
        let pk = id.public_key();
        let parsed = PublicKey::from_bytes(pk.as_bytes()).expect("valid encoding");
        assert_eq!(pk, parsed);
    }

    #[test]
    fn compressed_input_normalized() {
        let id = Identity::from_seed(&[0x42u8; 32]).expect("valid seed");
        let compressed = id
            .signing_key
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec();
        let parsed = PublicKey::from_bytes(&compressed).expect("valid compressed key");
        assert_eq!(parsed, id.public_key());
        assert_eq!(parsed.as_bytes().len(), PublicKey::LEN);
    }

    #[test]
    fn garbage_public_key_rejected() {
        assert!(PublicKey::from_bytes(&[0xFFu8; 65]).is_err());
        assert!(PublicKey::from_bytes(&[]).is_err());
    }
}

//! Core shared types for the Murmur messaging overlay.
//!
//! This crate defines the fundamental types used across the workspace.
//! No other crate should define shared types; everything lives here.

pub mod config;

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Hash
// ---------------------------------------------------------------------------

/// 32-byte Keccak-256 digest identifying an envelope.
///
/// The hash is computed over the canonical encoding of all envelope
/// fields and is the key under which the pool and the per-peer "known"
/// sets track an envelope.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Hash([u8; 32]);

impl Hash {
    /// The fixed byte length of a hash.
    pub const LEN: usize = 32;

    /// Creates a new `Hash` from raw bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for Hash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for Hash {
    type Err = MurmurError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| MurmurError::MalformedEnvelope {
            reason: "invalid hex encoding for hash".into(),
        })?;
        if bytes.len() != 32 {
            return Err(MurmurError::MalformedEnvelope {
                reason: format!("expected 32 bytes for hash, got {}", bytes.len()),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

// ---------------------------------------------------------------------------
// Wall clock
// ---------------------------------------------------------------------------

/// Returns the current unix time in whole seconds, as carried on the
/// wire in envelope expiry fields.
pub fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// MurmurError
// ---------------------------------------------------------------------------

/// Central error type for the Murmur overlay.
///
/// All crates in the workspace convert their internal errors into
/// variants of this enum, ensuring a unified error handling surface.
#[derive(Debug, Error)]
pub enum MurmurError {
    /// An envelope (or outer frame) does not match the canonical
    /// encoding or the expected field shapes.
    #[error("malformed envelope: {reason}")]
    MalformedEnvelope {
        /// Human-readable description of the decode failure.
        reason: String,
    },

    /// An inner message payload is structurally invalid, e.g. shorter
    /// than its declared signature.
    #[error("malformed message: {reason}")]
    MalformedMessage {
        /// Human-readable description of the message parse failure.
        reason: String,
    },

    /// The peer handshake failed; terminal for that connection.
    #[error("handshake failed: {reason}")]
    HandshakeFailed {
        /// Human-readable description of the handshake failure.
        reason: String,
    },

    /// Opening an envelope with a given key failed unexpectedly.
    /// Local only: the opener tries the next key or gives up.
    #[error("decryption failed: {reason}")]
    DecryptionFailed {
        /// Human-readable description of the decryption failure.
        reason: String,
    },

    /// The payload is not addressed to the supplied key. This is the
    /// expected signal for ciphertext meant for someone else (or for
    /// cleartext payloads) and is never surfaced as a real failure.
    #[error("payload not addressed to this key")]
    NotForThisKey,

    /// A cryptographic operation failed (key generation, signing,
    /// recovery, key derivation).
    #[error("crypto error: {reason}")]
    CryptoError {
        /// Human-readable description of the cryptographic failure.
        reason: String,
    },

    /// A transport pipe closed or refused a frame. Closes the peer;
    /// the node continues.
    #[error("transport error: {reason}")]
    TransportError {
        /// Human-readable description of the transport failure.
        reason: String,
    },

    /// A configuration value is invalid, or a lifecycle method was
    /// called in the wrong state.
    #[error("config error: {reason}")]
    ConfigError {
        /// Human-readable description of the configuration problem.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Result alias
// ---------------------------------------------------------------------------

/// Convenience result type using [`MurmurError`].
pub type Result<T> = std::result::Result<T, MurmurError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_roundtrip_hex() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let bytes = [0xABu8; 32];
        let hash = Hash::new(bytes);
        let hex_str = hash.to_string();
        let parsed: Hash = hex_str.parse()?;
        assert_eq!(hash, parsed);
        Ok(())
    }

    #[test]
    fn hash_invalid_hex_length() {
        let result: std::result::Result<Hash, _> = "abcd".parse();
        assert!(result.is_err());
    }

    #[test]
    fn hash_invalid_hex_chars() {
        let result: std::result::Result<Hash, _> = "zzzz".parse();
        assert!(result.is_err());
    }

    #[test]
    fn hash_serde_json_roundtrip() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let hash = Hash::new([0x11u8; 32]);
        let json = serde_json::to_string(&hash)?;
        let parsed: Hash = serde_json::from_str(&json)?;
        assert_eq!(hash, parsed);
        Ok(())
    }

    #[test]
    fn unix_now_is_sane() {
        // 2020-01-01 as a lower bound; catches a zeroed clock.
        assert!(unix_now() > 1_577_836_800);
    }

    #[test]
    fn error_display() {
        let err = MurmurError::MalformedEnvelope {
            reason: "truncated list".into(),
        };
        assert!(err.to_string().contains("truncated list"));
    }

    #[test]
    fn not_for_this_key_display() {
        let err = MurmurError::NotForThisKey;
        assert!(err.to_string().contains("not addressed"));
    }
}

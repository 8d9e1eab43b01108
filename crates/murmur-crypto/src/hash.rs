//! Keccak-256 hashing.
//!
//! All hashing in Murmur uses Keccak-256 (the original Keccak padding,
//! not the NIST SHA-3 variant). Envelope identity, proof-of-work
//! scoring, topic derivation, and signing digests all go through
//! [`keccak256`].

use sha3::{Digest, Keccak256};

/// Computes the Keccak-256 hash of arbitrary data.
///
/// Returns a fixed 32-byte digest. Deterministic: identical inputs
/// always produce identical outputs.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&result);
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

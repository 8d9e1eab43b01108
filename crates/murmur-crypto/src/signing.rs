//! Recoverable ECDSA over secp256k1.
//!
//! Signatures are 65 bytes: the 64-byte `r ‖ s` pair followed by a
//! one-byte recovery id (`v`). Given the signed digest, the signer's
//! public key can be recovered from the signature alone, which is how
//! message authorship is established without any key directory.

use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use murmur_types::{MurmurError, Result};

use crate::identity::{Identity, PublicKey};

/// Byte length of a recoverable signature (`r ‖ s ‖ v`).
pub const SIGNATURE_LENGTH: usize = 65;

/// Signs a 32-byte digest, returning a recoverable 65-byte signature.
///
/// # Errors
///
/// Returns [`MurmurError::CryptoError`] if the underlying signing
/// operation fails (e.g. a degenerate nonce, which RFC 6979 makes
/// practically unreachable).
pub fn sign_recoverable(identity: &Identity, digest: &[u8; 32]) -> Result<[u8; SIGNATURE_LENGTH]> {
    let (signature, recovery_id) = identity
        .signing_key
        .sign_prehash_recoverable(digest)
        .map_err(|e| MurmurError::CryptoError {
            reason: format!("recoverable signing failed: {e}"),
        })?;

    let mut out = [0u8; SIGNATURE_LENGTH];
    out[..64].copy_from_slice(signature.to_bytes().as_slice());
    out[64] = recovery_id.to_byte();
    Ok(out)
}

/// Recovers the signer's public key from a 65-byte signature over the
/// given digest.
///
/// # Errors
///
/// Returns [`MurmurError::CryptoError`] if the signature has the wrong
/// length, carries an invalid recovery id, or does not recover to a
/// valid curve point.
pub fn recover(digest: &[u8; 32], signature: &[u8]) -> Result<PublicKey> {
    if signature.len() != SIGNATURE_LENGTH {
        return Err(MurmurError::CryptoError {
            reason: format!(
                "expected {SIGNATURE_LENGTH}-byte signature, got {}",
                signature.len()
            ),
        });
    }

    let sig = Signature::from_slice(&signature[..64]).map_err(|e| MurmurError::CryptoError {
        reason: format!("invalid signature encoding: {e}"),
    })?;

    let recovery_id =
        RecoveryId::from_byte(signature[64]).ok_or_else(|| MurmurError::CryptoError {
            reason: format!("invalid recovery id: {}", signature[64]),
        })?;

    let vk = VerifyingKey::recover_from_prehash(digest, &sig, recovery_id).map_err(|e| {
        MurmurError::CryptoError {
            reason: format!("public key recovery failed: {e}"),
        }
    })?;

    Ok(PublicKey::from_verifying(&vk))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

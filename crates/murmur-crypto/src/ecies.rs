//! Hybrid public-key encryption (ECIES) on secp256k1.
//!
//! Every encryption generates a fresh ephemeral secp256k1 keypair,
//! performs ECDH with the recipient's public key, derives a symmetric
//! key via HKDF-SHA256 with a fixed domain-separating salt, and seals
//! the plaintext with XChaCha20-Poly1305.
//!
//! # Ciphertext layout
//!
//! ```text
//! ephemeral public key (65, uncompressed, leading 0x04)
//! ‖ nonce (24)
//! ‖ ciphertext + Poly1305 tag (plaintext + 16)
//! ```
//!
//! # The "not for this key" signal
//!
//! Opportunistic decryption needs to distinguish "this payload was
//! never encrypted for me" from a genuine failure. Data that is too
//! short to be a ciphertext, or that does not start with the
//! uncompressed-point tag, yields [`MurmurError::NotForThisKey`]; the
//! caller treats the payload as cleartext and moves on. Everything
//! else (bad ephemeral point, failed tag check) is
//! [`MurmurError::DecryptionFailed`].

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use hkdf::Hkdf;
use k256::ecdsa::{SigningKey, VerifyingKey};
use murmur_types::{MurmurError, Result};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::identity::{Identity, PublicKey};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Fixed HKDF salt, acting as a domain separator for keys derived here.
const ECIES_SALT: &[u8] = b"murmur-ecies-v1";

/// SEC1 tag byte of an uncompressed curve point.
const POINT_TAG: u8 = 0x04;

/// Length of the ephemeral public key prefix.
const EPHEMERAL_LEN: usize = 65;

/// Length of the XChaCha20-Poly1305 nonce.
const NONCE_LEN: usize = 24;

/// Length of the Poly1305 authentication tag.
const TAG_LEN: usize = 16;

/// Total ciphertext overhead beyond the plaintext length.
pub const OVERHEAD: usize = EPHEMERAL_LEN + NONCE_LEN + TAG_LEN;

// ---------------------------------------------------------------------------
// Key derivation
// ---------------------------------------------------------------------------

/// Derives the 32-byte symmetric key from an ECDH shared secret,
/// binding the recipient's public key into the HKDF info.
fn derive_key(shared: &[u8], recipient: &PublicKey) -> Result<Zeroizing<[u8; 32]>> {
    let hk = Hkdf::<Sha256>::new(Some(ECIES_SALT), shared);
    let mut key = Zeroizing::new([0u8; 32]);
    hk.expand(recipient.as_bytes(), &mut key[..])
        .map_err(|e| MurmurError::CryptoError {
            reason: format!("HKDF expansion failed: {e}"),
        })?;
    Ok(key)
}

// ---------------------------------------------------------------------------
// Encrypt
// ---------------------------------------------------------------------------

/// Encrypts a plaintext to the given recipient public key.
///
/// A fresh ephemeral keypair is generated per call, so repeated
/// encryptions of the same plaintext to the same recipient produce
/// unrelated ciphertexts.
///
/// # Errors
///
/// Returns [`MurmurError::CryptoError`] if the recipient key is
/// invalid, the RNG fails, or AEAD sealing fails.
pub fn encrypt(recipient: &PublicKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let ephemeral = SigningKey::random(&mut OsRng);
    let ephemeral_pub = ephemeral.verifying_key().to_encoded_point(false);

    let recipient_vk = recipient.verifying_key()?;
    let shared =
        k256::ecdh::diffie_hellman(ephemeral.as_nonzero_scalar(), recipient_vk.as_affine());
    let key = derive_key(shared.raw_secret_bytes().as_slice(), recipient)?;

    let mut nonce = [0u8; NONCE_LEN];
    OsRng
        .try_fill_bytes(&mut nonce)
        .map_err(|e| MurmurError::CryptoError {
            reason: format!("system RNG failure: {e}"),
        })?;

    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key[..]));
    let sealed = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|e| MurmurError::CryptoError {
            reason: format!("XChaCha20-Poly1305 encryption failed: {e}"),
        })?;

    let mut out = Vec::with_capacity(EPHEMERAL_LEN + NONCE_LEN + sealed.len());
    out.extend_from_slice(ephemeral_pub.as_bytes());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

// ---------------------------------------------------------------------------
// Decrypt
// ---------------------------------------------------------------------------

/// Attempts to decrypt a ciphertext with the given identity.
///
/// # Errors
///
/// - [`MurmurError::NotForThisKey`] when the data cannot be a
///   ciphertext addressed to anyone: too short, or missing the
///   uncompressed-point tag. The caller should treat the data as
///   cleartext.
/// - [`MurmurError::DecryptionFailed`] when the data is shaped like a
///   ciphertext but cannot be opened with this key: an invalid
///   ephemeral point, or a failed authentication tag.
pub fn decrypt(identity: &Identity, data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < OVERHEAD || data[0] != POINT_TAG {
        return Err(MurmurError::NotForThisKey);
    }

    let ephemeral_vk = VerifyingKey::from_sec1_bytes(&data[..EPHEMERAL_LEN]).map_err(|e| {
        MurmurError::DecryptionFailed {
            reason: format!("invalid ephemeral public key: {e}"),
        }
    })?;

    let shared = k256::ecdh::diffie_hellman(
        identity.signing_key.as_nonzero_scalar(),
        ephemeral_vk.as_affine(),
    );
    let key = derive_key(shared.raw_secret_bytes().as_slice(), &identity.public_key())?;

    let nonce = &data[EPHEMERAL_LEN..EPHEMERAL_LEN + NONCE_LEN];
    let sealed = &data[EPHEMERAL_LEN + NONCE_LEN..];

    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key[..]));
    cipher
        .decrypt(XNonce::from_slice(nonce), sealed)
        .map_err(|e| MurmurError::DecryptionFailed {
            reason: format!("XChaCha20-Poly1305 decryption failed: {e}"),
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Identity {
        Identity::from_seed(&[0xAA; 32]).expect("valid seed")
    }

    fn bob() -> Identity {
        Identity::from_seed(&[0xBB; 32]).expect("valid seed")
    }

    #[test]
    fn encrypt_decrypt_roundtrip() -> Result<()> {
        let bob = bob();
        let plaintext = b"hello over the overlay";

        let ciphertext = encrypt(&bob.public_key(), plaintext)?;
        assert_eq!(ciphertext.len(), plaintext.len() + OVERHEAD);

        let decrypted = decrypt(&bob, &ciphertext)?;
        assert_eq!(decrypted.as_slice(), plaintext.as_slice());
        Ok(())
    }

    #[test]
    fn wrong_recipient_fails_with_decryption_error() -> Result<()> {
        let bob = bob();
        let ciphertext = encrypt(&bob.public_key(), b"secret")?;

        let alice = alice();
        let result = decrypt(&alice, &ciphertext);
        assert!(matches!(
            result,
            Err(MurmurError::DecryptionFailed { .. })
        ));
        Ok(())
    }

    #[test]
    fn cleartext_yields_not_for_this_key() {
        let bob = bob();
        let result = decrypt(&bob, b"just some plain words");
        assert!(matches!(result, Err(MurmurError::NotForThisKey)));
    }

    #[test]
    fn empty_payload_yields_not_for_this_key() {
        let bob = bob();
        let result = decrypt(&bob, b"");
        assert!(matches!(result, Err(MurmurError::NotForThisKey)));
    }

    #[test]
    fn tampered_ciphertext_fails() -> Result<()> {
        let bob = bob();
        let mut ciphertext = encrypt(&bob.public_key(), b"secret")?;
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0xFF;

        let result = decrypt(&bob, &ciphertext);
        assert!(matches!(
            result,
            Err(MurmurError::DecryptionFailed { .. })
        ));
        Ok(())
    }

    #[test]
    fn ephemeral_keys_unique_per_call() -> Result<()> {
        let bob = bob();
        let c1 = encrypt(&bob.public_key(), b"msg")?;
        let c2 = encrypt(&bob.public_key(), b"msg")?;
        assert_ne!(c1[..EPHEMERAL_LEN], c2[..EPHEMERAL_LEN]);
        assert_ne!(c1, c2);
        Ok(())
    }

    #[test]
    fn empty_plaintext_roundtrip() -> Result<()> {
        let bob = bob();
        let ciphertext = encrypt(&bob.public_key(), b"")?;
        assert_eq!(ciphertext.len(), OVERHEAD);

        let decrypted = decrypt(&bob, &ciphertext)?;
        assert!(decrypted.is_empty());
        Ok(())
    }
}

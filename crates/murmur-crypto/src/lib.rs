//! Cryptographic primitives for the Murmur messaging overlay.
//!
//! Everything here operates on the secp256k1 curve and Keccak-256:
//!
//! - [`hash`] — Keccak-256 digest helper.
//! - [`identity`] — keypair generation and the public-key wrapper the
//!   node uses as an identity map key.
//! - [`signing`] — recoverable ECDSA over 32-byte digests; signatures
//!   are 65 bytes (`r ‖ s ‖ v`) so the signer can be recovered without
//!   a key lookup.
//! - [`ecies`] — hybrid public-key encryption (ephemeral ECDH,
//!   HKDF-SHA256, XChaCha20-Poly1305) with a distinguished "not
//!   addressed to this key" signal for opportunistic decryption.

pub mod ecies;
pub mod hash;
pub mod identity;
pub mod signing;

pub use identity::{Identity, PublicKey};

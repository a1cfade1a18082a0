//! Cryptographic primitives for the SealTalk relay.
//!
//! The relay never sees plaintext or long-term private keys in the clear.
//! Each user owns a long-lived RSA identity whose private half is stored
//! sealed under a PBKDF2-derived key. A conversation uses one 256-bit AES key,
//! generated by the invitee and transported to the inviter wrapped with
//! RSA-OAEP. Messages are encrypted with AES-256-CFB over PKCS#7-padded
//! plaintext, prefixed by a fresh random IV.
//!
//! # Security
//!
//! The relay cipher is unauthenticated. Tampering surfaces as a padding or
//! UTF-8 failure in most cases, but callers must report every decryption
//! failure with the same generic message so that error variants cannot be
//! used as a padding oracle.
//!
//! Randomness is always supplied by the caller (IVs, salts, RNGs) so that the
//! same code runs under a seeded simulation environment.

#![forbid(unsafe_code)]

pub mod error;
pub mod identity;
pub mod key;
pub mod padding;
pub mod relay;
pub mod seal;

pub use error::CryptoError;
pub use identity::{PrivateKey, PublicKey, RSA_KEY_BITS};
pub use key::{KEY_SIZE, SymmetricKey};
pub use relay::{BLOCK_SIZE, IV_SIZE, decrypt_message, encrypt_message};
pub use seal::{
    MIN_PBKDF2_ITERATIONS, SALT_SIZE, derive_passphrase, open_private_key, seal_private_key,
};

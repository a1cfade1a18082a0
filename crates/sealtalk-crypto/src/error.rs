//! Error types for cryptographic operations.

use thiserror::Error;

/// Errors produced by the SealTalk primitives.
///
/// `InvalidPadding`, `InvalidUtf8` and `CiphertextTooShort` describe a
/// malformed relay ciphertext. They are distinct for logging only; user-facing
/// code must collapse them into one generic message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Key material had the wrong length
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength {
        /// Expected length in bytes
        expected: usize,
        /// Actual length in bytes
        actual: usize,
    },

    /// Ciphertext is shorter than the IV prefix
    #[error("ciphertext too short: {len} bytes")]
    CiphertextTooShort {
        /// Length of the rejected input
        len: usize,
    },

    /// PKCS#7 padding check failed after decryption
    #[error("invalid padding")]
    InvalidPadding,

    /// Decrypted bytes are not valid UTF-8
    #[error("decrypted message is not valid UTF-8")]
    InvalidUtf8,

    /// Sealed private key blob is truncated or has invalid parameters
    #[error("malformed sealed private key")]
    MalformedSealedKey,

    /// Derived key does not match the stored verification tag
    #[error("wrong passphrase")]
    WrongPassphrase,

    /// RSA decryption of a wrapped key failed
    #[error("failed to decrypt wrapped key")]
    DecryptionFailure,

    /// RSA key generation or encryption failed
    #[error("rsa operation failed: {0}")]
    Rsa(String),

    /// PEM encoding or decoding failed
    #[error("pem encoding failed: {0}")]
    Pem(String),
}

//! Message encryption with a fresh IV per call.

use sealtalk_crypto::{CryptoError, SymmetricKey, decrypt_message, encrypt_message};

use crate::env::Environment;

/// Relay cipher bound to an environment RNG.
#[derive(Debug, Clone)]
pub struct RelayCipher<E: Environment> {
    env: E,
}

impl<E: Environment> RelayCipher<E> {
    /// Create a cipher drawing IVs from `env`.
    pub fn new(env: E) -> Self {
        Self { env }
    }

    /// Encrypt to `iv || ciphertext`.
    pub fn encrypt(&self, key: &SymmetricKey, plaintext: &str) -> Vec<u8> {
        encrypt_message(key, plaintext, self.env.random_array())
    }

    /// Decrypt `iv || ciphertext`.
    pub fn decrypt(&self, key: &SymmetricKey, data: &[u8]) -> Result<String, CryptoError> {
        decrypt_message(key, data)
    }
}

//! Protocol tunables.

use std::time::Duration;

use sealtalk_crypto::{MIN_PBKDF2_ITERATIONS, RSA_KEY_BITS};

/// Lifetimes and cryptographic parameters shared by all components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolConfig {
    /// Lifetime of an invitation, its setup flag and the wrapped key blob
    pub invitation_ttl: Duration,
    /// Lifetime of a cached ciphertext
    pub cache_ttl: Duration,
    /// Lifetime of a partner record
    pub partner_ttl: Duration,
    /// Lifetime of a session's symmetric key; `None` keeps it until the
    /// session is ended
    pub session_key_ttl: Option<Duration>,
    /// RSA modulus size for new identities
    pub rsa_bits: usize,
    /// PBKDF2 rounds used when sealing private keys
    pub pbkdf2_iterations: u32,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            invitation_ttl: Duration::from_secs(3600),
            cache_ttl: Duration::from_secs(600),
            partner_ttl: Duration::from_secs(30 * 24 * 3600),
            session_key_ttl: None,
            rsa_bits: RSA_KEY_BITS,
            pbkdf2_iterations: MIN_PBKDF2_ITERATIONS,
        }
    }
}

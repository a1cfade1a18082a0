//! Long-lived RSA identities and hybrid key transport.
//!
//! The invitee wraps the conversation key under the inviter's public key with
//! RSA-OAEP (SHA-256, MGF1-SHA-256). Only the inviter's listener unwraps it.
//!
//! Key generation and RSA operations are CPU-bound; async callers run them on
//! a blocking pool.

use std::fmt;

use rsa::{
    Oaep, RsaPrivateKey, RsaPublicKey,
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding},
    rand_core::CryptoRngCore,
};
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

use crate::{error::CryptoError, key::SymmetricKey};

/// Modulus size for newly generated identities
pub const RSA_KEY_BITS: usize = 2048;

/// Public half of a user's identity.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey(RsaPublicKey);

impl PublicKey {
    /// Parse a SubjectPublicKeyInfo PEM document.
    pub fn from_pem(pem: &str) -> Result<Self, CryptoError> {
        RsaPublicKey::from_public_key_pem(pem)
            .map(Self)
            .map_err(|e| CryptoError::Pem(e.to_string()))
    }

    /// Encode as a SubjectPublicKeyInfo PEM document.
    pub fn to_pem(&self) -> Result<String, CryptoError> {
        self.0.to_public_key_pem(LineEnding::LF).map_err(|e| CryptoError::Pem(e.to_string()))
    }

    /// Encrypt a conversation key to this identity (RSA-OAEP, SHA-256).
    pub fn wrap_key<R: CryptoRngCore>(
        &self,
        rng: &mut R,
        key: &SymmetricKey,
    ) -> Result<Vec<u8>, CryptoError> {
        self.0
            .encrypt(rng, Oaep::new::<Sha256>(), key.as_bytes())
            .map_err(|e| CryptoError::Rsa(e.to_string()))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey").finish_non_exhaustive()
    }
}

/// Private half of a user's identity.
///
/// Never leaves the server and is only held in memory while unwrapping a
/// conversation key.
pub struct PrivateKey(RsaPrivateKey);

impl PrivateKey {
    /// Generate a fresh keypair with public exponent 65537.
    pub fn generate<R: CryptoRngCore>(rng: &mut R, bits: usize) -> Result<Self, CryptoError> {
        RsaPrivateKey::new(rng, bits).map(Self).map_err(|e| CryptoError::Rsa(e.to_string()))
    }

    /// Public half of this keypair.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(RsaPublicKey::from(&self.0))
    }

    /// Parse an unencrypted PKCS#8 PEM document.
    pub fn from_pem(pem: &str) -> Result<Self, CryptoError> {
        RsaPrivateKey::from_pkcs8_pem(pem).map(Self).map_err(|e| CryptoError::Pem(e.to_string()))
    }

    /// Encode as an unencrypted PKCS#8 PEM document.
    pub fn to_pem(&self) -> Result<Zeroizing<String>, CryptoError> {
        self.0.to_pkcs8_pem(LineEnding::LF).map_err(|e| CryptoError::Pem(e.to_string()))
    }

    /// Decrypt a conversation key wrapped by [`PublicKey::wrap_key`].
    pub fn unwrap_key(&self, wrapped: &[u8]) -> Result<SymmetricKey, CryptoError> {
        let mut raw = self
            .0
            .decrypt(Oaep::new::<Sha256>(), wrapped)
            .map_err(|_| CryptoError::DecryptionFailure)?;

        let key = SymmetricKey::from_slice(&raw);
        raw.zeroize();
        key
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}

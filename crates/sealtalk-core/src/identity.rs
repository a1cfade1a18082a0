//! Per-user RSA identities.
//!
//! An identity is created lazily on first contact and never replaced. The
//! private half is sealed with a passphrase derived from the server secret
//! and the user id, and is only unsealed for the duration of one operation.

use std::sync::Arc;

use sealtalk_crypto::{
    CryptoError, PrivateKey, PublicKey, derive_passphrase, open_private_key, seal_private_key,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::{
    UserId,
    config::ProtocolConfig,
    env::Environment,
    error::{CoreError, decode_cbor, encode_cbor, join_error},
    store::{SharedStore, keys},
};

#[derive(Serialize, Deserialize)]
struct IdentityRecord {
    public_pem: String,
    #[serde(with = "serde_bytes")]
    sealed_private_key: Vec<u8>,
}

/// Creates and loads user identities.
#[derive(Clone)]
pub struct IdentityManager<E: Environment> {
    store: SharedStore,
    env: E,
    config: ProtocolConfig,
    secret: Arc<Zeroizing<Vec<u8>>>,
}

impl<E: Environment> IdentityManager<E> {
    /// Create a manager sealing keys under `secret`.
    pub fn new(store: SharedStore, env: E, config: ProtocolConfig, secret: Vec<u8>) -> Self {
        Self { store, env, config, secret: Arc::new(Zeroizing::new(secret)) }
    }

    /// Create the user's identity unless one exists.
    ///
    /// Returns whether a new identity was stored. Keypair generation runs on
    /// the blocking pool. Two concurrent calls may both generate a keypair,
    /// but only the first write wins.
    pub async fn ensure(&self, user: UserId) -> Result<bool, CoreError> {
        let key = keys::user_keys(user);
        if self.store.get(&key).await?.is_some() {
            return Ok(false);
        }

        let passphrase = derive_passphrase(&self.secret, user)?;
        let mut rng = self.env.rng();
        let salt = self.env.random_array();
        let iv = self.env.random_array();
        let bits = self.config.rsa_bits;
        let iterations = self.config.pbkdf2_iterations;

        let record = tokio::task::spawn_blocking(move || -> Result<_, CryptoError> {
            let private = PrivateKey::generate(&mut rng, bits)?;
            let public_pem = private.public_key().to_pem()?;
            let sealed_private_key =
                seal_private_key(&private, passphrase.as_bytes(), salt, iv, iterations)?;
            Ok(IdentityRecord { public_pem, sealed_private_key })
        })
        .await
        .map_err(join_error)??;

        let created = self.store.set_nx(&key, encode_cbor(&record)?, None).await?;
        if created {
            info!(user_id = user, bits, "identity created");
        } else {
            debug!(user_id = user, "identity created concurrently, keeping existing one");
        }
        Ok(created)
    }

    /// Whether the user has an identity.
    pub async fn exists(&self, user: UserId) -> Result<bool, CoreError> {
        Ok(self.store.get(&keys::user_keys(user)).await?.is_some())
    }

    /// The user's public key as PEM.
    pub async fn public_key_pem(&self, user: UserId) -> Result<String, CoreError> {
        Ok(self.load(user).await?.public_pem)
    }

    /// The user's public key.
    pub async fn public_key(&self, user: UserId) -> Result<PublicKey, CoreError> {
        Ok(PublicKey::from_pem(&self.public_key_pem(user).await?)?)
    }

    /// Unseal the user's private key.
    ///
    /// PBKDF2 runs on the blocking pool.
    pub async fn private_key(&self, user: UserId) -> Result<PrivateKey, CoreError> {
        let record = self.load(user).await?;
        let passphrase = derive_passphrase(&self.secret, user)?;

        tokio::task::spawn_blocking(move || {
            open_private_key(&record.sealed_private_key, passphrase.as_bytes())
        })
        .await
        .map_err(join_error)?
        .map_err(|e| match e {
            CryptoError::WrongPassphrase => CoreError::WrongPassphrase,
            other => CoreError::Crypto(other),
        })
    }

    async fn load(&self, user: UserId) -> Result<IdentityRecord, CoreError> {
        let bytes = self
            .store
            .get(&keys::user_keys(user))
            .await?
            .ok_or(CoreError::IdentityMissing { user_id: user })?;
        decode_cbor(&bytes)
    }
}

//! Short-lived payload cache.
//!
//! Ciphertexts are too large for a 64-byte callback payload, so the relay
//! stores them here and hands out a short random key instead.

use tracing::trace;

use crate::{
    config::ProtocolConfig,
    env::Environment,
    error::CoreError,
    store::{SharedStore, keys},
    token::CacheKey,
};

/// Stores blobs under random keys for a limited time.
#[derive(Clone)]
pub struct PayloadCache<E: Environment> {
    store: SharedStore,
    env: E,
    config: ProtocolConfig,
}

impl<E: Environment> PayloadCache<E> {
    /// Create a cache.
    pub fn new(store: SharedStore, env: E, config: ProtocolConfig) -> Self {
        Self { store, env, config }
    }

    /// Store `blob` and return its key.
    pub async fn put(&self, blob: Vec<u8>) -> Result<CacheKey, CoreError> {
        let key = CacheKey::generate(&self.env);
        let len = blob.len();
        self.store.set(&keys::cache(key.as_str()), blob, Some(self.config.cache_ttl)).await?;
        trace!(cache_key = %key, len, "payload cached");
        Ok(key)
    }

    /// Fetch a blob by its textual key.
    ///
    /// Malformed, unknown and expired keys are all `InvalidOrExpired`.
    pub async fn get(&self, key: &str) -> Result<Vec<u8>, CoreError> {
        let key = CacheKey::parse(key).ok_or(CoreError::InvalidOrExpired)?;
        self.store.get(&keys::cache(key.as_str())).await?.ok_or(CoreError::InvalidOrExpired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SystemEnv, testing};

    #[tokio::test]
    async fn put_then_get() {
        let cache = PayloadCache::new(testing::store(), SystemEnv, testing::config());
        let key = cache.put(vec![1, 2, 3]).await.unwrap();
        assert_eq!(cache.get(key.as_str()).await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn unknown_and_malformed_keys() {
        let cache = PayloadCache::new(testing::store(), SystemEnv, testing::config());
        assert!(matches!(cache.get("short").await, Err(CoreError::InvalidOrExpired)));
        let unknown = CacheKey::generate(&SystemEnv);
        assert!(matches!(cache.get(unknown.as_str()).await, Err(CoreError::InvalidOrExpired)));
    }
}

//! Key-value store abstraction.
//!
//! All protocol state lives behind [`Store`]: plain values with optional
//! expiry, string sets, atomic batches and publish/subscribe channels. Each
//! call is atomic with respect to the keys it touches, which is the only
//! cross-request synchronization the protocol relies on.
//!
//! Backends: [`MemoryStore`] here, a persistent `redb` backend in the server
//! crate. Both share [`PubSubHub`] for channels.

pub mod keys;
mod memory;
mod pubsub;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

pub use memory::MemoryStore;
pub use pubsub::{PubSubHub, Subscription};

use crate::error::StoreError;

/// Store handle shared by all components.
pub type SharedStore = Arc<dyn Store>;

/// One write in an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    /// Store `value` under `key`, replacing any previous value
    Put {
        /// Target key
        key: String,
        /// New value
        value: Vec<u8>,
        /// Expiry; `None` persists until deleted
        ttl: Option<Duration>,
    },
    /// Remove `key` if present
    Delete {
        /// Target key
        key: String,
    },
}

impl Write {
    /// Convenience constructor for [`Write::Put`].
    pub fn put(key: impl Into<String>, value: Vec<u8>, ttl: Option<Duration>) -> Self {
        Self::Put { key: key.into(), value, ttl }
    }

    /// Convenience constructor for [`Write::Delete`].
    pub fn delete(key: impl Into<String>) -> Self {
        Self::Delete { key: key.into() }
    }
}

/// Shared key-value store with expiring entries and pub/sub.
///
/// Expired entries must be invisible to every read even before
/// [`Store::purge_expired`] reclaims them.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Store a value, replacing any previous one.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>)
    -> Result<(), StoreError>;

    /// Store a value only if the key is absent. Returns whether it was
    /// written.
    async fn set_nx(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError>;

    /// Replace the value only if it currently equals `expected`. The entry
    /// keeps its remaining lifetime. Returns whether it was replaced.
    async fn compare_and_set(
        &self,
        key: &str,
        expected: &[u8],
        value: Vec<u8>,
    ) -> Result<bool, StoreError>;

    /// Read a value.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Remove a key. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Apply all writes atomically.
    async fn apply(&self, writes: Vec<Write>) -> Result<(), StoreError>;

    /// Add a member to the set at `key`. Returns whether it was new.
    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    /// All members of the set at `key`, in sorted order.
    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// Remove a member from the set at `key`. Returns whether it was present.
    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    /// Publish a message. Returns the number of live subscribers reached.
    async fn publish(&self, channel: &str, message: Vec<u8>) -> Result<usize, StoreError>;

    /// Subscribe to a channel. Messages published after this call returns are
    /// delivered.
    async fn subscribe(&self, channel: &str) -> Result<Subscription, StoreError>;

    /// Drop expired entries. Returns how many were removed.
    async fn purge_expired(&self) -> Result<usize, StoreError>;
}

//! In-memory store backend.

use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{PubSubHub, Store, Subscription, Write};
use crate::{env::Environment, error::StoreError};

#[derive(Debug, Clone)]
enum Value {
    Bytes(Vec<u8>),
    Set(BTreeSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// Store backed by a `HashMap` behind an async mutex.
///
/// Expiry is evaluated against the environment clock on every access, so a
/// simulated clock advances TTLs deterministically.
#[derive(Debug, Clone)]
pub struct MemoryStore<E: Environment> {
    env: E,
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    hub: PubSubHub,
}

impl<E: Environment> MemoryStore<E> {
    /// Create an empty store.
    pub fn new(env: E) -> Self {
        Self { env, entries: Arc::new(Mutex::new(HashMap::new())), hub: PubSubHub::new() }
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = self.env.now();
        self.entries.lock().await.values().filter(|e| e.is_live(now)).count()
    }

    /// Whether the store has no live entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn deadline(&self, ttl: Option<Duration>) -> Option<Instant> {
        ttl.map(|ttl| self.env.now() + ttl)
    }
}

fn live<'a>(
    entries: &'a mut HashMap<String, Entry>,
    key: &str,
    now: Instant,
) -> Option<&'a mut Entry> {
    if entries.get(key).is_some_and(|e| !e.is_live(now)) {
        entries.remove(key);
    }
    entries.get_mut(key)
}

#[async_trait]
impl<E: Environment> Store for MemoryStore<E> {
    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let expires_at = self.deadline(ttl);
        self.entries
            .lock()
            .await
            .insert(key.to_owned(), Entry { value: Value::Bytes(value), expires_at });
        Ok(())
    }

    async fn set_nx(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let now = self.env.now();
        let expires_at = self.deadline(ttl);
        let mut entries = self.entries.lock().await;
        if live(&mut entries, key, now).is_some() {
            return Ok(false);
        }
        entries.insert(key.to_owned(), Entry { value: Value::Bytes(value), expires_at });
        Ok(true)
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: &[u8],
        value: Vec<u8>,
    ) -> Result<bool, StoreError> {
        let now = self.env.now();
        let mut entries = self.entries.lock().await;
        match live(&mut entries, key, now) {
            Some(Entry { value: Value::Bytes(current), .. }) if current.as_slice() == expected => {
                *current = value;
                Ok(true)
            },
            Some(Entry { value: Value::Set(_), .. }) => {
                Err(StoreError::WrongType { key: key.to_owned() })
            },
            _ => Ok(false),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let now = self.env.now();
        let mut entries = self.entries.lock().await;
        match live(&mut entries, key, now) {
            None => Ok(None),
            Some(Entry { value: Value::Bytes(bytes), .. }) => Ok(Some(bytes.clone())),
            Some(Entry { value: Value::Set(_), .. }) => {
                Err(StoreError::WrongType { key: key.to_owned() })
            },
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let now = self.env.now();
        let mut entries = self.entries.lock().await;
        Ok(entries.remove(key).is_some_and(|e| e.is_live(now)))
    }

    async fn apply(&self, writes: Vec<Write>) -> Result<(), StoreError> {
        let now = self.env.now();
        let mut entries = self.entries.lock().await;
        for write in writes {
            match write {
                Write::Put { key, value, ttl } => {
                    let expires_at = ttl.map(|ttl| now + ttl);
                    entries.insert(key, Entry { value: Value::Bytes(value), expires_at });
                },
                Write::Delete { key } => {
                    entries.remove(&key);
                },
            }
        }
        Ok(())
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let now = self.env.now();
        let mut entries = self.entries.lock().await;
        match live(&mut entries, key, now) {
            Some(Entry { value: Value::Set(members), .. }) => Ok(members.insert(member.to_owned())),
            Some(Entry { value: Value::Bytes(_), .. }) => {
                Err(StoreError::WrongType { key: key.to_owned() })
            },
            None => {
                let members = BTreeSet::from([member.to_owned()]);
                entries.insert(key.to_owned(), Entry { value: Value::Set(members), expires_at: None });
                Ok(true)
            },
        }
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let now = self.env.now();
        let mut entries = self.entries.lock().await;
        match live(&mut entries, key, now) {
            Some(Entry { value: Value::Set(members), .. }) => Ok(members.iter().cloned().collect()),
            Some(Entry { value: Value::Bytes(_), .. }) => {
                Err(StoreError::WrongType { key: key.to_owned() })
            },
            None => Ok(Vec::new()),
        }
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let now = self.env.now();
        let mut entries = self.entries.lock().await;
        let removed = match live(&mut entries, key, now) {
            Some(Entry { value: Value::Set(members), .. }) => {
                let removed = members.remove(member);
                if members.is_empty() {
                    entries.remove(key);
                }
                removed
            },
            Some(Entry { value: Value::Bytes(_), .. }) => {
                return Err(StoreError::WrongType { key: key.to_owned() });
            },
            None => false,
        };
        Ok(removed)
    }

    async fn publish(&self, channel: &str, message: Vec<u8>) -> Result<usize, StoreError> {
        Ok(self.hub.publish(channel, message).await)
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, StoreError> {
        Ok(self.hub.subscribe(channel).await)
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = self.env.now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        Ok(before - entries.len())
    }
}

use std::{
    collections::BTreeSet,
    path::Path,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use redb::{Database, ReadOnlyTable, ReadableTable, Table, TableDefinition};
use sealtalk_core::{
    StoreError, Subscription, Write,
    store::{PubSubHub, Store},
};
use serde::{Deserialize, Serialize};
use tracing::info;

const KV: TableDefinition<&str, &[u8]> = TableDefinition::new("kv");

type KvTable<'txn> = Table<'txn, &'static str, &'static [u8]>;

type KvSnapshot = ReadOnlyTable<&'static str, &'static [u8]>;

/// Wall clock in milliseconds since the Unix epoch.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

#[derive(Debug, Serialize, Deserialize)]
enum StoredValue {
    Bytes(#[serde(with = "serde_bytes")] Vec<u8>),
    Set(BTreeSet<String>),
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    expires_at_ms: Option<u64>,
    value: StoredValue,
}

impl StoredEntry {
    fn is_live(&self, now: u64) -> bool {
        self.expires_at_ms.is_none_or(|at| at > now)
    }
}

fn backend(e: impl Into<redb::Error>) -> StoreError {
    StoreError::Backend(e.into().to_string())
}

fn system_clock() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

fn deadline(now: u64, ttl: Option<Duration>) -> Option<u64> {
    ttl.map(|ttl| now.saturating_add(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)))
}

fn load(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
    key: &str,
    now: u64,
) -> Result<Option<StoredEntry>, StoreError> {
    let Some(guard) = table.get(key).map_err(backend)? else {
        return Ok(None);
    };
    let entry: StoredEntry = ciborium::de::from_reader(guard.value())
        .map_err(|e| StoreError::Codec(e.to_string()))?;
    Ok(entry.is_live(now).then_some(entry))
}

fn save(table: &mut KvTable<'_>, key: &str, entry: &StoredEntry) -> Result<(), StoreError> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(entry, &mut bytes).map_err(|e| StoreError::Codec(e.to_string()))?;
    table.insert(key, bytes.as_slice()).map_err(backend)?;
    Ok(())
}

fn remove(table: &mut KvTable<'_>, key: &str) -> Result<bool, StoreError> {
    Ok(table.remove(key).map_err(backend)?.is_some())
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::WrongType { key: key.to_owned() }
}

/// Store persisted in a `redb` database file.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
    clock: Clock,
    hub: PubSubHub,
}

impl RedbStore {
    /// Open or create the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with_clock(path, Arc::new(system_clock))
    }

    /// Open with an explicit clock for expiry.
    pub fn open_with_clock(path: impl AsRef<Path>, clock: Clock) -> Result<Self, StoreError> {
        let db = Database::create(path.as_ref()).map_err(backend)?;

        let txn = db.begin_write().map_err(backend)?;
        txn.open_table(KV).map_err(backend)?;
        txn.commit().map_err(backend)?;

        info!(path = %path.as_ref().display(), "store opened");
        Ok(Self { db: Arc::new(db), clock, hub: PubSubHub::new() })
    }

    async fn transact<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut KvTable<'_>, u64) -> Result<T, StoreError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        let now = (self.clock)();

        tokio::task::spawn_blocking(move || {
            let txn = db.begin_write().map_err(backend)?;
            let out = {
                let mut table = txn.open_table(KV).map_err(backend)?;
                op(&mut table, now)?
            };
            txn.commit().map_err(backend)?;
            Ok(out)
        })
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?
    }

    /// Runs `op` against a read snapshot; expired entries are skipped, not removed.
    async fn read<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&KvSnapshot, u64) -> Result<T, StoreError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        let now = (self.clock)();

        tokio::task::spawn_blocking(move || {
            let txn = db.begin_read().map_err(backend)?;
            let table = txn.open_table(KV).map_err(backend)?;
            op(&table, now)
        })
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?
    }
}

#[async_trait]
impl Store for RedbStore {
    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let key = key.to_owned();
        self.transact(move |table, now| {
            let entry =
                StoredEntry { expires_at_ms: deadline(now, ttl), value: StoredValue::Bytes(value) };
            save(table, &key, &entry)
        })
        .await
    }

    async fn set_nx(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let key = key.to_owned();
        self.transact(move |table, now| {
            if load(table, &key, now)?.is_some() {
                return Ok(false);
            }
            let entry =
                StoredEntry { expires_at_ms: deadline(now, ttl), value: StoredValue::Bytes(value) };
            save(table, &key, &entry)?;
            Ok(true)
        })
        .await
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: &[u8],
        value: Vec<u8>,
    ) -> Result<bool, StoreError> {
        let key = key.to_owned();
        let expected = expected.to_vec();
        self.transact(move |table, now| match load(table, &key, now)? {
            Some(StoredEntry { expires_at_ms, value: StoredValue::Bytes(current) })
                if current == expected =>
            {
                save(table, &key, &StoredEntry { expires_at_ms, value: StoredValue::Bytes(value) })?;
                Ok(true)
            },
            Some(StoredEntry { value: StoredValue::Set(_), .. }) => Err(wrong_type(&key)),
            _ => Ok(false),
        })
        .await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let key = key.to_owned();
        self.read(move |table, now| match load(table, &key, now)? {
            None => Ok(None),
            Some(StoredEntry { value: StoredValue::Bytes(bytes), .. }) => Ok(Some(bytes)),
            Some(StoredEntry { value: StoredValue::Set(_), .. }) => Err(wrong_type(&key)),
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let key = key.to_owned();
        self.transact(move |table, now| {
            let existed = load(table, &key, now)?.is_some();
            remove(table, &key)?;
            Ok(existed)
        })
        .await
    }

    async fn apply(&self, writes: Vec<Write>) -> Result<(), StoreError> {
        self.transact(move |table, now| {
            for write in writes {
                match write {
                    Write::Put { key, value, ttl } => {
                        let entry = StoredEntry {
                            expires_at_ms: deadline(now, ttl),
                            value: StoredValue::Bytes(value),
                        };
                        save(table, &key, &entry)?;
                    },
                    Write::Delete { key } => {
                        remove(table, &key)?;
                    },
                }
            }
            Ok(())
        })
        .await
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let key = key.to_owned();
        let member = member.to_owned();
        self.transact(move |table, now| {
            let mut members = match load(table, &key, now)? {
                None => BTreeSet::new(),
                Some(StoredEntry { value: StoredValue::Set(members), .. }) => members,
                Some(StoredEntry { value: StoredValue::Bytes(_), .. }) => {
                    return Err(wrong_type(&key));
                },
            };
            let added = members.insert(member);
            save(table, &key, &StoredEntry { expires_at_ms: None, value: StoredValue::Set(members) })?;
            Ok(added)
        })
        .await
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let key = key.to_owned();
        self.read(move |table, now| match load(table, &key, now)? {
            None => Ok(Vec::new()),
            Some(StoredEntry { value: StoredValue::Set(members), .. }) => {
                Ok(members.into_iter().collect())
            },
            Some(StoredEntry { value: StoredValue::Bytes(_), .. }) => Err(wrong_type(&key)),
        })
        .await
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let key = key.to_owned();
        let member = member.to_owned();
        self.transact(move |table, now| {
            let mut members = match load(table, &key, now)? {
                None => return Ok(false),
                Some(StoredEntry { value: StoredValue::Set(members), .. }) => members,
                Some(StoredEntry { value: StoredValue::Bytes(_), .. }) => {
                    return Err(wrong_type(&key));
                },
            };
            let removed = members.remove(&member);
            if members.is_empty() {
                remove(table, &key)?;
            } else {
                save(table, &key, &StoredEntry { expires_at_ms: None, value: StoredValue::Set(members) })?;
            }
            Ok(removed)
        })
        .await
    }

    async fn publish(&self, channel: &str, message: Vec<u8>) -> Result<usize, StoreError> {
        Ok(self.hub.publish(channel, message).await)
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, StoreError> {
        Ok(self.hub.subscribe(channel).await)
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        self.transact(move |table, now| {
            let mut expired = Vec::new();
            for item in table.iter().map_err(backend)? {
                let (key, value) = item.map_err(backend)?;
                let entry: StoredEntry = ciborium::de::from_reader(value.value())
                    .map_err(|e| StoreError::Codec(e.to_string()))?;
                if !entry.is_live(now) {
                    expired.push(key.value().to_owned());
                }
            }
            for key in &expired {
                remove(table, key)?;
            }
            Ok(expired.len())
        })
        .await
    }
}

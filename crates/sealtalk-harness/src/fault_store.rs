//! Store wrapper that injects backend failures.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use sealtalk_core::{SharedStore, Store, StoreError, Subscription, Write};
use tracing::debug;

#[derive(Debug)]
struct Fault {
    prefix: String,
    remaining: usize,
}

#[derive(Debug, Default)]
struct Faults {
    writes: Vec<Fault>,
    reads: Vec<Fault>,
    dropped_channels: Vec<String>,
    injected: usize,
}

/// Consume one matching fault, if any.
fn trip(faults: &mut Vec<Fault>, key: &str) -> bool {
    let Some(fault) = faults.iter_mut().find(|f| f.remaining > 0 && key.starts_with(&f.prefix))
    else {
        return false;
    };
    fault.remaining -= 1;
    true
}

/// [`Store`] decorator failing selected operations.
///
/// Faults match keys by prefix and fire a fixed number of times. Failed
/// operations have no effect on the inner store.
#[derive(Clone)]
pub struct FaultStore {
    inner: SharedStore,
    faults: Arc<Mutex<Faults>>,
}

impl FaultStore {
    /// Wrap `inner`.
    pub fn new(inner: SharedStore) -> Self {
        Self { inner, faults: Arc::default() }
    }

    /// Fail the next `times` writes to keys starting with `prefix`.
    pub fn fail_writes(&self, prefix: impl Into<String>, times: usize) {
        self.faults().writes.push(Fault { prefix: prefix.into(), remaining: times });
    }

    /// Fail the next `times` reads of keys starting with `prefix`.
    pub fn fail_reads(&self, prefix: impl Into<String>, times: usize) {
        self.faults().reads.push(Fault { prefix: prefix.into(), remaining: times });
    }

    /// Silently drop every publish to channels starting with `prefix`.
    pub fn drop_publishes(&self, prefix: impl Into<String>) {
        self.faults().dropped_channels.push(prefix.into());
    }

    /// Number of faults fired so far.
    pub fn injected(&self) -> usize {
        self.faults().injected
    }

    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_write<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Result<(), StoreError> {
        let mut faults = self.faults();
        for key in keys {
            if trip(&mut faults.writes, key) {
                faults.injected += 1;
                debug!(key, "injected write fault");
                return Err(StoreError::Backend(format!("injected write fault on {key}")));
            }
        }
        Ok(())
    }

    fn check_read(&self, key: &str) -> Result<(), StoreError> {
        let mut faults = self.faults();
        if trip(&mut faults.reads, key) {
            faults.injected += 1;
            debug!(key, "injected read fault");
            return Err(StoreError::Backend(format!("injected read fault on {key}")));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for FaultStore {
    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        self.check_write([key])?;
        self.inner.set(key, value, ttl).await
    }

    async fn set_nx(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        self.check_write([key])?;
        self.inner.set_nx(key, value, ttl).await
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: &[u8],
        value: Vec<u8>,
    ) -> Result<bool, StoreError> {
        self.check_write([key])?;
        self.inner.compare_and_set(key, expected, value).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.check_read(key)?;
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.check_write([key])?;
        self.inner.delete(key).await
    }

    async fn apply(&self, writes: Vec<Write>) -> Result<(), StoreError> {
        self.check_write(writes.iter().map(|write| match write {
            Write::Put { key, .. } | Write::Delete { key } => key.as_str(),
        }))?;
        self.inner.apply(writes).await
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.check_write([key])?;
        self.inner.set_add(key, member).await
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.check_read(key)?;
        self.inner.set_members(key).await
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.check_write([key])?;
        self.inner.set_remove(key, member).await
    }

    async fn publish(&self, channel: &str, message: Vec<u8>) -> Result<usize, StoreError> {
        let dropped = self.faults().dropped_channels.iter().any(|p| channel.starts_with(p));
        if dropped {
            debug!(channel, "dropped publish");
            return Ok(0);
        }
        self.inner.publish(channel, message).await
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, StoreError> {
        self.inner.subscribe(channel).await
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        self.inner.purge_expired().await
    }
}

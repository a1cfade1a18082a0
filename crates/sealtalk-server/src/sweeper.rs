//! Background purge of expired store entries.
//!
//! Reads already ignore expired entries; the sweeper only reclaims space.

use std::time::Duration;

use sealtalk_core::SharedStore;
use tokio::{task::JoinHandle, time};
use tracing::{debug, error};

/// Purge expired entries every `every` until the handle is aborted.
pub fn spawn_sweeper(store: SharedStore, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(every);
        loop {
            interval.tick().await;
            match store.purge_expired().await {
                Ok(0) => {},
                Ok(purged) => debug!(purged, "expired entries purged"),
                Err(e) => error!(error = %e, "sweep failed"),
            }
        }
    })
}

//! Persistent store backend.
//!
//! [`RedbStore`] keeps every entry in one `redb` table. Each store call runs
//! in a single write transaction on the blocking pool, which makes every call
//! (and every batch) atomic. Publish/subscribe is process-local.

mod redb_store;

pub use redb_store::RedbStore;

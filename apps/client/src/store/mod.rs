//! Local and remote store adapters.

pub mod error;
pub mod http;
pub mod memory;
pub mod remote;
pub mod schema;
pub mod sqlite;

use std::sync::{Arc, Mutex};

use review_core::{HistoryRecord, ItemKey, ScheduleEntry};
use uuid::Uuid;

pub use error::StoreError;
pub use http::HttpRemoteStore;
pub use memory::MemoryRemoteStore;
pub use remote::{DisabledRemote, RemoteResult, RemoteStore, RemoteUnavailable};
pub use sqlite::SqliteStore;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Local store shared between the service, reconciler and history log.
pub type SharedStore = Arc<Mutex<SqliteStore>>;

/// Wrap a store for sharing.
pub fn shared(store: SqliteStore) -> SharedStore {
    Arc::new(Mutex::new(store))
}

/// Run `f` against the locked local store.
pub(crate) fn with_store<T>(
    store: &SharedStore,
    f: impl FnOnce(&SqliteStore) -> Result<T>,
) -> Result<T> {
    let guard = store.lock().map_err(|_| StoreError::Poisoned)?;
    f(&guard)
}

/// Schedule entry persistence.
pub trait ScheduleRepository {
    fn get_entry(&self, key: &ItemKey) -> Result<Option<ScheduleEntry>>;
    fn upsert_entry(&self, entry: &ScheduleEntry) -> Result<()>;
    fn upsert_entries(&self, entries: &[ScheduleEntry]) -> Result<usize>;
    fn list_entries(&self) -> Result<Vec<ScheduleEntry>>;
    /// Returns whether a row was removed.
    fn delete_entry(&self, key: &ItemKey) -> Result<bool>;
    /// Delete every entry whose key starts with `prefix` (all when `None`).
    fn delete_entries(&self, prefix: Option<&str>) -> Result<usize>;
}

/// Category history persistence.
pub trait HistoryRepository {
    /// Insert unless a record with the same id already exists.
    fn append_history(&self, record: &HistoryRecord, synced: bool) -> Result<()>;
    /// Newest first.
    fn list_history(&self, item: Option<&ItemKey>, limit: Option<usize>)
        -> Result<Vec<HistoryRecord>>;
    /// Records not yet pushed to the remote store, oldest first.
    fn pending_history(&self) -> Result<Vec<HistoryRecord>>;
    fn mark_history_synced(&self, ids: &[Uuid]) -> Result<()>;
    fn clear_history(&self, prefix: Option<&str>) -> Result<usize>;
}

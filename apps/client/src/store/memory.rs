//! In-process remote store.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use review_core::{HistoryRecord, ItemKey, ScheduleEntry};

use super::remote::{RemoteResult, RemoteStore, RemoteUnavailable};
use crate::identity::Identity;

/// Number of calls received, by operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteCalls {
    pub list_all: usize,
    pub upserts: usize,
    pub history_appends: usize,
    pub total: usize,
}

struct MemoryState {
    available: bool,
    entries: BTreeMap<(String, ItemKey), ScheduleEntry>,
    history: HashMap<String, Vec<HistoryRecord>>,
    failing_upserts: HashSet<ItemKey>,
    calls: RemoteCalls,
}

/// Remote store kept in memory and keyed by `(identity, item)`.
///
/// Availability can be switched off and upserts of chosen keys can be made
/// to fail, to exercise the soft-failure paths.
pub struct MemoryRemoteStore {
    state: Mutex<MemoryState>,
    latency: Option<Duration>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                available: true,
                entries: BTreeMap::new(),
                history: HashMap::new(),
                failing_upserts: HashSet::new(),
                calls: RemoteCalls::default(),
            }),
            latency: None,
        }
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_available(&self, available: bool) {
        self.lock().available = available;
    }

    /// Make upserts of `key` fail until [`clear_failures`](Self::clear_failures).
    pub fn fail_upserts_for(&self, key: ItemKey) {
        self.lock().failing_upserts.insert(key);
    }

    pub fn clear_failures(&self) {
        self.lock().failing_upserts.clear();
    }

    /// Store entries for `identity` directly, bypassing call accounting.
    pub fn seed(&self, identity: &Identity, entries: impl IntoIterator<Item = ScheduleEntry>) {
        let mut state = self.lock();
        for entry in entries {
            state
                .entries
                .insert((identity.id.clone(), entry.item_key.clone()), entry);
        }
    }

    pub fn entries_for(&self, identity: &Identity) -> Vec<ScheduleEntry> {
        self.lock()
            .entries
            .iter()
            .filter(|((owner, _), _)| *owner == identity.id)
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    pub fn history_for(&self, identity: &Identity) -> Vec<HistoryRecord> {
        self.lock()
            .history
            .get(&identity.id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn calls(&self) -> RemoteCalls {
        self.lock().calls.clone()
    }

    /// Simulated round trip; fails when the store is switched off.
    async fn begin(&self, count: impl FnOnce(&mut RemoteCalls)) -> RemoteResult<()> {
        {
            let mut state = self.lock();
            state.calls.total += 1;
            count(&mut state.calls);
        }

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if self.lock().available {
            Ok(())
        } else {
            Err(RemoteUnavailable::Offline)
        }
    }
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

fn owned_with_prefix(owner: &str, key: &ItemKey, identity: &Identity, prefix: Option<&str>) -> bool {
    owner == identity.id && prefix.map_or(true, |p| key.has_prefix(p))
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn get(&self, identity: &Identity, key: &ItemKey) -> RemoteResult<Option<ScheduleEntry>> {
        self.begin(|_| {}).await?;
        Ok(self
            .lock()
            .entries
            .get(&(identity.id.clone(), key.clone()))
            .cloned())
    }

    async fn upsert(&self, identity: &Identity, entry: &ScheduleEntry) -> RemoteResult<()> {
        self.begin(|calls| calls.upserts += 1).await?;
        let mut state = self.lock();
        if state.failing_upserts.contains(&entry.item_key) {
            return Err(RemoteUnavailable::Status {
                status: 503,
                message: format!("upsert of {} failed", entry.item_key),
            });
        }
        state
            .entries
            .insert((identity.id.clone(), entry.item_key.clone()), entry.clone());
        Ok(())
    }

    async fn list_all(&self, identity: &Identity) -> RemoteResult<Vec<ScheduleEntry>> {
        self.begin(|calls| calls.list_all += 1).await?;
        Ok(self.entries_for(identity))
    }

    async fn list_due_between(
        &self,
        identity: &Identity,
        from: Option<DateTime<Utc>>,
        until: DateTime<Utc>,
    ) -> RemoteResult<Vec<ScheduleEntry>> {
        self.begin(|_| {}).await?;
        Ok(self
            .entries_for(identity)
            .into_iter()
            .filter(|entry| {
                entry.next_review_at.is_some_and(|next| {
                    next <= until && from.map_or(true, |from| next >= from)
                })
            })
            .collect())
    }

    async fn delete(&self, identity: &Identity, key: &ItemKey) -> RemoteResult<bool> {
        self.begin(|_| {}).await?;
        Ok(self
            .lock()
            .entries
            .remove(&(identity.id.clone(), key.clone()))
            .is_some())
    }

    async fn delete_all(&self, identity: &Identity, prefix: Option<&str>) -> RemoteResult<usize> {
        self.begin(|_| {}).await?;
        let mut state = self.lock();
        let before = state.entries.len();
        state
            .entries
            .retain(|(owner, key), _| !owned_with_prefix(owner, key, identity, prefix));
        Ok(before - state.entries.len())
    }

    async fn append_history(
        &self,
        identity: &Identity,
        records: &[HistoryRecord],
    ) -> RemoteResult<usize> {
        self.begin(|calls| calls.history_appends += 1).await?;
        let mut state = self.lock();
        let stored = state.history.entry(identity.id.clone()).or_default();
        let mut inserted = 0;
        for record in records {
            if !stored.iter().any(|existing| existing.id == record.id) {
                stored.push(record.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn list_history(
        &self,
        identity: &Identity,
        item: Option<&ItemKey>,
        limit: Option<usize>,
    ) -> RemoteResult<Vec<HistoryRecord>> {
        self.begin(|_| {}).await?;
        let mut records: Vec<HistoryRecord> = self
            .history_for(identity)
            .into_iter()
            .filter(|record| item.map_or(true, |key| record.item_key == *key))
            .collect();
        records.sort_by(|a, b| b.changed_at.cmp(&a.changed_at));
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    async fn clear_history(
        &self,
        identity: &Identity,
        prefix: Option<&str>,
    ) -> RemoteResult<usize> {
        self.begin(|_| {}).await?;
        let mut state = self.lock();
        let Some(stored) = state.history.get_mut(&identity.id) else {
            return Ok(0);
        };
        let before = stored.len();
        stored.retain(|record| prefix.is_some_and(|p| !record.item_key.has_prefix(p)));
        Ok(before - stored.len())
    }
}

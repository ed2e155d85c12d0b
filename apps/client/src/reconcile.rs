//! Session reconciliation between the local and remote stores.
//!
//! Runs once per sign-in transition. Local and remote entries are unioned by
//! item key with the remote copy winning any collision. Local-only entries
//! are pushed to the remote store, and the merged view is kept in a session
//! cache until the next reconciliation.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use review_core::{ItemKey, ScheduleEntry};
use tracing::{debug, info, warn};

use crate::identity::Identity;
use crate::store::remote::{with_timeout, RemoteResult};
use crate::store::{with_store, HistoryRepository, RemoteStore, ScheduleRepository, SharedStore};

/// Where the session view came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewSource {
    /// No identity, or the remote store could not be listed.
    LocalOnly,
    /// Union of local and remote entries.
    Merged,
}

/// Counts from one reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub source: ViewSource,
    /// Entries in the resulting session view.
    pub merged: usize,
    pub remote_only: usize,
    pub local_only: usize,
    pub backfilled: usize,
    pub backfill_failures: usize,
    pub history_pushed: usize,
}

impl ReconcileReport {
    fn local_only_view(entries: usize) -> Self {
        Self {
            source: ViewSource::LocalOnly,
            merged: entries,
            remote_only: 0,
            local_only: 0,
            backfilled: 0,
            backfill_failures: 0,
            history_pushed: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Completed(ReconcileReport),
    /// Another reconciliation was running; this call did nothing.
    AlreadyInProgress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileStatus {
    Idle,
    Running,
}

/// Merged view for the current session.
#[derive(Debug, Default)]
struct SessionCache {
    loaded: bool,
    identity: Option<Identity>,
    entries: HashMap<ItemKey, ScheduleEntry>,
}

/// Resets the status to idle when a run ends, including on cancellation.
struct RunGuard<'a> {
    status: &'a Mutex<ReconcileStatus>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = ReconcileStatus::Idle;
    }
}

pub struct Reconciler {
    local: SharedStore,
    remote: Arc<dyn RemoteStore>,
    remote_timeout: Duration,
    status: Mutex<ReconcileStatus>,
    cache: RwLock<SessionCache>,
}

impl Reconciler {
    pub fn new(local: SharedStore, remote: Arc<dyn RemoteStore>, remote_timeout: Duration) -> Self {
        Self {
            local,
            remote,
            remote_timeout,
            status: Mutex::new(ReconcileStatus::Idle),
            cache: RwLock::new(SessionCache::default()),
        }
    }

    pub fn status(&self) -> ReconcileStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self) -> Option<RunGuard<'_>> {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        if *status == ReconcileStatus::Running {
            return None;
        }
        *status = ReconcileStatus::Running;
        Some(RunGuard {
            status: &self.status,
        })
    }

    /// Build the session view for `identity` and install it in the cache.
    ///
    /// Never fails: an unreadable local store gives an empty view and an
    /// unavailable remote gives the local-only view.
    pub async fn reconcile(&self, identity: Option<&Identity>) -> ReconcileOutcome {
        let Some(_guard) = self.begin() else {
            debug!("reconciliation already running, ignoring request");
            return ReconcileOutcome::AlreadyInProgress;
        };

        let report = match identity {
            None => self.load_local_view(),
            Some(identity) => self.merge(identity).await,
        };

        info!(
            source = ?report.source,
            merged = report.merged,
            remote_only = report.remote_only,
            local_only = report.local_only,
            backfilled = report.backfilled,
            backfill_failures = report.backfill_failures,
            history_pushed = report.history_pushed,
            "reconciliation finished"
        );
        ReconcileOutcome::Completed(report)
    }

    fn local_entries(&self) -> Vec<ScheduleEntry> {
        match with_store(&self.local, |store| store.list_entries()) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(error = %err, "local store unreadable, starting from an empty view");
                Vec::new()
            }
        }
    }

    fn load_local_view(&self) -> ReconcileReport {
        let entries = self.local_entries();
        let count = entries.len();
        self.install(None, entries);
        ReconcileReport::local_only_view(count)
    }

    async fn merge(&self, identity: &Identity) -> ReconcileReport {
        let remote_entries =
            match with_timeout(self.remote_timeout, self.remote.list_all(identity)).await {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(error = %err, "remote store unavailable, using local view");
                    return self.load_local_view();
                }
            };
        let local_entries = self.local_entries();

        let remote_keys: HashSet<&ItemKey> = remote_entries.iter().map(|e| &e.item_key).collect();
        let local_only: Vec<ScheduleEntry> = local_entries
            .iter()
            .filter(|entry| !remote_keys.contains(&entry.item_key))
            .cloned()
            .collect();

        let local_by_key: HashMap<&ItemKey, &ScheduleEntry> =
            local_entries.iter().map(|e| (&e.item_key, e)).collect();
        let remote_only = remote_entries
            .iter()
            .filter(|entry| !local_by_key.contains_key(&entry.item_key))
            .count();

        // Remote copies that differ from (or are missing in) the local store.
        let remote_winners: Vec<ScheduleEntry> = remote_entries
            .iter()
            .filter(|entry| local_by_key.get(&entry.item_key).copied() != Some(*entry))
            .cloned()
            .collect();

        let mut merged: HashMap<ItemKey, ScheduleEntry> = local_entries
            .iter()
            .map(|entry| (entry.item_key.clone(), entry.clone()))
            .collect();
        for entry in &remote_entries {
            merged.insert(entry.item_key.clone(), entry.clone());
        }
        let merged_count = merged.len();
        self.install_map(Some(identity.clone()), merged);

        if !remote_winners.is_empty() {
            if let Err(err) = with_store(&self.local, |store| store.upsert_entries(&remote_winners)) {
                warn!(error = %err, "failed to mirror remote entries locally");
            }
        }

        let mut backfilled = 0;
        let mut backfill_failures = 0;
        for entry in &local_only {
            match self.backfill(identity, &entry.item_key).await {
                Ok(true) => backfilled += 1,
                Ok(false) => debug!(item_key = %entry.item_key, "removed before backfill"),
                Err(err) => {
                    backfill_failures += 1;
                    warn!(item_key = %entry.item_key, error = %err, "backfill failed");
                }
            }
        }

        ReconcileReport {
            source: ViewSource::Merged,
            merged: merged_count,
            remote_only,
            local_only: local_only.len(),
            backfilled,
            backfill_failures,
            history_pushed: self.push_pending_history(identity).await,
        }
    }

    /// Push the session copy of `key` to the remote store. The view is
    /// already published, so a review recorded while the upsert is in
    /// flight may land first; the newer cached copy is pushed again until
    /// the remote holds what the cache holds. `Ok(false)` when the entry
    /// was reset in the meantime.
    async fn backfill(&self, identity: &Identity, key: &ItemKey) -> RemoteResult<bool> {
        let Some(mut pushed) = self.cached(key) else {
            return Ok(false);
        };
        loop {
            with_timeout(self.remote_timeout, self.remote.upsert(identity, &pushed)).await?;
            match self.cached(key) {
                Some(current) if current != pushed => pushed = current,
                _ => return Ok(true),
            }
        }
    }

    async fn push_pending_history(&self, identity: &Identity) -> usize {
        let pending = match with_store(&self.local, |store| store.pending_history()) {
            Ok(pending) => pending,
            Err(err) => {
                warn!(error = %err, "could not read pending history");
                return 0;
            }
        };
        if pending.is_empty() {
            return 0;
        }

        match with_timeout(
            self.remote_timeout,
            self.remote.append_history(identity, &pending),
        )
        .await
        {
            Ok(_) => {
                let ids: Vec<_> = pending.iter().map(|record| record.id).collect();
                if let Err(err) = with_store(&self.local, |store| store.mark_history_synced(&ids)) {
                    warn!(error = %err, "could not mark history synced");
                }
                pending.len()
            }
            Err(err) => {
                warn!(error = %err, pending = pending.len(), "history backfill failed");
                0
            }
        }
    }

    fn install(&self, identity: Option<Identity>, entries: Vec<ScheduleEntry>) {
        let map = entries
            .into_iter()
            .map(|entry| (entry.item_key.clone(), entry))
            .collect();
        self.install_map(identity, map);
    }

    fn install_map(&self, identity: Option<Identity>, entries: HashMap<ItemKey, ScheduleEntry>) {
        let mut cache = self.write_cache();
        cache.loaded = true;
        cache.identity = identity;
        cache.entries = entries;
    }

    fn read_cache(&self) -> RwLockReadGuard<'_, SessionCache> {
        self.cache.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_cache(&self) -> RwLockWriteGuard<'_, SessionCache> {
        self.cache.write().unwrap_or_else(PoisonError::into_inner)
    }

    // === Session cache ===

    /// Whether a reconciliation has installed a view yet.
    pub fn is_loaded(&self) -> bool {
        self.read_cache().loaded
    }

    /// Identity the current view was merged for. `None` when the session is
    /// local-only, including after a remote failure during reconciliation.
    pub fn session_identity(&self) -> Option<Identity> {
        self.read_cache().identity.clone()
    }

    pub fn cached(&self, key: &ItemKey) -> Option<ScheduleEntry> {
        self.read_cache().entries.get(key).cloned()
    }

    pub fn cache_insert(&self, entry: ScheduleEntry) {
        self.write_cache()
            .entries
            .insert(entry.item_key.clone(), entry);
    }

    pub fn cache_remove_prefix(&self, prefix: Option<&str>) -> usize {
        let mut cache = self.write_cache();
        let before = cache.entries.len();
        match prefix {
            Some(prefix) => cache.entries.retain(|key, _| !key.has_prefix(prefix)),
            None => cache.entries.clear(),
        }
        before - cache.entries.len()
    }

    /// Every entry in the session view, in key order.
    pub fn snapshot(&self) -> Vec<ScheduleEntry> {
        let mut entries: Vec<ScheduleEntry> = self.read_cache().entries.values().cloned().collect();
        entries.sort_by(|a, b| a.item_key.cmp(&b.item_key));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{shared, MemoryRemoteStore, SqliteStore};
    use chrono::Utc;
    use review_core::{schedule_review, Difficulty};

    fn reconciler(remote: Arc<MemoryRemoteStore>) -> (Reconciler, SharedStore) {
        let local = shared(SqliteStore::open_in_memory().unwrap());
        let reconciler = Reconciler::new(local.clone(), remote, Duration::from_secs(1));
        (reconciler, local)
    }

    #[tokio::test]
    async fn cache_starts_unloaded() {
        let (reconciler, _) = reconciler(Arc::new(MemoryRemoteStore::new()));
        assert!(!reconciler.is_loaded());
        assert!(reconciler.snapshot().is_empty());

        reconciler.reconcile(None).await;
        assert!(reconciler.is_loaded());
        assert_eq!(reconciler.session_identity(), None);
    }

    #[tokio::test]
    async fn running_status_rejects_second_run() {
        let (reconciler, _) = reconciler(Arc::new(MemoryRemoteStore::new()));
        let guard = reconciler.begin();
        assert!(guard.is_some());
        assert_eq!(reconciler.status(), ReconcileStatus::Running);
        assert_eq!(
            reconciler.reconcile(None).await,
            ReconcileOutcome::AlreadyInProgress
        );

        drop(guard);
        assert_eq!(reconciler.status(), ReconcileStatus::Idle);
    }

    #[tokio::test]
    async fn remote_winners_are_mirrored_locally() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let identity = Identity::new("learner", "token");
        let now = Utc::now();
        let remote_entry = schedule_review(None, &ItemKey::word("arbre"), Difficulty::Hard, now);
        remote.seed(&identity, [remote_entry.clone()]);

        let (reconciler, local) = reconciler(remote);
        reconciler.reconcile(Some(&identity)).await;

        let stored = with_store(&local, |s| s.get_entry(&remote_entry.item_key)).unwrap();
        assert_eq!(stored, Some(remote_entry));
    }

    #[test]
    fn removing_by_prefix_only_touches_matching_keys() {
        let (reconciler, _) = reconciler(Arc::new(MemoryRemoteStore::new()));
        let now = Utc::now();
        reconciler.cache_insert(schedule_review(None, &ItemKey::lesson("a"), Difficulty::NotRated, now));
        reconciler.cache_insert(schedule_review(None, &ItemKey::word("b"), Difficulty::Easy, now));

        assert_eq!(reconciler.cache_remove_prefix(Some("lesson:")), 1);
        assert_eq!(reconciler.snapshot().len(), 1);
        assert_eq!(reconciler.cache_remove_prefix(None), 1);
    }
}

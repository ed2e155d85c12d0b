//! Schedule service: mutations and due queries over the session view.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use review_core::{
    schedule_restart, schedule_review, Difficulty, HistoryRecord, ItemKey, ItemKind,
    ScheduleEntry,
};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::history::{ClearedHistory, HistoryLog};
use crate::identity::{Identity, IdentityHandle};
use crate::reconcile::{ReconcileOutcome, Reconciler};
use crate::store::remote::with_timeout;
use crate::store::{with_store, RemoteStore, ScheduleRepository, SharedStore};

const RETRY_DELAY: Duration = Duration::from_millis(50);

/// `now + window`, saturating at the latest representable instant.
fn horizon(now: DateTime<Utc>, window: ChronoDuration) -> DateTime<Utc> {
    now.checked_add_signed(window)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Which items a due query considers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DueFilter {
    #[default]
    All,
    Kind(ItemKind),
    Keys(HashSet<ItemKey>),
}

impl DueFilter {
    fn matches(&self, key: &ItemKey) -> bool {
        match self {
            DueFilter::All => true,
            DueFilter::Kind(kind) => key.kind() == *kind,
            DueFilter::Keys(keys) => keys.contains(key),
        }
    }
}

/// What [`ScheduleService::reset_all`] removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetReport {
    pub local_entries: usize,
    /// `None` when signed out or the remote store was not reached.
    pub remote_entries: Option<usize>,
    pub history: ClearedHistory,
}

struct ServiceInner {
    local: SharedStore,
    remote: Arc<dyn RemoteStore>,
    identity: IdentityHandle,
    clock: Arc<dyn Clock>,
    remote_timeout: Duration,
    reconciler: Reconciler,
    history: HistoryLog,
}

/// Review scheduling for one device.
///
/// Writes go to the local store first and then, when the session has an
/// identity, to the remote store. Remote failures are logged and never
/// undo or fail the local write.
#[derive(Clone)]
pub struct ScheduleService {
    inner: Arc<ServiceInner>,
}

impl ScheduleService {
    pub fn new(
        local: SharedStore,
        remote: Arc<dyn RemoteStore>,
        identity: IdentityHandle,
        config: &ClientConfig,
    ) -> Self {
        Self::with_clock(local, remote, identity, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        local: SharedStore,
        remote: Arc<dyn RemoteStore>,
        identity: IdentityHandle,
        config: &ClientConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let remote_timeout = config.remote_timeout;
        Self {
            inner: Arc::new(ServiceInner {
                reconciler: Reconciler::new(local.clone(), remote.clone(), remote_timeout),
                history: HistoryLog::new(local.clone(), remote.clone(), remote_timeout),
                local,
                remote,
                identity,
                clock,
                remote_timeout,
            }),
        }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.inner.reconciler
    }

    fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    // === Session ===

    /// Reconcile for the identity currently signed in.
    pub async fn load(&self) -> ReconcileOutcome {
        let identity = self.inner.identity.current();
        self.inner.reconciler.reconcile(identity.as_ref()).await
    }

    /// Switch the session to `identity`: sign-in merges with the remote
    /// store, sign-out falls back to the local view.
    pub async fn on_identity_change(&self, identity: Option<Identity>) -> ReconcileOutcome {
        debug!(identity = ?identity.as_ref().map(|i| &i.id), "identity changed");
        self.inner.reconciler.reconcile(identity.as_ref()).await
    }

    /// Follow sign-in/out transitions on a background task.
    ///
    /// The task runs until aborted. A transition arriving while a
    /// reconciliation is running is retried once that run finishes.
    pub fn spawn_identity_listener(&self) -> JoinHandle<()> {
        let service = self.clone();
        let mut changes = self.inner.identity.subscribe();

        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                loop {
                    let identity = changes.borrow_and_update().clone();
                    match service.on_identity_change(identity).await {
                        ReconcileOutcome::Completed(_) => break,
                        ReconcileOutcome::AlreadyInProgress => {
                            tokio::time::sleep(RETRY_DELAY).await
                        }
                    }
                }
            }
        })
    }

    /// Load the session view unless one is installed. Waits out a
    /// reconciliation that is already running.
    async fn ensure_loaded(&self) {
        while !self.inner.reconciler.is_loaded() {
            if self.load().await == ReconcileOutcome::AlreadyInProgress {
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
    }

    // === Mutations ===

    /// Complete a review of `key` rated `category`.
    pub async fn record_review(&self, key: &ItemKey, category: Difficulty) -> Result<ScheduleEntry> {
        self.ensure_loaded().await;
        let now = self.now();
        let prior = self.inner.reconciler.cached(key);

        let entry = schedule_review(prior.as_ref(), key, category, now);
        self.apply(prior.map(|p| p.category), entry, now).await
    }

    /// Re-rate `key` without completing a review. The schedule restarts.
    pub async fn set_category(&self, key: &ItemKey, category: Difficulty) -> Result<ScheduleEntry> {
        self.ensure_loaded().await;
        let now = self.now();
        let prior = self.inner.reconciler.cached(key);

        let entry = schedule_restart(key, category, now);
        self.apply(prior.map(|p| p.category), entry, now).await
    }

    /// [`set_category`](Self::set_category) from the raw integer encoding.
    pub async fn set_category_value(&self, key: &ItemKey, raw: i64) -> Result<ScheduleEntry> {
        let category = Difficulty::try_from(raw)?;
        self.set_category(key, category).await
    }

    async fn apply(
        &self,
        old_category: Option<Difficulty>,
        entry: ScheduleEntry,
        now: DateTime<Utc>,
    ) -> Result<ScheduleEntry> {
        entry.validate()?;
        let identity = self.write_through(&entry).await?;

        if old_category != Some(entry.category) {
            let record =
                HistoryRecord::new(entry.item_key.clone(), old_category, entry.category, now);
            self.inner.history.append(record, identity.as_ref()).await?;
        }

        debug!(
            item_key = %entry.item_key,
            category = entry.category.as_str(),
            repetition_count = entry.repetition_count,
            next_review_at = ?entry.next_review_at,
            "schedule updated"
        );
        Ok(entry)
    }

    /// Local store, then session cache, then remote. Returns the identity
    /// the write was sent for.
    async fn write_through(&self, entry: &ScheduleEntry) -> Result<Option<Identity>> {
        with_store(&self.inner.local, |store| store.upsert_entry(entry))?;
        self.inner.reconciler.cache_insert(entry.clone());

        let identity = self.inner.reconciler.session_identity();
        if let Some(identity) = &identity {
            let pushed = with_timeout(
                self.inner.remote_timeout,
                self.inner.remote.upsert(identity, entry),
            )
            .await;
            if let Err(err) = pushed {
                warn!(item_key = %entry.item_key, error = %err, "remote write failed, kept locally");
            }
        }
        Ok(identity)
    }

    /// Delete entries of `kind` (all when `None`) and their history from
    /// both stores.
    pub async fn reset_all(&self, kind: Option<ItemKind>) -> Result<ResetReport> {
        self.reset_prefix(kind.map(ItemKind::prefix)).await
    }

    /// Delete entries whose key starts with `prefix` (all when `None`) and
    /// their history from both stores.
    pub async fn reset_prefix(&self, prefix: Option<&str>) -> Result<ResetReport> {
        self.ensure_loaded().await;
        let local_entries = with_store(&self.inner.local, |store| store.delete_entries(prefix))?;
        self.inner.reconciler.cache_remove_prefix(prefix);

        let identity = self.inner.reconciler.session_identity();
        let remote_entries = match &identity {
            Some(identity) => {
                match with_timeout(
                    self.inner.remote_timeout,
                    self.inner.remote.delete_all(identity, prefix),
                )
                .await
                {
                    Ok(count) => Some(count),
                    Err(err) => {
                        warn!(error = %err, "remote entries not reset");
                        None
                    }
                }
            }
            None => None,
        };

        let history = self.inner.history.clear(identity.as_ref(), prefix).await?;

        Ok(ResetReport {
            local_entries,
            remote_entries,
            history,
        })
    }

    // === Queries ===

    /// Entries due at or before now, soonest-overdue first.
    pub async fn due_now(&self, filter: &DueFilter) -> Vec<ScheduleEntry> {
        self.ensure_loaded().await;
        let now = self.now();
        self.select(filter, |entry| entry.is_due(now))
    }

    /// Entries due after now and no later than now + `window`.
    pub async fn due_within(&self, window: ChronoDuration, filter: &DueFilter) -> Vec<ScheduleEntry> {
        self.ensure_loaded().await;
        let now = self.now();
        let until = horizon(now, window);
        self.select(filter, |entry| entry.is_due_between(now, until))
    }

    fn select(
        &self,
        filter: &DueFilter,
        due: impl Fn(&ScheduleEntry) -> bool,
    ) -> Vec<ScheduleEntry> {
        let mut entries: Vec<ScheduleEntry> = self
            .inner
            .reconciler
            .snapshot()
            .into_iter()
            .filter(|entry| filter.matches(&entry.item_key) && due(entry))
            .collect();
        entries.sort_by(|a, b| {
            a.next_review_at
                .cmp(&b.next_review_at)
                .then_with(|| a.item_key.cmp(&b.item_key))
        });
        entries
    }

    /// Pull remote entries due up to now + `window` into the session view.
    /// Returns how many were installed.
    pub async fn refresh_due(&self, window: ChronoDuration) -> usize {
        self.ensure_loaded().await;
        let Some(identity) = self.inner.reconciler.session_identity() else {
            return 0;
        };

        let until = horizon(self.now(), window);
        let fetched = with_timeout(
            self.inner.remote_timeout,
            self.inner.remote.list_due_between(&identity, None, until),
        )
        .await;
        let entries = match fetched {
            Ok(entries) => entries,
            Err(err) => {
                warn!(error = %err, "due refresh skipped");
                return 0;
            }
        };

        if let Err(err) = with_store(&self.inner.local, |store| store.upsert_entries(&entries)) {
            warn!(error = %err, "refreshed entries not mirrored locally");
        }
        let count = entries.len();
        for entry in entries {
            self.inner.reconciler.cache_insert(entry);
        }
        count
    }

    pub async fn entry(&self, key: &ItemKey) -> Option<ScheduleEntry> {
        self.ensure_loaded().await;
        self.inner.reconciler.cached(key)
    }

    /// Every entry in the session view, in key order.
    pub async fn entries(&self) -> Vec<ScheduleEntry> {
        self.ensure_loaded().await;
        self.inner.reconciler.snapshot()
    }

    /// Category history, newest first.
    pub async fn history(
        &self,
        item: Option<&ItemKey>,
        limit: Option<usize>,
    ) -> Result<Vec<HistoryRecord>> {
        self.ensure_loaded().await;
        let identity = self.inner.reconciler.session_identity();
        self.inner.history.list(identity.as_ref(), item, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_by_kind_and_keys() {
        let lesson = ItemKey::lesson("a");
        let word = ItemKey::word("b");

        assert!(DueFilter::All.matches(&lesson));
        assert!(DueFilter::Kind(ItemKind::Lesson).matches(&lesson));
        assert!(!DueFilter::Kind(ItemKind::Lesson).matches(&word));

        let keys = DueFilter::Keys([word.clone()].into_iter().collect());
        assert!(keys.matches(&word));
        assert!(!keys.matches(&lesson));
    }

    #[test]
    fn horizon_saturates_on_overflow() {
        let now = Utc::now();
        assert_eq!(horizon(now, ChronoDuration::MAX), DateTime::<Utc>::MAX_UTC);
        assert_eq!(
            horizon(now, ChronoDuration::days(2)),
            now + ChronoDuration::days(2)
        );
    }
}
